mod handlers;
mod processor;
mod queue;

pub use handlers::*;
pub use processor::*;
pub use queue::*;
