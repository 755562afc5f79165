use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::db::Pool;
use crate::geo::GeoResolver;
use crate::ingress::IngestQueue;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub settings: Arc<Settings>,
    pub geo: GeoResolver,
    pub ingest: IngestQueue,
    /// Serializes record units of work so concurrent workers cannot both
    /// pass the duplicate probe for the same view.
    pub writer: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pool: Pool, settings: Settings, geo: GeoResolver, ingest: IngestQueue) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            geo,
            ingest,
            writer: Arc::new(Mutex::new(())),
        }
    }
}
