pub mod analytics;
pub mod api;
pub mod cache;
pub mod client_info;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod geo;
pub mod ingress;
pub mod state;
pub mod ua;
