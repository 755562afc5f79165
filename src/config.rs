use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: Option<String>,
    pub database_path: Option<String>,

    #[serde(default = "default_geoip_api_url")]
    pub geoip_api_url: String,

    #[serde(default = "default_geoip_timeout_ms")]
    pub geoip_timeout_ms: u64,

    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: i64,

    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,

    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    pub admin_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_geoip_api_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_geoip_timeout_ms() -> u64 {
    5000
}

fn default_dedup_window_secs() -> i64 {
    86_400 // 24 hours
}

fn default_ingest_queue_capacity() -> usize {
    1024
}

fn default_ingest_workers() -> usize {
    2
}

fn default_cache_max_entries() -> u64 {
    10000
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            database_path: None,
            geoip_api_url: default_geoip_api_url(),
            geoip_timeout_ms: default_geoip_timeout_ms(),
            dedup_window_secs: default_dedup_window_secs(),
            ingest_queue_capacity: default_ingest_queue_capacity(),
            ingest_workers: default_ingest_workers(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl(),
            admin_token: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .add_source(
                Environment::with_prefix("VIEWSTATS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs)
    }

    pub fn geoip_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.geoip_timeout_ms)
    }
}
