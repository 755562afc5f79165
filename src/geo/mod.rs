use async_trait::async_trait;
use ipnetwork::IpNetwork;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::GeoInfo;
use crate::error::{Error, Result};

static LOCAL_NETWORKS: LazyLock<Vec<IpNetwork>> = LazyLock::new(|| {
    ["127.0.0.0/8", "10.0.0.0/8", "192.168.0.0/16", "::1/128"]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect()
});

/// Loopback and private-range addresses never leave the process.
pub fn is_local_address(ip: &str) -> bool {
    let ip = ip.trim();
    if ip.eq_ignore_ascii_case("localhost") {
        return true;
    }

    match ip.parse::<IpAddr>() {
        Ok(addr) => LOCAL_NETWORKS.iter().any(|net| net.contains(addr)),
        Err(_) => false,
    }
}

/// A remote geolocation source. Implementations may fail; `GeoResolver` absorbs it.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo>;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    city: Option<String>,
    message: Option<String>,
}

/// ip-api.com style JSON endpoint: `GET <base_url>/<ip>`.
pub struct IpApiLookup {
    client: Client,
    base_url: String,
}

impl IpApiLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("viewstats/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo> {
        let url = format!("{}/{}", self.base_url, ip);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Geo(format!(
                "lookup returned status {}",
                response.status()
            )));
        }

        let body: IpApiResponse = response.json().await?;
        if body.status != "success" {
            return Err(Error::Geo(
                body.message.unwrap_or_else(|| body.status.clone()),
            ));
        }

        Ok(GeoInfo::new(
            body.country.unwrap_or_else(|| "Unknown".to_string()),
            body.city.unwrap_or_else(|| "Unknown".to_string()),
        ))
    }
}

/// Resolves an address to `{country, city}` and never fails.
#[derive(Clone)]
pub struct GeoResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: Cache<IpAddr, GeoInfo>,
}

impl GeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>, cache: Cache<IpAddr, GeoInfo>) -> Self {
        Self { lookup, cache }
    }

    pub async fn resolve(&self, ip: &str) -> GeoInfo {
        if is_local_address(ip) {
            debug!("Skipping geolocation for local address {}", ip);
            return GeoInfo::local();
        }

        let addr: IpAddr = match ip.trim().parse() {
            Ok(addr) => addr,
            Err(_) => {
                debug!("Skipping geolocation for unparseable address {:?}", ip);
                return GeoInfo::unknown();
            }
        };

        if let Some(hit) = self.cache.get(&addr).await {
            return hit;
        }

        match self.lookup.lookup(addr).await {
            Ok(geo) => {
                self.cache.insert(addr, geo.clone()).await;
                geo
            }
            Err(e) => {
                warn!("Geolocation failed for {}: {}", addr, e);
                GeoInfo::unknown()
            }
        }
    }
}
