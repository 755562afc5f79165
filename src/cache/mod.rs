use moka::future::Cache;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::Settings;
use crate::domain::GeoInfo;

#[derive(Clone)]
pub struct AppCache {
    /// Successful geolocation lookups (IpAddr -> GeoInfo)
    pub geo: Cache<IpAddr, GeoInfo>,
}

impl AppCache {
    pub fn new(settings: &Settings) -> Self {
        let cache_ttl = Duration::from_secs(settings.cache_ttl_secs);

        Self {
            geo: Cache::builder()
                .max_capacity(settings.cache_max_entries)
                .time_to_live(cache_ttl)
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            cache_max_entries: 100,
            cache_ttl_secs: 60,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_geo_cache_roundtrip() {
        let cache = AppCache::new(&test_settings());
        let ip: IpAddr = "8.8.8.8".parse().unwrap();

        assert!(cache.geo.get(&ip).await.is_none());

        cache.geo.insert(ip, GeoInfo::new("Germany", "Berlin")).await;
        assert_eq!(
            cache.geo.get(&ip).await,
            Some(GeoInfo::new("Germany", "Berlin"))
        );
    }

    #[tokio::test]
    async fn test_cache_clone_shares_storage() {
        let cache = AppCache::new(&test_settings());
        let cloned = cache.clone();
        let ip: IpAddr = "1.1.1.1".parse().unwrap();

        cache.geo.insert(ip, GeoInfo::unknown()).await;
        assert!(cloned.geo.get(&ip).await.is_some());
    }
}
