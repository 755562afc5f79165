use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use viewstats::{
    api,
    cache::AppCache,
    config::Settings,
    db,
    geo::{GeoResolver, IpApiLookup},
    ingress::IngestQueue,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let settings = Settings::new()?;
    info!("Configuration loaded");

    let db_url = settings
        .database_url
        .clone()
        .or_else(|| {
            settings
                .database_path
                .as_ref()
                .map(|p| format!("sqlite:{}?mode=rwc", p))
        })
        .unwrap_or_else(|| {
            #[cfg(feature = "postgres")]
            {
                "postgres://localhost/viewstats".to_string()
            }
            #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
            {
                "sqlite:viewstats.db?mode=rwc".to_string()
            }
        });

    info!("Connecting to database...");
    let pool = db::create_pool(&db_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let cache = AppCache::new(&settings);
    let lookup = IpApiLookup::new(&settings.geoip_api_url, settings.geoip_timeout())?;
    let geo = GeoResolver::new(Arc::new(lookup), cache.geo.clone());
    info!(
        "Geolocation via {} (timeout {} ms)",
        settings.geoip_api_url, settings.geoip_timeout_ms
    );

    if settings.admin_token.is_none() {
        info!("No admin token configured; stats endpoints will reject every request");
    }

    let (queue, jobs) = IngestQueue::bounded(settings.ingest_queue_capacity);
    let state = AppState::new(pool, settings.clone(), geo, queue.clone());
    queue.spawn_workers(state.clone(), jobs).await;

    let app = api::router(state);

    let addr = SocketAddr::new(
        settings.host.parse().unwrap_or([0, 0, 0, 0].into()),
        settings.port,
    );
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    queue.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
