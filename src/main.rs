use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beacon::analytics::{
    GeoIpService, Geolocator, HitSink, MemStore, NoopGeolocator, UserAgentClassifier,
};
use beacon::config::Config;
use beacon::count::{create_count_router, Pipeline};
use beacon::storage::{CachedStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("beacon=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!("Using SQLite storage: {}", config.database.url);
    let sqlite: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );
    sqlite.init().await?;
    info!("Database initialized successfully");

    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
        Arc::clone(&sqlite),
        config.site_cache.max_entries,
        config.site_cache.ttl_secs,
    ));

    let geolocator: Arc<dyn Geolocator> = match config.geoip.city_db_path.as_deref() {
        Some(path) => match GeoIpService::new(path) {
            Ok(service) => {
                info!("GeoIP database loaded from {}", path);
                Arc::new(service)
            }
            Err(e) => {
                warn!("Failed to load GeoIP database from {}: {:#}", path, e);
                Arc::new(NoopGeolocator)
            }
        },
        None => Arc::new(NoopGeolocator),
    };

    let memstore = Arc::new(MemStore::new_with_config(
        config.memstore.buffer_size,
        config.memstore.flush_interval_ms,
    ));
    let persist_task =
        memstore.start_persist_task(config.memstore.persist_interval_secs, Arc::clone(&sqlite));

    let pipeline = Pipeline::new(
        Arc::new(UserAgentClassifier::new()),
        geolocator,
        Arc::clone(&memstore) as Arc<dyn HitSink>,
    );
    let router = create_count_router(Arc::clone(&storage), pipeline);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Beacon listening on http://{}/count", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Flush what the actor still holds, then write the last batch
    memstore.shutdown().await;
    persist_task.abort();
    match memstore.persist(sqlite.as_ref()).await {
        Ok(n) => info!("Persisted {} buffered hits on shutdown", n),
        Err(e) => error!("Final persist failed: {:#}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
