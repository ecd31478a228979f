use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub geoip: GeoIpConfig,
    pub memstore: MemStoreConfig,
    pub site_cache: SiteCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to a MaxMind City .mmdb file; without one no locations are stored
    pub city_db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemStoreConfig {
    /// Capacity of the hit channel; hits beyond it are dropped
    pub buffer_size: usize,
    pub flush_interval_ms: u64,
    pub persist_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

/// Parse an optional numeric environment variable, failing on garbage
fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} must be a number, got {v:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./beacon.db?mode=rwc".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 5)?;

        let host = std::env::var("BEACON_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("BEACON_PORT", 8081)?;

        let city_db_path = std::env::var("GEOIP_CITY_DB_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty());
        if city_db_path.is_none() {
            tracing::warn!("GEOIP_CITY_DB_PATH not set, locations will not be collected");
        }

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            geoip: GeoIpConfig { city_db_path },
            memstore: MemStoreConfig {
                buffer_size: env_parse("MEMSTORE_BUFFER_SIZE", 100_000)?,
                flush_interval_ms: env_parse("MEMSTORE_FLUSH_INTERVAL_MS", 100)?,
                persist_interval_secs: env_parse("MEMSTORE_PERSIST_INTERVAL_SECS", 10)?,
            },
            site_cache: SiteCacheConfig {
                max_entries: env_parse("SITE_CACHE_MAX_ENTRIES", 10_000)?,
                ttl_secs: env_parse("SITE_CACHE_TTL_SECS", 30)?,
            },
        })
    }
}
