use crate::models::{Hit, Site, SiteId, SiteSettings};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Storage wrapper caching host → site lookups.
///
/// Every pixel request resolves its site by host, so this keeps the hot
/// path off the database. Settings changes made through this wrapper drop
/// the whole cache; changes made elsewhere show up after the TTL.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    /// Negative lookups are cached too, so unknown hosts don't hit the DB
    read_cache: Cache<String, Option<Site>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_site(&self, host: &str, settings: &SiteSettings) -> StorageResult<Site> {
        let site = self.inner.create_site(host, settings).await?;

        self.read_cache
            .insert(host.to_string(), Some(site.clone()))
            .await;

        Ok(site)
    }

    async fn get_site_by_host(&self, host: &str) -> Result<Option<Site>> {
        if let Some(cached) = self.read_cache.get(host).await {
            return Ok(cached);
        }

        // Cache miss - fetch from underlying storage
        let result = self.inner.get_site_by_host(host).await?;

        self.read_cache
            .insert(host.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        self.inner.get_site(id).await
    }

    async fn update_settings(&self, id: SiteId, settings: &SiteSettings) -> Result<bool> {
        let result = self.inner.update_settings(id, settings).await?;

        if result {
            self.read_cache.invalidate_all();
        }

        Ok(result)
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        self.inner.list_sites().await
    }

    async fn persist_hits(&self, hits: &[Hit]) -> Result<u64> {
        self.inner.persist_hits(hits).await
    }

    async fn count_hits(&self, site: SiteId) -> Result<i64> {
        self.inner.count_hits(site).await
    }
}
