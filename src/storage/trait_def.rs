use crate::models::{Hit, Site, SiteId, SiteSettings};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("a site with this host already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Register a site answering on `host`
    async fn create_site(&self, host: &str, settings: &SiteSettings) -> StorageResult<Site>;

    /// Get the site configured for a request host
    async fn get_site_by_host(&self, host: &str) -> Result<Option<Site>>;

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>>;

    /// Replace a site's settings; false if the site doesn't exist
    async fn update_settings(&self, id: SiteId, settings: &SiteSettings) -> Result<bool>;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Write a batch of hits, returning how many were stored
    async fn persist_hits(&self, hits: &[Hit]) -> Result<u64>;

    /// Number of stored hits for a site
    async fn count_hits(&self, site: SiteId) -> Result<i64>;
}
