use crate::models::{Hit, Site, SiteId, SiteSettings};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[derive(FromRow)]
struct SiteRow {
    id: i64,
    host: String,
    settings: String,
    created_at: i64,
}

impl TryFrom<SiteRow> for Site {
    type Error = anyhow::Error;

    fn try_from(row: SiteRow) -> Result<Self> {
        let settings = serde_json::from_str(&row.settings)
            .with_context(|| format!("invalid settings for site {}", row.id))?;
        Ok(Site {
            id: row.id,
            host: row.host,
            settings,
            created_at: row.created_at,
        })
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn size_column(size: &[f64]) -> String {
    size.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host TEXT NOT NULL UNIQUE,
                settings TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL REFERENCES sites(id),
                path TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                referrer TEXT NOT NULL DEFAULT '',
                query TEXT NOT NULL DEFAULT '',
                event INTEGER NOT NULL DEFAULT 0,
                size TEXT NOT NULL DEFAULT '',
                bot INTEGER NOT NULL DEFAULT 0,
                user_agent TEXT NOT NULL DEFAULT '',
                remote_addr TEXT NOT NULL DEFAULT '',
                location TEXT,
                language TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_site_created ON hits(site_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_site(&self, host: &str, settings: &SiteSettings) -> StorageResult<Site> {
        let settings_json =
            serde_json::to_string(settings).map_err(|e| StorageError::Other(e.into()))?;
        let created_at = now_unix();

        let result = sqlx::query(
            r#"
            INSERT INTO sites (host, settings, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(host) DO NOTHING
            "#,
        )
        .bind(host)
        .bind(&settings_json)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(Site {
            id: result.last_insert_rowid(),
            host: host.to_string(),
            settings: settings.clone(),
            created_at,
        })
    }

    async fn get_site_by_host(&self, host: &str) -> Result<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>(
            "SELECT id, host, settings, created_at FROM sites WHERE host = ?",
        )
        .bind(host)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Site::try_from).transpose()
    }

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>(
            "SELECT id, host, settings, created_at FROM sites WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Site::try_from).transpose()
    }

    async fn update_settings(&self, id: SiteId, settings: &SiteSettings) -> Result<bool> {
        let result = sqlx::query("UPDATE sites SET settings = ? WHERE id = ?")
            .bind(serde_json::to_string(settings)?)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query_as::<_, SiteRow>(
            "SELECT id, host, settings, created_at FROM sites ORDER BY id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter().map(Site::try_from).collect()
    }

    async fn persist_hits(&self, hits: &[Hit]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut stored = 0;

        for hit in hits {
            let result = sqlx::query(
                r#"
                INSERT INTO hits (
                    site_id, path, title, referrer, query, event, size, bot,
                    user_agent, remote_addr, location, language, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(hit.site())
            .bind(&hit.path)
            .bind(&hit.title)
            .bind(&hit.referrer)
            .bind(&hit.query)
            .bind(hit.event)
            .bind(size_column(&hit.size))
            .bind(hit.bot)
            .bind(&hit.user_agent)
            .bind(&hit.remote_addr)
            .bind(hit.location.as_deref())
            .bind(hit.language.as_deref())
            .bind(hit.created_at.timestamp())
            .execute(&mut *tx)
            .await?;

            stored += result.rows_affected();
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn count_hits(&self, site: SiteId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hits WHERE site_id = ?")
            .bind(site)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count.0)
    }
}
