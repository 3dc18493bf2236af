use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// Durable key-value tier shared across processes
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Deletes every key in this store's namespace, returning how many were removed
    async fn clear(&self) -> Result<u64>;
}

/// SQLite-backed store; keys are written as `namespace:key` with an absolute expiry
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
    namespace: String,
}

impl SqliteCacheStore {
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P, namespace: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open query cache database")?;

        info!("Running query cache migrations");
        sqlx::migrate!("src/cache/shared/migrations")
            .run(&pool)
            .await
            .context("Failed to run query cache migration")?;

        Ok(Self {
            pool,
            namespace: namespace.into(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Drops expired rows; reads already ignore them
    #[inline]
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM query_cache WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to purge expired cache entries")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SharedStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM query_cache WHERE key = ? AND expires_at > ?")
                .bind(self.namespaced(key))
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read query cache entry")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);

        sqlx::query(
            "INSERT INTO query_cache (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(self.namespaced(key))
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to write query cache entry")?;

        debug!("Stored shared cache entry {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let escaped = self
            .namespace
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let result = sqlx::query("DELETE FROM query_cache WHERE key LIKE ? ESCAPE '\\'")
            .bind(format!("{escaped}:%"))
            .execute(&self.pool)
            .await
            .context("Failed to clear query cache namespace")?;
        Ok(result.rows_affected())
    }
}
