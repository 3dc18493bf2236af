// Database module
// PostgreSQL as the relational source of truth, LanceDB for persisted vectors

pub mod lancedb;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TextSearchTarget;

pub use lancedb::{SearchHit, VectorRecord, VectorStore};
pub use postgres::PostgresStore;

/// The database rejected a statement; the message is fed back to the model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ExecutionError(pub String);

/// Runs validated read-only statements
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute `sql` and return its rows as a JSON array
    async fn execute(&self, sql: &str) -> Result<String, ExecutionError>;
}

/// One non-empty free-text value and the physical row it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRow {
    pub text: String,
    /// Stable physical-row token (PostgreSQL `ctid`)
    pub row_token: String,
}

/// Supplies the raw free-text values indexed by the text-column index
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Every text column of the public schema
    async fn text_columns(&self) -> crate::Result<Vec<TextSearchTarget>>;

    /// Non-null, non-blank values of one column in physical row order
    async fn fetch_texts(&self, target: &TextSearchTarget) -> crate::Result<Vec<TextRow>>;
}
