#[cfg(test)]
mod tests;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ExecutionError, SqlExecutor, TextRow, TextSource};
use crate::config::{DatabaseConfig, TextSearchTarget, is_identifier};
use crate::{RagError, Result};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const TEXT_COLUMNS_QUERY: &str = "\
SELECT table_name::text, column_name::text
FROM information_schema.columns
WHERE table_schema = 'public' AND data_type = 'text'
ORDER BY table_name, ordinal_position";

/// Connection pool to the incident database
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PostgresStore {
    #[inline]
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!(
            "Connected to PostgreSQL (pool size {})",
            config.max_connections
        );

        Ok(Self {
            pool,
            statement_timeout_ms: config.statement_timeout_ms,
        })
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Wrap a validated statement so each row comes back as one JSON text value.
/// The statement sits on its own lines so a trailing `--` comment cannot swallow
/// the closing parenthesis.
fn json_rows_query(sql: &str) -> String {
    format!("SELECT row_to_json(q)::text FROM (\n{sql}\n) q")
}

fn text_extraction_query(target: &TextSearchTarget) -> Result<String> {
    if !is_identifier(&target.table) || !is_identifier(&target.column) {
        return Err(RagError::Config(format!(
            "Invalid table or column name: {}",
            target
        )));
    }

    Ok(format!(
        r#"SELECT "{column}"::text, ctid::text FROM "{table}" WHERE "{column}" IS NOT NULL AND btrim("{column}"::text) <> '' ORDER BY ctid"#,
        table = target.table,
        column = target.column
    ))
}

fn execution_error(error: &sqlx::Error) -> ExecutionError {
    match error {
        sqlx::Error::Database(db_error) => ExecutionError(db_error.message().to_string()),
        other => ExecutionError(other.to_string()),
    }
}

#[async_trait]
impl SqlExecutor for PostgresStore {
    /// Runs inside a READ ONLY transaction with a statement timeout; always rolled back
    async fn execute(&self, sql: &str) -> std::result::Result<String, ExecutionError> {
        let mut tx = self.pool.begin().await.map_err(|e| execution_error(&e))?;

        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql("SET TRANSACTION READ ONLY"))
            .await
            .map_err(|e| execution_error(&e))?;
        sqlx::Executor::execute(
            &mut *tx,
            sqlx::raw_sql(&format!(
                "SET LOCAL statement_timeout = {}",
                self.statement_timeout_ms
            )),
        )
        .await
        .map_err(|e| execution_error(&e))?;

        let rows: std::result::Result<Vec<String>, sqlx::Error> =
            sqlx::query_scalar(&json_rows_query(sql))
                .fetch_all(&mut *tx)
                .await;

        if let Err(e) = tx.rollback().await {
            warn!("Failed to roll back read-only transaction: {}", e);
        }

        let rows = rows.map_err(|e| execution_error(&e))?;
        debug!("Query returned {} rows", rows.len());
        Ok(format!("[{}]", rows.join(",")))
    }
}

#[async_trait]
impl TextSource for PostgresStore {
    async fn text_columns(&self) -> Result<Vec<TextSearchTarget>> {
        let rows: Vec<(String, String)> = sqlx::query_as(TEXT_COLUMNS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to list text columns: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter(|(table, column)| is_identifier(table) && is_identifier(column))
            .map(|(table, column)| TextSearchTarget::new(table, column))
            .collect())
    }

    async fn fetch_texts(&self, target: &TextSearchTarget) -> Result<Vec<TextRow>> {
        let query = text_extraction_query(target)?;

        let rows: Vec<(String, String)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to read texts from {}: {}", target, e))
            })?;

        debug!("Fetched {} text values from {}", rows.len(), target);
        Ok(rows
            .into_iter()
            .map(|(text, row_token)| TextRow { text, row_token })
            .collect())
    }
}
