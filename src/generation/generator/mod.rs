
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::autofix::ColumnFixer;
use super::extract::extract_sql;
use super::prompt::{CorrectionPrompt, SqlPrompt};
use super::validator::validate_sql;
use super::TextGenerator;
use crate::database::SqlExecutor;
use crate::{RagError, Result};

/// Placeholder the model may use for the question's embedding
pub const QUERY_EMBEDDING_PLACEHOLDER: &str = "<query_embedding>";

/// A statement that executed successfully, with its JSON result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub result: String,
    /// Execution attempts used, starting at 1
    pub attempts: u32,
}

/// Render a vector as a PostgreSQL `vector` literal
#[inline]
pub fn vector_literal(vector: &[f32]) -> String {
    format!("'[{}]'::vector", vector.iter().join(","))
}

/// Drafts SQL with the generation provider, validates it, executes it read-only
/// and repairs it with corrective prompts when the database rejects it
pub struct SqlGenerator {
    generator: Arc<dyn TextGenerator>,
    executor: Arc<dyn SqlExecutor>,
    max_attempts: u32,
    excerpt_chars: usize,
    fixer: Option<ColumnFixer>,
}

impl SqlGenerator {
    #[inline]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        executor: Arc<dyn SqlExecutor>,
        max_attempts: u32,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            generator,
            executor,
            max_attempts: max_attempts.max(1),
            excerpt_chars,
            fixer: None,
        }
    }

    /// Enable the best-effort column repair heuristic
    #[inline]
    pub fn with_column_fixer(mut self, fixer: ColumnFixer) -> Self {
        self.fixer = Some(fixer);
        self
    }

    /// Generate, validate and execute SQL answering `question`.
    ///
    /// Validation runs before every execution and a rejection ends the request
    /// immediately. Execution errors are retried until `max_attempts` executions
    /// have been made.
    #[inline]
    pub async fn generate_and_execute(
        &self,
        question: &str,
        context: &str,
        history: &str,
        query_embedding: Option<&[f32]>,
    ) -> Result<GeneratedQuery> {
        let prompt = SqlPrompt::new(context, question)
            .map_err(|e| RagError::Generation(e.to_string()))?
            .with_history(history)
            .render();

        let reply = self.call_model(prompt).await?;
        let mut sql = prepare_sql(&reply, query_embedding);
        info!("Generated SQL:\n{}", sql);

        let mut attempt = 1;
        loop {
            validate_sql(&sql)
                .map_err(|e| RagError::Validation(format!("Unsafe SQL detected: {e}")))?;

            let error = match self.executor.execute(&sql).await {
                Ok(result) => {
                    info!("SQL executed successfully on attempt {}", attempt);
                    return Ok(GeneratedQuery {
                        sql,
                        result,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            warn!("Attempt {} failed: {}", attempt, error);

            if attempt >= self.max_attempts {
                return Err(RagError::Execution(format!(
                    "SQL failed after {} attempts: {}",
                    self.max_attempts, error
                )));
            }
            attempt += 1;

            let message = error.to_string();
            if let Some(fixed) = self
                .fixer
                .as_ref()
                .and_then(|fixer| fixer.try_fix(&sql, &message))
            {
                info!("Auto-fixed SQL (attempt {}):\n{}", attempt, fixed);
                sql = fixed;
                continue;
            }

            let correction =
                CorrectionPrompt::new(&message, &sql, question, context, self.excerpt_chars)
                    .render();
            let reply = self.call_model(correction).await?;
            sql = prepare_sql(&reply, query_embedding);
            info!("Corrected SQL (attempt {}):\n{}", attempt, sql);
        }
    }

    async fn call_model(&self, prompt: String) -> Result<String> {
        let generator = Arc::clone(&self.generator);
        debug!("Calling generation provider ({} chars)", prompt.len());

        tokio::task::spawn_blocking(move || generator.generate(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("generation worker failed: {e}")))?
            .map_err(|e| RagError::Generation(e.to_string()))
    }
}

fn prepare_sql(reply: &str, query_embedding: Option<&[f32]>) -> String {
    let sql = extract_sql(reply);
    match query_embedding {
        Some(vector) if sql.contains(QUERY_EMBEDDING_PLACEHOLDER) => {
            sql.replace(QUERY_EMBEDDING_PLACEHOLDER, &vector_literal(vector))
        }
        _ => sql,
    }
}
