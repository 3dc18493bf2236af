// SQL generation module
// Prompt templates, SQL extraction, static validation and the generate/execute retry loop

pub mod autofix;
pub mod extract;
pub mod generator;
pub mod history;
pub mod prompt;
pub mod validator;

use thiserror::Error;

pub use autofix::ColumnFixer;
pub use extract::extract_sql;
pub use generator::{GeneratedQuery, SqlGenerator};
pub use history::{ConversationHistory, ConversationTurn};
pub use prompt::{CorrectionPrompt, SqlPrompt};
pub use validator::{ValidationError, validate_sql};

/// Failure of a text-generation call, returned instead of a sentinel reply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Provider unreachable or failing after the transport retry budget
    #[error("generation provider unavailable: {0}")]
    Unavailable(String),

    #[error("generation request rejected: {0}")]
    Rejected(String),

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation provider returned an empty reply")]
    Empty,
}

/// A remote (or fake) text completion provider, called with temperature 0
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
