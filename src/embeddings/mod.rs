// Embeddings module
// Provider abstraction, Ollama transport, batch embedding and the persistent embedding cache

pub mod batch;
pub mod cache;
pub mod ollama;

use thiserror::Error;

pub use batch::{embed_many, embed_one, truncate_text};
pub use cache::EmbeddingCache;
pub use ollama::OllamaClient;

/// Failure of a single embedding call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    /// Network failure, timeout, rate limiting or a server-side error; worth retrying
    #[error("transient embedding failure: {0}")]
    Transient(String),

    /// The provider refused the request; retrying the same input will not help
    #[error("embedding request rejected: {0}")]
    Rejected(String),

    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A remote (or fake) text embedding provider.
///
/// `embed` performs exactly one attempt; retry policy lives in [`batch::embed_one`]
/// so that it can be driven by the active [`crate::config::EmbeddingProfile`].
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector dimension this provider is configured to return
    fn dimension(&self) -> usize;
}
