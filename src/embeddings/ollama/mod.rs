
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, EmbeddingError};
use crate::config::OllamaConfig;
use crate::generation::{GenerationError, TextGenerator};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Blocking client for an Ollama-compatible HTTP API.
///
/// One client serves both provider roles: `/api/embed` for [`Embedder`] and
/// `/api/generate` for [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// How a failed HTTP exchange should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Retryable,
    Fatal,
}

fn classify(error: &ureq::Error) -> FailureKind {
    match error {
        ureq::Error::StatusCode(429) => FailureKind::Retryable,
        ureq::Error::StatusCode(status) if *status >= 500 => FailureKind::Retryable,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => FailureKind::Retryable,
        _ => FailureKind::Fatal,
    }
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            dimension: config.embedding_dimension as usize,
            agent,
            retry_attempts: config.retry_attempts,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay of the generation retry loop; doubled after each failed attempt
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Test connection to the server and verify both configured models are present
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        for wanted in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| &m.name == wanted) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    wanted, available
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    wanted,
                    available
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} (embedding: {}, generation: {})",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .map_err(|e| anyhow::anyhow!("Failed to fetch models: {}", e))?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn post_json(&self, path: &str, body: &str) -> Result<String, ureq::Error> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ureq::Error::BadUri(e.to_string()))?;

        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, ureq::Error>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;

        loop {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let error = match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => error,
            };

            if classify(&error) == FailureKind::Fatal {
                warn!("Non-retryable error: {}", error);
                return Err(error);
            }

            warn!(
                "Retryable error: {}, attempt {}/{}",
                error, attempt, self.retry_attempts
            );

            if attempt >= self.retry_attempts {
                error!("All retry attempts failed for request to {}", self.base_url);
                return Err(error);
            }

            let delay = self
                .backoff_unit
                .saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt - 1));
            debug!("Waiting {:?} before retry", delay);
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

impl Embedder for OllamaClient {
    /// Single attempt; the batch layer owns the retry policy
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Malformed(format!("request serialization: {e}")))?;

        let response_text = self.post_json("/api/embed", &body).map_err(|e| {
            match classify(&e) {
                FailureKind::Retryable => EmbeddingError::Transient(e.to_string()),
                FailureKind::Fatal => EmbeddingError::Rejected(e.to_string()),
            }
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                EmbeddingError::Malformed("response contained no embedding".to_string())
            })?;

        debug!("Generated embedding with {} dimensions", vector.len());
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(
            "Generating completion with {} (prompt length: {})",
            self.generation_model,
            prompt.len()
        );

        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| GenerationError::Malformed(format!("request serialization: {e}")))?;

        let response_text = self
            .make_request_with_retry(|| self.post_json("/api/generate", &body))
            .map_err(|e| match classify(&e) {
                FailureKind::Retryable => GenerationError::Unavailable(e.to_string()),
                FailureKind::Fatal => GenerationError::Rejected(e.to_string()),
            })?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        if response.response.trim().is_empty() {
            return Err(GenerationError::Empty);
        }

        Ok(response.response)
    }
}
