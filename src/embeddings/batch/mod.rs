#[cfg(test)]
mod tests;

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingProfile;

const PROGRESS_INTERVAL: usize = 10;

/// Truncate `text` to at most `max_chars` characters, on a character boundary
#[inline]
pub fn truncate_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.get(..byte_index).unwrap_or(text),
        None => text,
    }
}

/// Embed one text with the profile's retry policy.
///
/// The profile delay is applied before every call. Transient failures are retried
/// with `backoff_base * 2^attempt` between attempts; rejected or malformed
/// responses fail immediately.
#[inline]
pub fn embed_one(
    embedder: &dyn Embedder,
    text: &str,
    profile: &EmbeddingProfile,
) -> Result<Vec<f32>, EmbeddingError> {
    let text = truncate_text(text, profile.max_text_chars);
    let attempts = profile.retry_count.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if !profile.delay.is_zero() {
            std::thread::sleep(profile.delay);
        }

        match embedder.embed(text) {
            Ok(vector) => return Ok(vector),
            Err(error) if !error.is_retryable() => {
                debug!("Embedding failed without retry: {}", error);
                return Err(error);
            }
            Err(error) => {
                debug!(
                    "Embedding attempt {}/{} failed: {}",
                    attempt + 1,
                    attempts,
                    error
                );
                last_error = Some(error);

                if attempt + 1 < attempts {
                    let backoff = profile
                        .backoff_base
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| EmbeddingError::Transient("no embedding attempt was made".to_string())))
}

/// Embed every text on a bounded pool of blocking workers.
///
/// The output has the same length and order as `texts`. Items whose retries are
/// exhausted come back as `None` and never abort the rest of the batch.
#[inline]
pub async fn embed_many(
    embedder: Arc<dyn Embedder>,
    texts: &[String],
    profile: &EmbeddingProfile,
) -> Vec<Option<Vec<f32>>> {
    let total = texts.len();
    let mut results: Vec<Option<Vec<f32>>> = vec![None; total];
    if total == 0 {
        return results;
    }

    let profile = *profile;
    let mut completions = futures::stream::iter(texts.iter().cloned().enumerate().map(
        |(index, text)| {
            let embedder = Arc::clone(&embedder);
            async move {
                let outcome = tokio::task::spawn_blocking(move || {
                    embed_one(embedder.as_ref(), &text, &profile)
                })
                .await;
                (index, outcome)
            }
        },
    ))
    .buffer_unordered(profile.max_workers.max(1));

    let mut completed = 0_usize;
    let mut failed = 0_usize;

    while let Some((index, outcome)) = completions.next().await {
        completed += 1;

        match outcome {
            Ok(Ok(vector)) => {
                if let Some(slot) = results.get_mut(index) {
                    *slot = Some(vector);
                }
            }
            Ok(Err(error)) => {
                failed += 1;
                warn!("Giving up on embedding item {}: {}", index, error);
            }
            Err(join_error) => {
                failed += 1;
                warn!("Embedding worker for item {} panicked: {}", index, join_error);
            }
        }

        if completed % PROGRESS_INTERVAL == 0 || completed == total {
            info!(
                "Embedding progress: {}/{} done ({} failed)",
                completed, total, failed
            );
        }
    }

    results
}
