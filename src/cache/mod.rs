// Query cache module
// Normalized-question keys over an in-process tier and an optional durable tier

pub mod memory;
pub mod shared;


use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use memory::MemoryCache;
pub use shared::{SharedStore, SqliteCacheStore};

const STRIPPED_PUNCTUATION: &[char] = &['?', '!', '.', ',', ';'];

/// Lower-case, drop `?!.,;` and collapse whitespace runs to single spaces
#[inline]
pub fn normalize_question(question: &str) -> String {
    question
        .to_lowercase()
        .replace(STRIPPED_PUNCTUATION, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized question
#[inline]
pub fn cache_key(question: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_question(question).as_bytes()))
}

/// Two-tier question → result cache.
///
/// Reads consult the durable tier first and fall back to the in-process map.
/// Durable-tier failures are logged and ignored; the cache never fails a request.
pub struct QueryCache {
    memory: MemoryCache,
    shared: Option<Arc<dyn SharedStore>>,
    ttl: Duration,
}

impl QueryCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(ttl),
            shared: None,
            ttl,
        }
    }

    #[inline]
    pub fn with_shared_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.shared = Some(store);
        self
    }

    #[inline]
    pub async fn get(&self, question: &str) -> Option<String> {
        let key = cache_key(question);

        if let Some(store) = &self.shared {
            match store.get(&key).await {
                Ok(Some(value)) => {
                    debug!("Cache HIT (shared): {}", key);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => warn!("Shared cache read failed: {:#}", e),
            }
        }

        let hit = self.memory.get(&key);
        if hit.is_some() {
            debug!("Cache HIT (memory): {}", key);
        } else {
            debug!("Cache MISS: {}", key);
        }
        hit
    }

    #[inline]
    pub async fn set(&self, question: &str, result: &str) {
        let key = cache_key(question);

        if let Some(store) = &self.shared {
            if let Err(e) = store.set(&key, result, self.ttl).await {
                warn!("Shared cache write failed: {:#}", e);
            }
        }

        self.memory.insert(key, result.to_string());
    }

    #[inline]
    pub async fn clear(&self) {
        self.memory.clear();

        if let Some(store) = &self.shared {
            match store.clear().await {
                Ok(removed) => debug!("Removed {} shared cache entries", removed),
                Err(e) => warn!("Shared cache clear failed: {:#}", e),
            }
        }
    }

    /// Live entries in the in-process tier
    #[inline]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}
