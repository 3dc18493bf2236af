
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// In-process map with lazy TTL expiry, checked on read
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl MemoryCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.lock();
        let (value, inserted) = entries.get(key)?;

        if now.saturating_duration_since(*inserted) < self.ttl {
            Some(value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    #[inline]
    pub fn insert(&self, key: String, value: String) {
        self.lock().insert(key, (value, Instant::now()));
    }

    #[inline]
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stored entries, including expired ones not yet read
    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
