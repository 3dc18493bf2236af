use super::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn quick_profile(max_workers: usize, retry_count: u32) -> EmbeddingProfile {
    EmbeddingProfile {
        batch_size: 8,
        max_workers,
        delay: Duration::ZERO,
        retry_count,
        backoff_base: Duration::from_millis(1),
        max_text_chars: 5000,
    }
}

/// Encodes the numeric suffix of `item-N` as a one-element vector, sleeping
/// longer for earlier items so completions arrive out of order.
struct SlowFirstEmbedder {
    total: u64,
}

impl Embedder for SlowFirstEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let index: u64 = text
            .trim_start_matches("item-")
            .parse()
            .map_err(|_| EmbeddingError::Malformed(text.to_string()))?;
        std::thread::sleep(Duration::from_millis((self.total - index) * 5));
        if text == "item-3" {
            return Err(EmbeddingError::Rejected("bad input".to_string()));
        }
        Ok(vec![index as f32])
    }

    fn dimension(&self) -> usize {
        1
    }
}

/// Fails transiently a fixed number of times per text before succeeding
struct FlakyEmbedder {
    failures_before_success: usize,
    calls: Mutex<HashMap<String, usize>>,
}

impl FlakyEmbedder {
    fn new(failures_before_success: usize) -> Self {
        Self {
            failures_before_success,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, text: &str) -> usize {
        self.calls
            .lock()
            .expect("should lock call log")
            .get(text)
            .copied()
            .unwrap_or(0)
    }
}

impl Embedder for FlakyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut calls = self.calls.lock().expect("should lock call log");
        let count = calls.entry(text.to_string()).or_insert(0);
        *count += 1;
        if *count <= self.failures_before_success {
            Err(EmbeddingError::Transient("connection reset".to_string()))
        } else {
            Ok(vec![1.0, 0.0])
        }
    }

    fn dimension(&self) -> usize {
        2
    }
}

struct RejectingEmbedder {
    calls: AtomicUsize,
}

impl Embedder for RejectingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::Rejected("model not found".to_string()))
    }

    fn dimension(&self) -> usize {
        2
    }
}

struct LengthEmbedder;

impl Embedder for LengthEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![text.chars().count() as f32])
    }

    fn dimension(&self) -> usize {
        1
    }
}

#[tokio::test]
async fn embed_many_preserves_input_order() {
    let texts: Vec<String> = (0..8).map(|i| format!("item-{i}")).collect();
    let embedder: Arc<dyn Embedder> = Arc::new(SlowFirstEmbedder { total: 8 });

    let results = embed_many(embedder, &texts, &quick_profile(4, 1)).await;

    assert_eq!(results.len(), texts.len());
    for (index, result) in results.iter().enumerate() {
        if index == 3 {
            assert!(result.is_none(), "forced failure should be None");
        } else {
            assert_eq!(result.as_deref(), Some([index as f32].as_slice()));
        }
    }
}

#[tokio::test]
async fn embed_many_empty_input() {
    let embedder: Arc<dyn Embedder> = Arc::new(LengthEmbedder);
    let results = embed_many(embedder, &[], &quick_profile(2, 1)).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn embed_many_truncates_before_submission() {
    let embedder: Arc<dyn Embedder> = Arc::new(LengthEmbedder);
    let mut profile = quick_profile(2, 1);
    profile.max_text_chars = 4;

    let texts = vec!["ab".to_string(), "événement".to_string()];
    let results = embed_many(embedder, &texts, &profile).await;

    assert_eq!(results[0].as_deref(), Some([2.0].as_slice()));
    assert_eq!(results[1].as_deref(), Some([4.0].as_slice()));
}

#[test]
fn embed_one_retries_transient_failures() {
    let embedder = FlakyEmbedder::new(2);
    let result = embed_one(&embedder, "chute", &quick_profile(1, 3));

    assert_eq!(result, Ok(vec![1.0, 0.0]));
    assert_eq!(embedder.calls_for("chute"), 3);
}

#[test]
fn embed_one_stops_after_retry_budget() {
    let embedder = FlakyEmbedder::new(10);
    let result = embed_one(&embedder, "chute", &quick_profile(1, 3));

    assert!(matches!(result, Err(EmbeddingError::Transient(_))));
    assert_eq!(embedder.calls_for("chute"), 3);
}

#[test]
fn embed_one_does_not_retry_rejections() {
    let embedder = RejectingEmbedder {
        calls: AtomicUsize::new(0),
    };
    let result = embed_one(&embedder, "chute", &quick_profile(1, 3));

    assert!(matches!(result, Err(EmbeddingError::Rejected(_))));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn truncate_respects_char_boundaries() {
    assert_eq!(truncate_text("ééééé", 2), "éé");
    assert_eq!(truncate_text("short", 100), "short");
    assert_eq!(truncate_text("", 3), "");
    assert_eq!(truncate_text("abc", 0), "");
}
