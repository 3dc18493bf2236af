
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::{Embedder, EmbeddingError, batch};
use crate::config::EmbeddingProfile;

/// On-disk layout: vectors are only valid for the model that produced them
#[derive(Debug, Deserialize)]
struct CacheFile {
    model: String,
    dimension: usize,
    entries: HashMap<String, Vec<f32>>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    model: &'a str,
    dimension: usize,
    entries: &'a HashMap<String, Vec<f32>>,
}

/// Persistent text → vector mapping for one embedding model.
///
/// The whole file is read at construction and rewritten after every mutation,
/// so a vector returned by [`EmbeddingCache::get_or_compute`] survives a restart.
/// A file written for another model or dimension is discarded on load.
#[derive(Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
    model: String,
    dimension: usize,
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Load the cache file if present and written for `model`/`dimension`, else start empty
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P, model: &str, dimension: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = fs::read_to_string(&path).with_context(|| {
                format!("Failed to read embedding cache: {}", path.display())
            })?;
            let file: CacheFile = serde_json::from_str(&content).with_context(|| {
                format!("Failed to parse embedding cache: {}", path.display())
            })?;

            if file.model == model && file.dimension == dimension {
                file.entries
            } else {
                info!(
                    "Discarding {} cached embeddings from {} (dimension {}); now using {} (dimension {})",
                    file.entries.len(),
                    file.model,
                    file.dimension,
                    model,
                    dimension
                );
                HashMap::new()
            }
        } else {
            HashMap::new()
        };

        debug!(
            "Loaded {} cached embeddings from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            model: model.to_string(),
            dimension,
            entries: Mutex::new(entries),
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.lock().get(text).cloned()
    }

    /// Cached vector only if it matches the dimension `embedder` produces
    fn get_for(&self, text: &str, embedder: &Arc<dyn Embedder>) -> Option<Vec<f32>> {
        self.get(text).filter(|vector| vector.len() == embedder.dimension())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store one vector and flush to disk
    #[inline]
    pub fn insert(&self, text: &str, vector: Vec<f32>) -> Result<()> {
        self.lock().insert(text.to_string(), vector);
        self.flush()
    }

    /// Return the cached vector for `text`, embedding and persisting it on a miss
    #[inline]
    pub async fn get_or_compute(
        &self,
        text: &str,
        embedder: &Arc<dyn Embedder>,
        profile: &EmbeddingProfile,
    ) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(vector) = self.get_for(text, embedder) {
            debug!("Embedding cache hit ({} chars)", text.len());
            return Ok(vector);
        }

        let owned = text.to_string();
        let worker = Arc::clone(embedder);
        let profile = *profile;
        let vector =
            tokio::task::spawn_blocking(move || batch::embed_one(worker.as_ref(), &owned, &profile))
                .await
                .map_err(|e| EmbeddingError::Transient(format!("embedding worker failed: {e}")))??;

        if let Err(e) = self.insert(text, vector.clone()) {
            warn!("Failed to persist embedding cache: {:#}", e);
        }

        Ok(vector)
    }

    /// Batch form of [`Self::get_or_compute`]: only misses reach the provider,
    /// and the file is flushed once at the end
    #[inline]
    pub async fn get_or_compute_many(
        &self,
        texts: &[String],
        embedder: &Arc<dyn Embedder>,
        profile: &EmbeddingProfile,
    ) -> Vec<Option<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.get_for(text, embedder))
            .collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(index, hit)| hit.is_none().then_some(index))
            .collect();

        if missing.is_empty() {
            debug!("All {} embeddings served from cache", texts.len());
            return results;
        }

        debug!(
            "{} of {} embeddings missing from cache",
            missing.len(),
            texts.len()
        );

        let missing_texts: Vec<String> = missing
            .iter()
            .filter_map(|&index| texts.get(index).cloned())
            .collect();
        let computed = batch::embed_many(Arc::clone(embedder), &missing_texts, profile).await;

        {
            let mut entries = self.lock();
            for ((&index, text), vector) in missing.iter().zip(&missing_texts).zip(computed) {
                if let Some(vector) = vector {
                    entries.insert(text.clone(), vector.clone());
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(vector);
                    }
                }
            }
        }

        if let Err(e) = self.flush() {
            warn!("Failed to persist embedding cache: {:#}", e);
        }

        results
    }

    fn flush(&self) -> Result<()> {
        let content = {
            let entries = self.lock();
            let file = CacheFileRef {
                model: &self.model,
                dimension: self.dimension,
                entries: &entries,
            };
            serde_json::to_string(&file).context("Failed to serialize embedding cache")?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<f32>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
