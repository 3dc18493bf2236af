
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::DistanceType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::l2_normalize;
use crate::config::{EmbeddingProfile, TextSearchTarget};
use crate::database::{TextSource, VectorRecord, VectorStore};
use crate::embeddings::{Embedder, EmbeddingCache, embed_many};
use crate::{RagError, Result};

#[derive(Error, Debug)]
pub enum TextIndexError {
    /// No sub-index has been built for this pair; distinct from a search with no matches
    #[error("Index not found for {table}.{column}")]
    IndexNotFound { table: String, column: String },

    #[error(transparent)]
    Failed(#[from] RagError),
}

impl From<TextIndexError> for RagError {
    #[inline]
    fn from(error: TextIndexError) -> Self {
        match error {
            TextIndexError::IndexNotFound { table, column } => {
                Self::IndexNotFound { table, column }
            }
            TextIndexError::Failed(inner) => inner,
        }
    }
}

/// One search hit from a column's free-text values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMatch {
    pub text: String,
    /// Physical row token of the source row
    pub row_token: String,
    /// Insertion order within the sub-index
    pub index: u32,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
    /// `1 - similarity`
    pub distance: f32,
    /// 1-based
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnStats {
    pub table: String,
    pub column: String,
    pub vectors: usize,
    pub dimension: usize,
    pub metadata: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct RowMetadata {
    row: String,
    index: u32,
}

/// Per-(table, column) vector indexes over live free-text values.
///
/// Each pair is one LanceDB table named `{table}__{column}` holding
/// L2-normalized vectors, so cosine and inner-product rankings agree.
pub struct TextColumnIndex {
    store: VectorStore,
    source: Arc<dyn TextSource>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    query_profile: EmbeddingProfile,
}

impl TextColumnIndex {
    #[inline]
    pub async fn open(
        path: &Path,
        source: Arc<dyn TextSource>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        query_profile: EmbeddingProfile,
    ) -> Result<Self> {
        Ok(Self {
            store: VectorStore::open(path).await?,
            source,
            embedder,
            cache,
            query_profile,
        })
    }

    /// Build a sub-index for every text column the source exposes.
    ///
    /// Existing sub-indexes are kept unless `force` is set. Returns the pairs
    /// that were built; a pair that fails is logged and skipped.
    #[inline]
    pub async fn build_all(
        &self,
        profile: &EmbeddingProfile,
        force: bool,
    ) -> Result<Vec<(TextSearchTarget, usize)>> {
        let targets = self.source.text_columns().await?;
        info!("Found {} text columns to index", targets.len());

        let mut built = Vec::new();
        for target in targets {
            if !force && self.has_index(&target).await? {
                debug!("Text index for {} already exists, skipping", target);
                continue;
            }

            match self.build_column(&target, profile).await {
                Ok(count) => built.push((target, count)),
                Err(e) => warn!("Failed to index {}: {}", target, e),
            }
        }

        Ok(built)
    }

    /// (Re)build the sub-index of one column, returning the number of stored vectors.
    ///
    /// Rows are read in physical order and embedded batch by batch. A row whose
    /// embedding fails is skipped. The table is replaced only once every batch is done.
    #[inline]
    pub async fn build_column(
        &self,
        target: &TextSearchTarget,
        profile: &EmbeddingProfile,
    ) -> Result<usize> {
        let rows = self.source.fetch_texts(target).await?;
        info!("Indexing {} values from {}", rows.len(), target);

        let bar = progress_bar(rows.len(), target);
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0_usize;

        for batch in rows.chunks(profile.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|row| row.text.clone()).collect();
            let vectors = embed_many(Arc::clone(&self.embedder), &texts, profile).await;

            for (row, vector) in batch.iter().zip(vectors) {
                let Some(vector) = vector else {
                    skipped += 1;
                    warn!("Skipping row {} of {}: embedding failed", row.row_token, target);
                    continue;
                };

                let index = u32::try_from(records.len()).unwrap_or(u32::MAX);
                let metadata = serde_json::to_string(&RowMetadata {
                    row: row.row_token.clone(),
                    index,
                })
                .map_err(anyhow::Error::from)?;

                records.push(VectorRecord {
                    vector: l2_normalize(vector),
                    content: row.text.clone(),
                    metadata,
                    position: index,
                });
            }

            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        let name = table_name(target);
        self.store
            .create_table(&name, self.embedder.dimension())
            .await?;
        self.store.insert(&name, &records).await?;

        info!(
            "Indexed {} values from {} ({} skipped)",
            records.len(),
            target,
            skipped
        );
        Ok(records.len())
    }

    #[inline]
    pub async fn has_index(&self, target: &TextSearchTarget) -> Result<bool> {
        self.store.has_table(&table_name(target)).await
    }

    /// Top-`k` values of `target` closest to `query`.
    ///
    /// Fails with [`TextIndexError::IndexNotFound`] when the pair was never built.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        target: &TextSearchTarget,
        k: usize,
    ) -> std::result::Result<Vec<TextMatch>, TextIndexError> {
        let name = table_name(target);
        if !self.store.has_table(&name).await? {
            return Err(TextIndexError::IndexNotFound {
                table: target.table.clone(),
                column: target.column.clone(),
            });
        }

        let expected = self.store.vector_dimension(&name).await?;
        let query_vector = self
            .cache
            .get_or_compute(query, &self.embedder, &self.query_profile)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        if query_vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: query_vector.len(),
            }
            .into());
        }
        let query_vector = l2_normalize(query_vector);

        let hits = self
            .store
            .search(&name, &query_vector, k, DistanceType::Cosine)
            .await?;

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let metadata: RowMetadata = hit.record.metadata_as().map_err(|e| {
                RagError::Database(format!("Corrupt metadata in {}: {}", name, e))
            })?;
            let similarity = dot(&hit.record.vector, &query_vector).clamp(-1.0, 1.0);

            matches.push(TextMatch {
                text: hit.record.content,
                row_token: metadata.row,
                index: metadata.index,
                similarity,
                distance: 1.0 - similarity,
                rank: 0,
            });
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        for (rank, hit) in matches.iter_mut().enumerate() {
            hit.rank = rank + 1;
        }

        debug!("Text search on {} returned {} matches", target, matches.len());
        Ok(matches)
    }

    /// Pairs that currently have a sub-index
    #[inline]
    pub async fn indexed_targets(&self) -> Result<Vec<TextSearchTarget>> {
        let mut targets: Vec<TextSearchTarget> = self
            .store
            .table_names()
            .await?
            .iter()
            .filter_map(|name| parse_table_name(name))
            .collect();
        targets.sort();
        Ok(targets)
    }

    #[inline]
    pub async fn stats(&self) -> Result<Vec<ColumnStats>> {
        let mut stats = Vec::new();

        for target in self.indexed_targets().await? {
            let name = table_name(&target);
            let records = self.store.scan(&name).await?;
            let metadata = records
                .iter()
                .filter(|r| r.metadata_as::<RowMetadata>().is_ok())
                .count();

            stats.push(ColumnStats {
                vectors: records.len(),
                dimension: self.store.vector_dimension(&name).await?,
                metadata,
                table: target.table,
                column: target.column,
            });
        }

        Ok(stats)
    }

    /// Drop every sub-index
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        for target in self.indexed_targets().await? {
            self.store.drop_table(&table_name(&target)).await?;
        }
        Ok(())
    }
}

/// `{table length}_{table}_{column}`; the length prefix keeps names containing
/// underscores unambiguous, and identifiers never start with a digit
fn table_name(target: &TextSearchTarget) -> String {
    format!("{}_{}_{}", target.table.len(), target.table, target.column)
}

fn parse_table_name(name: &str) -> Option<TextSearchTarget> {
    let (length, rest) = name.split_once('_')?;
    if length.is_empty() || !length.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let length: usize = length.parse().ok()?;
    let table = rest.get(..length)?;
    let column = rest.get(length..)?.strip_prefix('_')?;
    (!table.is_empty() && !column.is_empty()).then(|| TextSearchTarget::new(table, column))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn progress_bar(total: usize, target: &TextSearchTarget) -> ProgressBar {
    if console::user_attended_stderr() {
        let bar = ProgressBar::new(total as u64).with_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} Indexing {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(target.to_string());
        bar
    } else {
        ProgressBar::hidden()
    }
}
