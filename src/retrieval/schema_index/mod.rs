
use lancedb::DistanceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EmbeddingProfile;
use crate::database::{VectorRecord, VectorStore};
use crate::embeddings::{Embedder, EmbeddingCache};
use crate::schema::{DocumentType, RetrievableDocument, SchemaDescription, build_documents};
use crate::{RagError, Result};

const DOCUMENTS_TABLE: &str = "schema_documents";

/// Lifecycle of the schema index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    LoadedFromDisk,
    BuiltFresh,
    Ready,
    Rebuilding,
}

impl fmt::Display for IndexState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::LoadedFromDisk => "loaded from disk",
            Self::BuiltFresh => "built fresh",
            Self::Ready => "ready",
            Self::Rebuilding => "rebuilding",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndexStats {
    pub documents: usize,
    pub dimension: usize,
    pub state: IndexState,
    /// How the current index came to exist: loaded or freshly built
    pub origin: Option<IndexState>,
}

/// Per-record metadata stored next to each schema document vector
#[derive(Debug, Serialize, Deserialize)]
struct DocumentMetadata {
    doc_type: DocumentType,
    table: Option<String>,
    column: Option<String>,
}

/// Owns the persisted similarity index over schema documents.
///
/// `init` loads the index from disk or builds it, `rebuild` replaces it by
/// building into a staging directory and swapping it into place.
pub struct VectorIndexManager {
    path: PathBuf,
    schema: Arc<SchemaDescription>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    profile: EmbeddingProfile,
    store: Option<VectorStore>,
    state: IndexState,
    origin: Option<IndexState>,
}

impl VectorIndexManager {
    #[inline]
    pub fn new(
        path: impl Into<PathBuf>,
        schema: Arc<SchemaDescription>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        profile: EmbeddingProfile,
    ) -> Self {
        Self {
            path: path.into(),
            schema,
            embedder,
            cache,
            profile,
            store: None,
            state: IndexState::Uninitialized,
            origin: None,
        }
    }

    #[inline]
    pub fn state(&self) -> IndexState {
        self.state
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted index, or build and persist a fresh one
    #[inline]
    pub async fn init(&mut self) -> Result<()> {
        if self.state == IndexState::Ready {
            return Ok(());
        }

        if let Some(store) = self.load_existing().await? {
            self.store = Some(store);
            self.transition(IndexState::LoadedFromDisk);
        } else {
            info!("No usable schema index at {}, building", self.path.display());
            self.build_and_swap().await?;
            self.transition(IndexState::BuiltFresh);
        }

        self.origin = Some(self.state);
        self.transition(IndexState::Ready);
        Ok(())
    }

    /// Replace the persisted index with one built from the current schema.
    ///
    /// The new index is written to a staging directory first; a failed build
    /// leaves the previous index untouched.
    #[inline]
    pub async fn rebuild(&mut self) -> Result<()> {
        let previous = self.state;
        self.transition(IndexState::Rebuilding);

        match self.build_and_swap().await {
            Ok(()) => {
                self.origin = Some(IndexState::BuiltFresh);
                self.transition(IndexState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!("Schema index rebuild failed: {}", e);
                self.transition(previous);
                Err(e)
            }
        }
    }

    /// Embed the question through the embedding cache
    #[inline]
    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        self.cache
            .get_or_compute(question, &self.embedder, &self.profile)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))
    }

    /// Top-`k` documents for `question`, re-ranked by document type
    #[inline]
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievableDocument>> {
        let vector = self.embed_query(question).await?;
        self.retrieve_by_vector(&vector, k).await
    }

    /// Same as [`Self::retrieve`] for an already embedded question
    #[inline]
    pub async fn retrieve_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievableDocument>> {
        let store = self.ready_store()?;

        let hits = store
            .search(DOCUMENTS_TABLE, vector, k, DistanceType::Cosine)
            .await?;

        let mut documents = hits
            .into_iter()
            .map(|hit| to_document(hit.record))
            .collect::<Result<Vec<_>>>()?;
        rerank_by_priority(&mut documents);

        debug!("Retrieved {} schema documents", documents.len());
        Ok(documents)
    }

    #[inline]
    pub async fn stats(&self) -> Result<SchemaIndexStats> {
        let (documents, dimension) = match &self.store {
            Some(store) if store.has_table(DOCUMENTS_TABLE).await? => (
                store.count(DOCUMENTS_TABLE).await?,
                store.vector_dimension(DOCUMENTS_TABLE).await?,
            ),
            _ => (0, 0),
        };

        Ok(SchemaIndexStats {
            documents,
            dimension,
            state: self.state,
            origin: self.origin,
        })
    }

    fn transition(&mut self, next: IndexState) {
        debug!("Schema index: {} -> {}", self.state, next);
        self.state = next;
    }

    fn ready_store(&self) -> Result<&VectorStore> {
        match (&self.store, self.state) {
            (Some(store), IndexState::Ready) => Ok(store),
            (_, state) => Err(RagError::Database(format!(
                "Schema index is not ready (state: {})",
                state
            ))),
        }
    }

    /// Open the persisted index if it exists and matches the provider's dimension
    async fn load_existing(&self) -> Result<Option<VectorStore>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let store = VectorStore::open(&self.path).await?;
        if !store.has_table(DOCUMENTS_TABLE).await? {
            return Ok(None);
        }

        let stored = store.vector_dimension(DOCUMENTS_TABLE).await?;
        let expected = self.embedder.dimension();
        if stored != expected {
            warn!(
                "Persisted schema index has dimension {} but the provider returns {}; rebuilding",
                stored, expected
            );
            return Ok(None);
        }

        info!(
            "Loaded schema index with {} documents",
            store.count(DOCUMENTS_TABLE).await?
        );
        Ok(Some(store))
    }

    async fn build_and_swap(&mut self) -> Result<()> {
        let staging = sibling_path(&self.path, "staging");
        let retired = sibling_path(&self.path, "old");
        remove_dir_if_exists(&staging)?;
        remove_dir_if_exists(&retired)?;

        {
            let staged = VectorStore::open(&staging).await?;
            if let Err(e) = self.populate(&staged).await {
                drop(staged);
                remove_dir_if_exists(&staging)?;
                return Err(e);
            }
        }

        self.store = None;
        if self.path.exists() {
            std::fs::rename(&self.path, &retired)?;
        }
        std::fs::rename(&staging, &self.path)?;
        remove_dir_if_exists(&retired)?;

        self.store = Some(VectorStore::open(&self.path).await?);
        info!("Schema index rebuilt at {}", self.path.display());
        Ok(())
    }

    /// Embed every schema document and write the documents table.
    ///
    /// Any document that cannot be embedded fails the build.
    async fn populate(&self, store: &VectorStore) -> Result<()> {
        let documents = build_documents(&self.schema);
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        let vectors = self
            .cache
            .get_or_compute_many(&texts, &self.embedder, &self.profile)
            .await;

        let failed = vectors.iter().filter(|v| v.is_none()).count();
        if failed > 0 {
            return Err(RagError::Embedding(format!(
                "Failed to embed {} of {} schema documents; refusing to build a partial index",
                failed,
                documents.len()
            )));
        }

        let dimension = self.embedder.dimension();
        let mut records = Vec::with_capacity(documents.len());
        for (position, (document, vector)) in documents.into_iter().zip(vectors).enumerate() {
            let Some(vector) = vector else { continue };
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }

            let metadata = serde_json::to_string(&DocumentMetadata {
                doc_type: document.doc_type,
                table: document.table,
                column: document.column,
            })
            .map_err(anyhow::Error::from)?;

            records.push(VectorRecord {
                vector,
                content: document.content,
                metadata,
                position: u32::try_from(position).unwrap_or(u32::MAX),
            });
        }

        store.create_table(DOCUMENTS_TABLE, dimension).await?;
        store.insert(DOCUMENTS_TABLE, &records).await?;
        info!("Indexed {} schema documents", records.len());
        Ok(())
    }
}

/// Stable sort by document type priority; equal priorities keep similarity order
#[inline]
pub fn rerank_by_priority(documents: &mut [RetrievableDocument]) {
    documents.sort_by_key(RetrievableDocument::priority);
}

/// Render retrieved documents as the prompt's context block
#[inline]
pub fn render_context(documents: &[RetrievableDocument]) -> String {
    documents
        .iter()
        .map(RetrievableDocument::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn to_document(record: VectorRecord) -> Result<RetrievableDocument> {
    let metadata: DocumentMetadata = record
        .metadata_as()
        .map_err(|e| RagError::Database(format!("Corrupt schema document metadata: {}", e)))?;

    Ok(RetrievableDocument {
        doc_type: metadata.doc_type,
        content: record.content,
        table: metadata.table,
        column: metadata.column,
    })
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}
