// LanceDB vector database module
// Persisted vector tables backing the schema index and the text-column sub-indexes

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// One stored vector and the text it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub vector: Vec<f32>,
    /// Text that was embedded
    pub content: String,
    /// JSON describing where the text came from; shape is owned by the index using the table
    pub metadata: String,
    /// Insertion order within the table
    pub position: u32,
}

impl VectorRecord {
    /// Deserialize the metadata column
    #[inline]
    pub fn metadata_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.metadata)
    }
}

/// A stored record returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: VectorRecord,
    /// Distance reported by LanceDB under the requested metric
    pub distance: f32,
}
