// Retrieval module
// Schema-document index and per-column text indexes over LanceDB

pub mod schema_index;
pub mod text_index;

pub use schema_index::{
    IndexState, SchemaIndexStats, VectorIndexManager, render_context, rerank_by_priority,
};
pub use text_index::{ColumnStats, TextColumnIndex, TextIndexError, TextMatch};

/// Scale `vector` to unit length; a zero vector is returned unchanged
#[inline]
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}
