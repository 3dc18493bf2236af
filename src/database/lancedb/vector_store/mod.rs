
use super::{SearchHit, VectorRecord};
use crate::RagError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const VECTOR_COLUMN: &str = "vector";

/// A LanceDB database directory holding any number of fixed-dimension vector tables
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
}

impl VectorStore {
    /// Open (or create) the database directory at `path`
    #[inline]
    pub async fn open(path: &Path) -> Result<Self, RagError> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.display().to_string();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(path)?;
                    std::fs::create_dir_all(path).map_err(|e| {
                        RagError::Database(format!(
                            "Failed to recreate vector database directory: {}",
                            e
                        ))
                    })?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RagError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>, RagError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
    }

    #[inline]
    pub async fn has_table(&self, name: &str) -> Result<bool, RagError> {
        Ok(self.table_names().await?.iter().any(|t| t == name))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
        ]))
    }

    /// Create an empty table, replacing any existing table of the same name
    #[inline]
    pub async fn create_table(&self, name: &str, vector_dim: usize) -> Result<(), RagError> {
        self.drop_table(name).await?;

        self.connection
            .create_empty_table(name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table {}: {}", name, e)))?;

        info!("Created table {} with {} dimensions", name, vector_dim);
        Ok(())
    }

    /// Drop a table if it exists
    #[inline]
    pub async fn drop_table(&self, name: &str) -> Result<(), RagError> {
        if self.has_table(name).await? {
            info!("Dropping existing table {}", name);
            self.connection
                .drop_table(name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Vector dimension declared by an existing table's schema
    #[inline]
    pub async fn vector_dimension(&self, name: &str) -> Result<usize, RagError> {
        let table = self.open_table(name).await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == VECTOR_COLUMN {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Append records; every vector must match the table's dimension
    #[inline]
    pub async fn insert(&self, name: &str, records: &[VectorRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            debug!("No vectors to store in {}", name);
            return Ok(());
        }

        let vector_dim = self.vector_dimension(name).await?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::DimensionMismatch {
                expected: vector_dim,
                actual: bad.vector.len(),
            });
        }

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let table = self.open_table(name).await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert vectors: {}", e)))?;

        debug!("Stored {} vectors in {}", records.len(), name);
        Ok(())
    }

    fn create_record_batch(
        records: &[VectorRecord],
        vector_dim: usize,
    ) -> Result<RecordBatch, RagError> {
        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    RagError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.content.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.metadata.as_str()),
            )),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.position),
            )),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest neighbours of `query_vector` in table `name`, closest first
    #[inline]
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
        distance_type: DistanceType,
    ) -> Result<Vec<SearchHit>, RagError> {
        debug!("Searching {} for {} nearest vectors", name, limit);

        let table = self.open_table(name).await?;

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(distance_type)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_batch(&batch)?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Parsed {} search results from stream", hits.len());
        Ok(hits)
    }

    /// Every record of a table in insertion order
    #[inline]
    pub async fn scan(&self, name: &str) -> Result<Vec<VectorRecord>, RagError> {
        let table = self.open_table(name).await?;

        let mut results = table
            .query()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan table: {}", e)))?;

        let mut records = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            records.extend(Self::parse_batch(&batch)?.into_iter().map(|hit| hit.record));
        }

        records.sort_by_key(|r| r.position);
        Ok(records)
    }

    fn parse_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>, RagError> {
        let vectors = batch
            .column_by_name(VECTOR_COLUMN)
            .ok_or_else(|| RagError::Database("Missing vector column".to_string()))?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| RagError::Database("Invalid vector column type".to_string()))?;

        let contents = string_column(batch, "content")?;
        let metadata = string_column(batch, "metadata")?;

        let positions = batch
            .column_by_name("position")
            .ok_or_else(|| RagError::Database("Missing position column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid position column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let values = vectors.value(row);
            let vector = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            hits.push(SearchHit {
                record: VectorRecord {
                    vector,
                    content: contents.value(row).to_string(),
                    metadata: metadata.value(row).to_string(),
                    position: positions.value(row),
                },
                distance,
            });
        }

        Ok(hits)
    }

    /// Number of rows in a table
    #[inline]
    pub async fn count(&self, name: &str) -> Result<usize, RagError> {
        let table = self.open_table(name).await?;

        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::Table, RagError> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table {}: {}", name, e)))
    }

    /// Move a corrupted database aside so a fresh one can be created
    fn attempt_corruption_recovery(db_path: &Path) -> Result<(), RagError> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}
