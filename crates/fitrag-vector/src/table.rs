//! LanceDB connection and vector-table writing.
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator};
use arrow_schema::ArrowError;
use lancedb::{connect, Connection};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use fitrag_core::{Error, Result};

use crate::schema::{build_vector_schema, VECTOR_TABLE};

const WRITE_BATCH_ROWS: usize = 1000;

pub(crate) fn storage_err(e: impl Display) -> Error {
    Error::Storage(e.to_string())
}

pub async fn open_db(path: &Path) -> Result<Connection> {
    connect(path.to_string_lossy().as_ref()).execute().await.map_err(storage_err)
}

/// Create the `vectors` table at `path` holding `vectors` in order; row `i` gets position `i`.
pub async fn write_vectors(path: &Path, vectors: &[Vec<f32>]) -> Result<usize> {
    let dim = vectors
        .first()
        .map(Vec::len)
        .ok_or_else(|| Error::Storage("refusing to create an empty vector table".to_string()))?;
    if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
        return Err(Error::Storage(format!("row {} has dimension {} but table dimension is {}", bad, vectors[bad].len(), dim)));
    }
    let dim_i32 = i32::try_from(dim).map_err(|_| Error::Storage(format!("dimension {} is too large", dim)))?;
    let schema = build_vector_schema(dim_i32);

    let mut batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
    for (n, rows) in vectors.chunks(WRITE_BATCH_ROWS).enumerate() {
        let start = n * WRITE_BATCH_ROWS;
        let positions: Vec<i64> = (start..start + rows.len()).map(|p| p as i64).collect();
        let values = rows.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(positions)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, dim_i32)),
            ],
        )
        .map_err(storage_err)?;
        batches.push(Ok(batch));
    }

    let db = open_db(path).await?;
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
    db.create_table(VECTOR_TABLE, reader).execute().await.map_err(storage_err)?;
    tracing::debug!(path = %path.display(), rows = vectors.len(), dim, "wrote vector table");
    Ok(vectors.len())
}
