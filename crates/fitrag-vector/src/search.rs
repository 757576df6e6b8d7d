//! Exact nearest-neighbor scan over a published `vectors` table.
//!
//! The table carries no ANN index, so every query is an exhaustive squared-L2 scan.
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int64Type};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;

use fitrag_core::types::Neighbor;
use fitrag_core::{Error, Result};

use crate::schema::{vector_dim, DISTANCE_COLUMN, POSITION_COLUMN, VECTOR_COLUMN, VECTOR_TABLE};
use crate::table::{open_db, storage_err};

pub struct FlatIndex {
    table: Table,
    dim: usize,
    len: usize,
}

impl FlatIndex {
    /// Open the vector table under `path`. `IndexNotFound` if the dataset or table is absent.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::IndexNotFound(format!("vector dataset {} is missing", path.display())));
        }
        let db = open_db(path).await?;
        let names = db.table_names().execute().await.map_err(storage_err)?;
        if !names.iter().any(|n| n == VECTOR_TABLE) {
            return Err(Error::IndexNotFound(format!("{} has no '{}' table", path.display(), VECTOR_TABLE)));
        }
        let table = db.open_table(VECTOR_TABLE).execute().await.map_err(storage_err)?;
        let schema = table.schema().await.map_err(storage_err)?;
        let dim = vector_dim(&schema).ok_or_else(|| {
            Error::IncompatibleArtifact(format!("{} lacks a fixed-size '{}' column", path.display(), VECTOR_COLUMN))
        })?;
        let len = table.count_rows(None).await.map_err(storage_err)?;
        Ok(Self { table, dim, len })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Up to `k` neighbors of `query` by ascending squared-L2 distance.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::SchemaMismatch(format!(
                "query vector has dimension {} but the index holds dimension {}",
                query.len(),
                self.dim
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut stream = self
            .table
            .vector_search(query.to_vec())
            .map_err(storage_err)?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::L2)
            .limit(k)
            .execute()
            .await
            .map_err(storage_err)?;

        let mut out = Vec::with_capacity(k.min(self.len));
        while let Some(batch) = stream.try_next().await.map_err(storage_err)? {
            let positions = batch
                .column_by_name(POSITION_COLUMN)
                .and_then(|c| c.as_primitive_opt::<Int64Type>())
                .ok_or_else(|| Error::Storage(format!("search result lacks '{}'", POSITION_COLUMN)))?;
            let distances = batch
                .column_by_name(DISTANCE_COLUMN)
                .and_then(|c| c.as_primitive_opt::<Float32Type>())
                .ok_or_else(|| Error::Storage(format!("search result lacks '{}'", DISTANCE_COLUMN)))?;
            for i in 0..batch.num_rows() {
                out.push(Neighbor { position: positions.value(i), distance: distances.value(i) });
            }
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.position.cmp(&b.position)));
        out.truncate(k);
        tracing::debug!(k, returned = out.len(), "flat scan");
        Ok(out)
    }
}
