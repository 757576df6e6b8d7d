//! Structured fitness-record index: builder and cosine-similarity search.
//!
//! Rows are encoded with a fitted [`FittedPipeline`], L2-normalized and stored in a
//! flat squared-L2 table. On unit vectors `d = 2 - 2cos`, so similarity is `1 - d / 2`.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use fitrag_core::artifact::{
    check_schema_version, fingerprint_bytes, read_json, source_file_name, ArtifactStore, BuildProvenance, META_FILE, PIPELINE_FILE, SCHEMA_VERSION,
    TRANSFORM_FILE, VECTORS_DIR,
};
use fitrag_core::config::Config;
use fitrag_core::tabular::{map_to_schema, FitnessRecord, TabularRecord};
use fitrag_core::traits::FeatureTransform;
use fitrag_core::transform::FittedPipeline;
use fitrag_core::types::{Measurements, Neighbor, StructuredDoc, StructuredMatch, UserProfile, DEFAULT_STRUCTURED_SOURCE};
use fitrag_core::{Error, Result};

use crate::search::FlatIndex;
use crate::table::write_vectors;
use crate::BuildReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMeta {
    pub schema_version: u32,
    pub corpus: String,
    pub source_file: String,
    pub docs: Vec<StructuredDoc>,
}

/// Scale `v` to unit length in place; the zero vector is left unchanged.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub struct StructuredIndexBuilder {
    store: ArtifactStore,
}

impl StructuredIndexBuilder {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let s = config.settings()?;
        Ok(Self::new(ArtifactStore::new(config.resolve(&s.data.structured_store_dir))))
    }

    pub async fn rebuild(&self, source: &Path) -> Result<BuildReport> {
        let raw = match fs::read(source) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::MissingSource(source.to_path_buf())),
            Err(e) => return Err(e.into()),
        };
        let source_blake3 = fingerprint_bytes(&raw);
        let rows: Vec<FitnessRecord> = serde_json::from_slice(&raw)?;
        tracing::info!(source = %source.display(), rows = rows.len(), "loaded structured records");

        let records: Vec<TabularRecord> = rows.iter().map(FitnessRecord::to_record).collect();
        let pipeline = FittedPipeline::fit(&records);
        let mut vectors = Vec::with_capacity(records.len());
        for record in &records {
            let mut v = pipeline.transform(record)?;
            normalize_l2(&mut v);
            vectors.push(v);
        }
        let dim = pipeline.output_dim();

        let staged = self.store.begin_build(&source_blake3[..8])?;
        if !vectors.is_empty() {
            write_vectors(&staged.dir().join(VECTORS_DIR), &vectors).await?;
        }
        let meta = StructuredMeta {
            schema_version: SCHEMA_VERSION,
            corpus: DEFAULT_STRUCTURED_SOURCE.to_string(),
            source_file: source_file_name(source),
            docs: rows.iter().enumerate().map(|(i, r)| r.to_doc(i)).collect(),
        };
        staged.write_json(META_FILE, &meta)?;
        staged.write_json(TRANSFORM_FILE, &pipeline)?;
        staged.write_json(
            PIPELINE_FILE,
            &BuildProvenance {
                schema_version: SCHEMA_VERSION,
                built_from: source_file_name(source),
                provider: Some("fitted-pipeline".to_string()),
                model: None,
                source_blake3,
                built_at: Utc::now().to_rfc3339(),
                vector_count: vectors.len(),
                dim,
            },
        )?;
        let build_id = staged.id().to_string();
        let dir = staged.publish()?;
        tracing::info!(build = %build_id, rows = vectors.len(), dim, "structured index rebuilt");
        Ok(BuildReport { build_id, dir, vector_count: vectors.len(), dim })
    }
}

pub struct LoadedStructuredIndex {
    pub build_id: String,
    pub dir: PathBuf,
    pub meta: StructuredMeta,
    pub provenance: BuildProvenance,
    transform: Arc<dyn FeatureTransform>,
    index: Option<FlatIndex>,
}

impl LoadedStructuredIndex {
    async fn load(store: &ArtifactStore, transform: Option<Arc<dyn FeatureTransform>>) -> Result<Self> {
        let (build_id, dir) = store.current_build_dir()?;
        let meta: StructuredMeta = read_json(&dir.join(META_FILE))?;
        check_schema_version(meta.schema_version, META_FILE)?;
        let provenance: BuildProvenance = read_json(&dir.join(PIPELINE_FILE))?;
        check_schema_version(provenance.schema_version, PIPELINE_FILE)?;
        let transform = match transform {
            Some(t) => t,
            None => {
                let fitted: FittedPipeline = read_json(&dir.join(TRANSFORM_FILE))?;
                Arc::new(fitted) as Arc<dyn FeatureTransform>
            }
        };
        let index = if meta.docs.is_empty() {
            None
        } else {
            let index = FlatIndex::open(&dir.join(VECTORS_DIR)).await?;
            if index.len() != meta.docs.len() {
                return Err(Error::IncompatibleArtifact(format!(
                    "structured index holds {} vectors but metadata lists {} rows",
                    index.len(),
                    meta.docs.len()
                )));
            }
            Some(index)
        };
        tracing::info!(build = %build_id, rows = meta.docs.len(), "loaded structured index");
        Ok(Self { build_id, dir, meta, provenance, transform, index })
    }

    pub fn vector_count(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }

    pub fn transform(&self) -> &dyn FeatureTransform {
        self.transform.as_ref()
    }
}

/// Join neighbors with row metadata, drop sentinels and rank by descending similarity.
pub fn collect_matches(neighbors: &[Neighbor], docs: &[StructuredDoc], top_k: usize) -> Result<Vec<StructuredMatch>> {
    let mut matches = Vec::with_capacity(neighbors.len().min(top_k));
    for n in neighbors.iter().filter(|n| !n.is_sentinel()) {
        let doc = usize::try_from(n.position)
            .ok()
            .and_then(|p| docs.get(p))
            .ok_or_else(|| Error::IncompatibleArtifact(format!("index returned position {} beyond metadata", n.position)))?;
        matches.push(StructuredMatch::from_doc(doc, 1.0 - n.distance / 2.0));
    }
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(top_k);
    Ok(matches)
}

pub struct StructuredSearchEngine {
    store: ArtifactStore,
    transform: Option<Arc<dyn FeatureTransform>>,
    loaded: OnceCell<Arc<LoadedStructuredIndex>>,
}

impl StructuredSearchEngine {
    /// Engine that loads the transform persisted with each build.
    pub fn new(store: ArtifactStore) -> Self {
        Self { store, transform: None, loaded: OnceCell::new() }
    }

    /// Engine that encodes queries with `transform` instead of the persisted one.
    pub fn with_transform(store: ArtifactStore, transform: Arc<dyn FeatureTransform>) -> Self {
        Self { store, transform: Some(transform), loaded: OnceCell::new() }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let s = config.settings()?;
        Ok(Self::new(ArtifactStore::new(config.resolve(&s.data.structured_store_dir))))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedStructuredIndex>> {
        let loaded = self
            .loaded
            .get_or_try_init(|| async { LoadedStructuredIndex::load(&self.store, self.transform.clone()).await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(loaded))
    }

    /// Map, encode and normalize the request, then return up to `top_k` most similar rows.
    pub async fn search(&self, user: &UserProfile, measurements: &Measurements, top_k: usize) -> Result<Vec<StructuredMatch>> {
        let loaded = self.ensure_loaded().await?;
        let record = map_to_schema(user, measurements);
        let mut query = loaded.transform.transform(&record)?;
        normalize_l2(&mut query);
        let Some(index) = loaded.index.as_ref() else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let neighbors = index.search(&query, top_k).await?;
        let matches = collect_matches(&neighbors, &loaded.meta.docs, top_k)?;
        tracing::debug!(top_k, matches = matches.len(), "structured search");
        Ok(matches)
    }
}
