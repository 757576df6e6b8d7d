//! Guideline-text index: offline rebuild and lazy-loaded query engine.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use fitrag_core::artifact::{
    check_schema_version, fingerprint_file, read_json, source_file_name, ArtifactStore, BuildProvenance, META_FILE, PIPELINE_FILE,
    SCHEMA_VERSION, VECTORS_DIR,
};
use fitrag_core::chunking::{Chunker, ChunkingConfig};
use fitrag_core::config::Config;
use fitrag_core::traits::EmbedProvider;
use fitrag_core::types::{Chunk, Neighbor, TextHit};
use fitrag_core::{Error, Result};
use fitrag_embed::embed_texts;

use crate::search::FlatIndex;
use crate::table::write_vectors;
use crate::BuildReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextIndexMeta {
    pub schema_version: u32,
    pub corpus: String,
    pub source_file: String,
    pub model: String,
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
    pub chunks: Vec<Chunk>,
}

pub struct TextIndexBuilder {
    store: ArtifactStore,
    provider: Arc<dyn EmbedProvider>,
    chunker: Chunker,
    corpus: String,
    model: String,
    batch_size: usize,
}

impl TextIndexBuilder {
    pub fn new(
        store: ArtifactStore,
        provider: Arc<dyn EmbedProvider>,
        chunking: ChunkingConfig,
        corpus: impl Into<String>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            chunker: Chunker::new(chunking),
            corpus: corpus.into(),
            model: model.into(),
            batch_size,
        }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn EmbedProvider>) -> Result<Self> {
        let s = config.settings()?;
        let chunking = ChunkingConfig { max_tokens: s.chunking.max_tokens, overlap_tokens: s.chunking.overlap_tokens };
        Ok(Self::new(
            ArtifactStore::new(config.resolve(&s.data.text_store_dir)),
            provider,
            chunking,
            s.data.corpus_name,
            s.embedding.model,
            s.embedding.batch_size,
        ))
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Chunk, embed and publish `source` as the new current build.
    ///
    /// Any failure before publication leaves the previously published build current.
    pub async fn rebuild(&self, source: &Path) -> Result<BuildReport> {
        let chunks = self.chunker.process_file(source)?;
        let source_blake3 = fingerprint_file(source)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_texts(self.provider.as_ref(), &texts, &self.model, self.batch_size).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::Provider(format!("{} vectors for {} chunks", vectors.len(), chunks.len())));
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);

        let staged = self.store.begin_build(&source_blake3[..8])?;
        if !vectors.is_empty() {
            write_vectors(&staged.dir().join(VECTORS_DIR), &vectors).await?;
        }
        let config = self.chunker.config();
        let meta = TextIndexMeta {
            schema_version: SCHEMA_VERSION,
            corpus: self.corpus.clone(),
            source_file: source_file_name(source),
            model: self.model.clone(),
            chunk_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            chunks,
        };
        staged.write_json(META_FILE, &meta)?;
        staged.write_json(
            PIPELINE_FILE,
            &BuildProvenance {
                schema_version: SCHEMA_VERSION,
                built_from: source_file_name(source),
                provider: Some(self.provider.provider_id().to_string()),
                model: Some(self.model.clone()),
                source_blake3,
                built_at: Utc::now().to_rfc3339(),
                vector_count: vectors.len(),
                dim,
            },
        )?;
        let build_id = staged.id().to_string();
        let dir = staged.publish()?;
        tracing::info!(corpus = %self.corpus, build = %build_id, chunks = vectors.len(), dim, "text index rebuilt");
        Ok(BuildReport { build_id, dir, vector_count: vectors.len(), dim })
    }
}

/// A published text build held in memory.
pub struct LoadedTextIndex {
    pub build_id: String,
    pub dir: PathBuf,
    pub meta: TextIndexMeta,
    pub provenance: BuildProvenance,
    index: Option<FlatIndex>,
}

impl LoadedTextIndex {
    async fn load(store: &ArtifactStore) -> Result<Self> {
        let (build_id, dir) = store.current_build_dir()?;
        let meta: TextIndexMeta = read_json(&dir.join(META_FILE))?;
        check_schema_version(meta.schema_version, META_FILE)?;
        let provenance: BuildProvenance = read_json(&dir.join(PIPELINE_FILE))?;
        check_schema_version(provenance.schema_version, PIPELINE_FILE)?;
        if let Some((pos, chunk)) = meta.chunks.iter().enumerate().find(|(i, c)| c.id != *i) {
            return Err(Error::IncompatibleArtifact(format!("chunk at position {} has id {}", pos, chunk.id)));
        }
        let index = if meta.chunks.is_empty() {
            None
        } else {
            let index = FlatIndex::open(&dir.join(VECTORS_DIR)).await?;
            if index.len() != meta.chunks.len() {
                return Err(Error::IncompatibleArtifact(format!(
                    "text index holds {} vectors but metadata lists {} chunks",
                    index.len(),
                    meta.chunks.len()
                )));
            }
            Some(index)
        };
        tracing::info!(build = %build_id, chunks = meta.chunks.len(), model = %meta.model, "loaded text index");
        Ok(Self { build_id, dir, meta, provenance, index })
    }

    pub fn vector_count(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }
}

/// Turn raw neighbors into ranked hits, dropping "no neighbor" sentinels.
pub fn collect_hits(neighbors: &[Neighbor], chunks: &[Chunk]) -> Result<Vec<TextHit>> {
    let mut hits = Vec::with_capacity(neighbors.len());
    for n in neighbors.iter().filter(|n| !n.is_sentinel()) {
        let chunk = usize::try_from(n.position)
            .ok()
            .and_then(|p| chunks.get(p))
            .ok_or_else(|| Error::IncompatibleArtifact(format!("index returned position {} beyond metadata", n.position)))?;
        hits.push(TextHit { rank: hits.len() + 1, score: n.distance, id: chunk.id, text: chunk.text.clone() });
    }
    Ok(hits)
}

pub struct TextSearchEngine {
    store: ArtifactStore,
    provider: Arc<dyn EmbedProvider>,
    loaded: OnceCell<Arc<LoadedTextIndex>>,
}

impl TextSearchEngine {
    pub fn new(store: ArtifactStore, provider: Arc<dyn EmbedProvider>) -> Self {
        Self { store, provider, loaded: OnceCell::new() }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn EmbedProvider>) -> Result<Self> {
        let s = config.settings()?;
        Ok(Self::new(ArtifactStore::new(config.resolve(&s.data.text_store_dir)), provider))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Load the current build on first use; later calls share the same handle.
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedTextIndex>> {
        let loaded = self
            .loaded
            .get_or_try_init(|| async { LoadedTextIndex::load(&self.store).await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(loaded))
    }

    /// Top `k` chunks nearest to `query`, ascending squared-L2 distance.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<TextHit>> {
        let loaded = self.ensure_loaded().await?;
        let Some(index) = loaded.index.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut vectors = self.provider.embed(&[query.to_string()], &loaded.meta.model).await?;
        let query_vec = match (vectors.pop(), vectors.is_empty()) {
            (Some(v), true) => v,
            _ => return Err(Error::Provider("expected exactly one query embedding".to_string())),
        };
        let neighbors = index.search(&query_vec, k).await?;
        let hits = collect_hits(&neighbors, &loaded.meta.chunks)?;
        tracing::debug!(k, hits = hits.len(), "text search");
        Ok(hits)
    }
}
