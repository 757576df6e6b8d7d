use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use fitrag_core::artifact::{ArtifactStore, META_FILE, VECTORS_DIR};
use fitrag_core::chunking::ChunkingConfig;
use fitrag_core::traits::EmbedProvider;
use fitrag_core::types::{Chunk, Neighbor, NO_NEIGHBOR};
use fitrag_core::{Error, Result};
use fitrag_embed::FakeEmbedder;
use fitrag_vector::{collect_hits, TextIndexBuilder, TextSearchEngine};

const DIM: usize = 64;

/// Fake embedder that records how it is called.
struct Recording {
    inner: FakeEmbedder,
    calls: AtomicUsize,
    last_model: Mutex<Option<String>>,
}

impl Recording {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: FakeEmbedder::new(DIM), calls: AtomicUsize::new(0), last_model: Mutex::new(None) })
    }
}

#[async_trait]
impl EmbedProvider for Recording {
    fn provider_id(&self) -> &str {
        "recording"
    }
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock().unwrap() = Some(model.to_string());
        self.inner.embed(texts, model).await
    }
}

struct Failing;

#[async_trait]
impl EmbedProvider for Failing {
    fn provider_id(&self) -> &str {
        "failing"
    }
    async fn embed(&self, _texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Err(Error::Provider("service unavailable".to_string()))
    }
}

fn paragraphs() -> Vec<String> {
    vec![
        "Warm up with five minutes of brisk walking before any resistance work".to_string(),
        "Squats strengthen the quadriceps and glutes when performed to a comfortable depth".to_string(),
        "Aerobic training three to five days per week improves cardiorespiratory fitness".to_string(),
        "Static stretching after exercise helps maintain flexibility of the hamstrings".to_string(),
        "Older adults benefit from balance training such as single leg stands".to_string(),
        "Progress intensity gradually and monitor the rating of perceived exertion".to_string(),
    ]
}

fn write_corpus(dir: &Path, paras: &[String]) -> PathBuf {
    let items: Vec<serde_json::Value> = paras.iter().map(|p| serde_json::json!({ "md": p })).collect();
    let corpus = serde_json::json!({ "pages": [{ "items": items }] });
    let path = dir.join("acsm.json");
    fs::write(&path, corpus.to_string()).unwrap();
    path
}

fn builder(store: &ArtifactStore, provider: Arc<dyn EmbedProvider>, model: &str) -> TextIndexBuilder {
    TextIndexBuilder::new(store.clone(), provider, ChunkingConfig { max_tokens: 30, overlap_tokens: 10 }, "acsm6", model, 2)
}

#[tokio::test]
async fn text_full_flow() {
    let tmp = TempDir::new().unwrap();
    let source = write_corpus(tmp.path(), &paragraphs());
    let store = ArtifactStore::new(tmp.path().join("store"));
    let provider = Recording::new();

    let report = builder(&store, provider.clone(), "model-a").rebuild(&source).await.unwrap();
    assert!(report.vector_count > 1);
    assert_eq!(report.dim, DIM);

    let engine = TextSearchEngine::new(store.clone(), provider.clone());
    let loaded = engine.ensure_loaded().await.unwrap();
    assert_eq!(loaded.build_id, report.build_id);
    assert_eq!(loaded.vector_count(), loaded.meta.chunks.len());
    assert_eq!(loaded.meta.chunks.len(), report.vector_count);
    assert_eq!(loaded.provenance.vector_count, report.vector_count);
    assert_eq!((loaded.meta.chunk_tokens, loaded.meta.overlap_tokens), (30, 10));
    assert_eq!(loaded.provenance.built_from, "acsm.json");
    assert_eq!(loaded.provenance.provider.as_deref(), Some("recording"));
    assert_eq!(loaded.provenance.model.as_deref(), Some("model-a"));
    assert_eq!(loaded.meta.source_file, "acsm.json");

    let hits = engine.search("squats and balance for older adults", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.rank, i + 1);
        assert_eq!(hit.text, loaded.meta.chunks[hit.id].text);
    }
    assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
    assert_eq!(provider.last_model.lock().unwrap().as_deref(), Some("model-a"));

    let all = engine.search("anything", 100).await.unwrap();
    assert_eq!(all.len(), report.vector_count);

    let target = &loaded.meta.chunks[1];
    let exact = engine.search(&target.text, 1).await.unwrap();
    assert_eq!(exact[0].id, target.id);
    assert!(exact[0].score.abs() < 1e-4);
}

#[tokio::test]
async fn empty_corpus_publishes_and_searches_empty() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("empty.json");
    fs::write(&source, r#"{"pages": []}"#).unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));
    let provider = Recording::new();

    let report = builder(&store, provider.clone(), "model-a").rebuild(&source).await.unwrap();
    assert_eq!(report.vector_count, 0);
    assert!(!report.dir.join(VECTORS_DIR).exists());

    let engine = TextSearchEngine::new(store, provider.clone());
    assert!(engine.search("walking", 5).await.unwrap().is_empty());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_build() {
    let tmp = TempDir::new().unwrap();
    let source = write_corpus(tmp.path(), &paragraphs());
    let store = ArtifactStore::new(tmp.path().join("store"));
    let good = builder(&store, Recording::new(), "model-a").rebuild(&source).await.unwrap();

    let err = builder(&store, Arc::new(Failing), "model-a").rebuild(&source).await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
    let err = builder(&store, Recording::new(), "model-a").rebuild(&tmp.path().join("absent.json")).await.unwrap_err();
    assert!(matches!(err, Error::MissingSource(_)));

    assert_eq!(store.current_build_id().unwrap().as_deref(), Some(good.build_id.as_str()));
    let engine = TextSearchEngine::new(store, Recording::new());
    assert_eq!(engine.search("stretching", 2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn loaded_engine_survives_a_rebuild() {
    let tmp = TempDir::new().unwrap();
    let source = write_corpus(tmp.path(), &paragraphs());
    let store = ArtifactStore::new(tmp.path().join("store"));
    let provider = Recording::new();
    let first = builder(&store, provider.clone(), "model-a").rebuild(&source).await.unwrap();

    let engine = TextSearchEngine::new(store.clone(), provider.clone());
    let before = engine.search("balance training", 2).await.unwrap();

    write_corpus(tmp.path(), &paragraphs()[..3]);
    let second = builder(&store, provider.clone(), "model-a").rebuild(&source).await.unwrap();
    assert_ne!(first.build_id, second.build_id);
    assert_eq!(store.current_build_id().unwrap(), Some(second.build_id));

    let after = engine.search("balance training", 2).await.unwrap();
    assert_eq!(engine.ensure_loaded().await.unwrap().build_id, first.build_id);
    assert_eq!(before, after);

    let fresh = TextSearchEngine::new(store.clone(), provider);
    assert_eq!(fresh.ensure_loaded().await.unwrap().vector_count(), second.vector_count);
}

#[tokio::test]
async fn concurrent_first_use_loads_once() {
    let tmp = TempDir::new().unwrap();
    let source = write_corpus(tmp.path(), &paragraphs());
    let store = ArtifactStore::new(tmp.path().join("store"));
    builder(&store, Recording::new(), "model-a").rebuild(&source).await.unwrap();

    let engine = Arc::new(TextSearchEngine::new(store, Recording::new()));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ensure_loaded().await.unwrap() })
        })
        .collect();
    let mut handles = Vec::new();
    for t in tasks {
        handles.push(t.await.unwrap());
    }
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test]
async fn missing_or_incompatible_artifacts_are_reported() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path().join("store"));
    let engine = TextSearchEngine::new(store.clone(), Recording::new());
    assert!(matches!(engine.search("q", 5).await, Err(Error::IndexNotFound(_))));

    let source = write_corpus(tmp.path(), &paragraphs());
    let report = builder(&store, Recording::new(), "model-a").rebuild(&source).await.unwrap();
    let meta_path = report.dir.join(META_FILE);
    let original: serde_json::Value = serde_json::from_str(&fs::read_to_string(&meta_path).unwrap()).unwrap();

    let mut bumped = original.clone();
    bumped["schema_version"] = serde_json::json!(2);
    fs::write(&meta_path, bumped.to_string()).unwrap();
    let engine = TextSearchEngine::new(store.clone(), Recording::new());
    assert!(matches!(engine.ensure_loaded().await, Err(Error::IncompatibleArtifact(_))));

    let mut truncated = original;
    truncated["chunks"].as_array_mut().unwrap().pop();
    fs::write(&meta_path, truncated.to_string()).unwrap();
    let engine = TextSearchEngine::new(store, Recording::new());
    assert!(matches!(engine.ensure_loaded().await, Err(Error::IncompatibleArtifact(_))));
}

#[test]
fn sentinel_neighbors_are_dropped() {
    let chunks: Vec<Chunk> = (0..3).map(|id| Chunk { id, text: format!("chunk {}", id) }).collect();
    let neighbors = [
        Neighbor { position: 2, distance: 0.1 },
        Neighbor { position: 0, distance: 0.4 },
        Neighbor { position: NO_NEIGHBOR, distance: f32::MAX },
        Neighbor { position: NO_NEIGHBOR, distance: f32::MAX },
    ];
    let hits = collect_hits(&neighbors, &chunks).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!((hits[0].rank, hits[0].id), (1, 2));
    assert_eq!((hits[1].rank, hits[1].id), (2, 0));

    let beyond = [Neighbor { position: 7, distance: 0.0 }];
    assert!(matches!(collect_hits(&beyond, &chunks), Err(Error::IncompatibleArtifact(_))));
}
