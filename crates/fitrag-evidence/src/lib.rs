//! Evidence retrieval facade: owns both search engines and hands their combined
//! results to an external prescription generator.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fitrag_core::artifact::{read_json, ArtifactStore, BuildProvenance, PIPELINE_FILE};
use fitrag_core::config::{Config, RetrievalSettings};
use fitrag_core::traits::EmbedProvider;
use fitrag_core::types::{Measurements, QueryInput, StructuredMatch, TextHit, UserProfile, DEFAULT_STRUCTURED_SOURCE};
use fitrag_core::Result;
use fitrag_vector::{StructuredSearchEngine, TextSearchEngine};

/// Everything the generation step receives for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    pub user: UserProfile,
    pub measurements: Measurements,
    pub text_evidence: Vec<TextHit>,
    pub structured_evidence: Vec<StructuredMatch>,
}

/// Output of the generation step. Neither field is interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(rename = "planText")]
    pub plan_text: String,
    pub evidence: serde_json::Value,
}

#[async_trait]
pub trait PrescriptionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Prescription>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatus {
    pub corpus: String,
    pub store: String,
    pub published: bool,
    pub build_id: Option<String>,
    pub model: Option<String>,
    pub vector_count: Option<usize>,
    pub built_at: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub text: CorpusStatus,
    pub structured: CorpusStatus,
}

fn published_provenance(store: &ArtifactStore) -> Result<Option<(String, BuildProvenance)>> {
    if store.current_build_id()?.is_none() {
        return Ok(None);
    }
    let (id, dir) = store.current_build_dir()?;
    Ok(Some((id, read_json(&dir.join(PIPELINE_FILE))?)))
}

fn corpus_status(corpus: &str, store: &ArtifactStore) -> CorpusStatus {
    let mut status = CorpusStatus {
        corpus: corpus.to_string(),
        store: store.root().display().to_string(),
        published: false,
        build_id: None,
        model: None,
        vector_count: None,
        built_at: None,
        error: None,
    };
    match published_provenance(store) {
        Ok(Some((id, p))) => {
            status.published = true;
            status.build_id = Some(id);
            status.model = p.model;
            status.vector_count = Some(p.vector_count);
            status.built_at = Some(p.built_at);
        }
        Ok(None) => {}
        Err(e) => status.error = Some(e.to_string()),
    }
    status
}

/// Status of the stores named by `config`, without constructing any engine.
pub fn status_report(config: &Config) -> Result<StatusReport> {
    let s = config.settings()?;
    Ok(StatusReport {
        text: corpus_status(&s.data.corpus_name, &ArtifactStore::new(config.resolve(&s.data.text_store_dir))),
        structured: corpus_status(
            DEFAULT_STRUCTURED_SOURCE,
            &ArtifactStore::new(config.resolve(&s.data.structured_store_dir)),
        ),
    })
}

pub struct Retriever {
    text: TextSearchEngine,
    structured: StructuredSearchEngine,
    corpus_name: String,
    defaults: RetrievalSettings,
}

impl Retriever {
    pub fn new(
        text: TextSearchEngine,
        structured: StructuredSearchEngine,
        corpus_name: impl Into<String>,
        defaults: RetrievalSettings,
    ) -> Self {
        Self { text, structured, corpus_name: corpus_name.into(), defaults }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn EmbedProvider>) -> Result<Self> {
        let s = config.settings()?;
        Ok(Self::new(
            TextSearchEngine::from_config(config, provider)?,
            StructuredSearchEngine::from_config(config)?,
            s.data.corpus_name,
            s.retrieval,
        ))
    }

    pub fn defaults(&self) -> &RetrievalSettings {
        &self.defaults
    }

    pub async fn retrieve_text(&self, query: &str, k: usize) -> Result<Vec<TextHit>> {
        self.text.search(query, k).await
    }

    pub async fn retrieve_structured(
        &self,
        user: &UserProfile,
        measurements: &Measurements,
        top_k: usize,
    ) -> Result<Vec<StructuredMatch>> {
        self.structured.search(user, measurements, top_k).await
    }

    /// Run both searches concurrently. Either failure fails the whole request.
    pub async fn gather_evidence(&self, query: &str, input: &QueryInput, k: usize, top_k: usize) -> Result<GenerationRequest> {
        let (text_evidence, structured_evidence) = tokio::try_join!(
            self.retrieve_text(query, k),
            self.retrieve_structured(&input.user, &input.measurements, top_k),
        )?;
        tracing::debug!(text = text_evidence.len(), structured = structured_evidence.len(), "gathered evidence");
        Ok(GenerationRequest {
            query: query.to_string(),
            user: input.user.clone(),
            measurements: input.measurements.clone(),
            text_evidence,
            structured_evidence,
        })
    }

    pub async fn prescribe(
        &self,
        generator: &dyn PrescriptionGenerator,
        query: &str,
        input: &QueryInput,
    ) -> Result<Prescription> {
        let request = self
            .gather_evidence(query, input, self.defaults.text_k, self.defaults.structured_top_k)
            .await?;
        generator.generate(&request).await
    }

    /// Publication state of both corpora, read from provenance without loading indices.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            text: corpus_status(&self.corpus_name, self.text.store()),
            structured: corpus_status(DEFAULT_STRUCTURED_SOURCE, self.structured.store()),
        }
    }
}
