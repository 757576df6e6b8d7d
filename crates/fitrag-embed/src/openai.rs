//! Client for OpenAI-compatible `/embeddings` endpoints.
//!
//! One request per call, no retries: a failed request surfaces as
//! `Error::Provider` and the caller decides what to do with the build.
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use fitrag_core::config::EmbeddingSettings;
use fitrag_core::traits::EmbedProvider;
use fitrag_core::{Error, Result};

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    id: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("embedding API key is empty".to_string()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| Error::Configuration("embedding API key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;
        let base = base_url.trim_end_matches('/');
        Ok(Self { client, endpoint: format!("{}/embeddings", base), id: format!("openai:{}", base) })
    }

    /// Build from settings, reading the credential from `settings.api_key_env`.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let key = std::env::var(&settings.api_key_env).map_err(|_| {
            Error::Configuration(format!("{} is not set; the embedding provider needs a credential", settings.api_key_env))
        })?;
        Self::new(&key, &settings.base_url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbedProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model, input: texts };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("embeddings request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Provider(format!("embeddings request failed ({}): {}", status, body)));
        }
        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("failed to parse embeddings response: {}", e)))?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(Error::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        tracing::debug!(model, inputs = texts.len(), "embedded batch");
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
