//! Embedding providers and the batched embedding driver used by the indexers.
//!
//! `APP_USE_FAKE_EMBEDDINGS=1` swaps the remote provider for the deterministic
//! [`FakeEmbedder`], for tests and offline development.
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use fitrag_core::config::EmbeddingSettings;
use fitrag_core::traits::EmbedProvider;
use fitrag_core::{Error, Result};

pub mod fake;
pub mod openai;

pub use fake::{FakeEmbedder, FAKE_DIM};
pub use openai::OpenAiProvider;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_provider(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbedProvider>> {
    if use_fake_embeddings() {
        tracing::info!(dim = FAKE_DIM, "using fake embeddings");
        return Ok(Arc::new(FakeEmbedder::default()));
    }
    let provider = OpenAiProvider::from_settings(settings)?;
    tracing::info!(endpoint = provider.endpoint(), model = %settings.model, "using remote embeddings");
    Ok(Arc::new(provider))
}

/// Embed `texts` in batches of at most `batch_size`, preserving input order.
///
/// Fails if any batch returns the wrong number of vectors or if vectors disagree
/// on dimension. An empty input makes no provider calls.
pub async fn embed_texts(
    provider: &dyn EmbedProvider,
    texts: &[String],
    model: &str,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(Error::Configuration("embedding batch size must be > 0".to_string()));
    }
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let pb = ProgressBar::new(texts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({percent}%) {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let vectors = provider.embed(batch, model).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Provider(format!(
                "{} returned {} vectors for a batch of {}",
                provider.provider_id(),
                vectors.len(),
                batch.len()
            )));
        }
        let expected = out.first().or(vectors.first()).map(Vec::len).unwrap_or(0);
        if expected == 0 {
            return Err(Error::Provider(format!("{} returned empty vectors", provider.provider_id())));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(Error::Provider(format!(
                "inconsistent embedding dimension: expected {}, got {}",
                expected,
                bad.len()
            )));
        }
        out.extend(vectors);
        pb.set_position(out.len() as u64);
    }
    pb.finish_and_clear();
    tracing::info!(count = out.len(), dim = out[0].len(), provider = provider.provider_id(), "embedded texts");
    Ok(out)
}
