use async_trait::async_trait;

use crate::error::Result;
use crate::tabular::TabularRecord;

/// External embedding service.
#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for logs and provenance (e.g. `openai:https://api.openai.com/v1`).
    fn provider_id(&self) -> &str;
    /// Embed `texts` with `model`, one vector per input in input order.
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>>;
}

/// Previously fitted encoder from a tabular record to a fixed-length vector.
pub trait FeatureTransform: Send + Sync {
    fn output_dim(&self) -> usize;
    fn transform(&self, record: &TabularRecord) -> Result<Vec<f32>>;
}
