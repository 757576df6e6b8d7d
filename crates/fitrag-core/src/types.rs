//! Domain types shared by the indexers, searches and the evidence facade.

use serde::{Deserialize, Serialize};

pub type ChunkId = usize;
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// A span of consecutive guideline paragraphs, the unit of text retrieval.
///
/// `id` is the 0-based position in the chunk sequence and equals the row position
/// of its vector in the text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
}

/// A ranked text match. `score` is the raw squared-L2 distance: lower is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    pub rank: usize,
    pub score: f32,
    pub id: ChunkId,
    pub text: String,
}

/// Position returned by a flat index for "no neighbor at this rank".
pub const NO_NEIGHBOR: i64 = -1;

/// One result of a flat-index scan: row position plus the backend's distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: i64,
    pub distance: f32,
}

impl Neighbor {
    pub fn is_sentinel(&self) -> bool {
        self.position < 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default)]
    pub situp_reps: Option<f64>,
    #[serde(default)]
    pub reach_cm: Option<f64>,
    #[serde(default)]
    pub step_vo2max: Option<f64>,
    #[serde(default)]
    pub step_bpm: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Per-request payload from the handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryInput {
    #[serde(default)]
    pub user: UserProfile,
    #[serde(default)]
    pub measurements: Measurements,
}

pub const DEFAULT_STRUCTURED_SOURCE: &str = "csv";

fn default_source() -> String {
    DEFAULT_STRUCTURED_SOURCE.to_string()
}

/// Row metadata stored alongside the structured index, positionally aligned with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDoc {
    pub row_id: u64,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub situp_reps: Option<f64>,
    #[serde(default)]
    pub reach_cm: Option<f64>,
    #[serde(default)]
    pub vo2max: Option<f64>,
    #[serde(default)]
    pub prescription_text: String,
    #[serde(default = "default_source")]
    pub source: String,
}

/// A structured match. `score` is cosine similarity: higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMatch {
    pub row_id: u64,
    pub score: f32,
    pub sex: Option<String>,
    pub age: Option<f64>,
    pub bmi: Option<f64>,
    pub situp_reps: Option<f64>,
    pub reach_cm: Option<f64>,
    pub vo2max: Option<f64>,
    pub prescription_text: String,
    pub source: String,
}

impl StructuredMatch {
    pub fn from_doc(doc: &StructuredDoc, score: f32) -> Self {
        Self {
            row_id: doc.row_id,
            score,
            sex: doc.sex.clone(),
            age: doc.age,
            bmi: doc.bmi,
            situp_reps: doc.situp_reps,
            reach_cm: doc.reach_cm,
            vo2max: doc.vo2max,
            prescription_text: doc.prescription_text.clone(),
            source: doc.source.clone(),
        }
    }
}
