//! Flat vector indices on LanceDB for the guideline-text and structured-record corpora.
//!
//! Each corpus lives in its own artifact store (see `fitrag_core::artifact`). Builders
//! write a complete build and publish it atomically; search engines follow `CURRENT`
//! once and keep the loaded build for the life of the engine.
use std::path::PathBuf;

pub mod schema;
pub mod search;
pub mod structured;
pub mod table;
pub mod text;

pub use search::FlatIndex;
pub use structured::{collect_matches, normalize_l2, StructuredIndexBuilder, StructuredMeta, StructuredSearchEngine};
pub use text::{collect_hits, TextIndexBuilder, TextIndexMeta, TextSearchEngine};

/// Outcome of a published rebuild.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub build_id: String,
    pub dir: PathBuf,
    pub vector_count: usize,
    pub dim: usize,
}
