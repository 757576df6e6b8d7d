//! Paragraph collection and overlapping chunking for the guideline corpus.
//!
//! The corpus is a parsed-document JSON (`pages[].items[]` with `md` or `value`
//! text). Paragraphs are packed greedily into chunks under an approximate token
//! budget; each new chunk re-opens with a whole-paragraph tail of the previous one.
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const DEFAULT_MAX_TOKENS: usize = 700;
pub const DEFAULT_OVERLAP_TOKENS: usize = 150;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Strategy used to size paragraphs. Swappable; the default is a word-count heuristic,
/// not a tokenizer.
pub type TokenEstimator = fn(&str) -> usize;

/// `max(1, round(words * 1.3))`. Works on any script that separates words by whitespace
/// and degrades to 1 for text that does not.
pub fn approximate_token_length(text: &str) -> usize {
    let words = text.split_whitespace().count();
    ((words as f64 * 1.3).round() as usize).max(1)
}

#[derive(Debug, Default, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub pages: Vec<Page>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub md: Option<serde_json::Value>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl Item {
    fn text(&self) -> Option<&str> {
        non_empty_str(self.md.as_ref()).or_else(|| non_empty_str(self.value.as_ref()))
    }
}

fn non_empty_str(value: Option<&serde_json::Value>) -> Option<&str> {
    value.and_then(serde_json::Value::as_str).filter(|s| !s.is_empty())
}

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("newline-run pattern is valid"))
}

/// Walk pages then items, keeping each item's text with newline runs collapsed to one
/// blank line. Empty results are dropped; source order is kept.
pub fn collect_text(corpus: &Corpus) -> Vec<String> {
    corpus
        .pages
        .iter()
        .flat_map(|page| page.items.iter())
        .filter_map(Item::text)
        .map(|text| newline_runs().replace_all(text, PARAGRAPH_SEPARATOR).trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Greedy chunking with the default estimator.
pub fn chunk_paragraphs<S: AsRef<str>>(paragraphs: &[S], max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    Chunker::new(ChunkingConfig { max_tokens, overlap_tokens }).chunk(paragraphs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: DEFAULT_MAX_TOKENS, overlap_tokens: DEFAULT_OVERLAP_TOKENS }
    }
}

pub struct Chunker {
    config: ChunkingConfig,
    estimate: TokenEstimator,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config, estimate: approximate_token_length }
    }

    pub fn with_estimator(mut self, estimate: TokenEstimator) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Read a corpus file and turn it into id-ordered chunks.
    pub fn process_file(&self, source: &Path) -> Result<Vec<Chunk>> {
        if !source.is_file() {
            return Err(Error::MissingSource(source.to_path_buf()));
        }
        let corpus: Corpus = serde_json::from_str(&fs::read_to_string(source)?)?;
        let paragraphs = collect_text(&corpus);
        let chunks = self.chunk(&paragraphs);
        tracing::info!(source = %source.display(), paragraphs = paragraphs.len(), chunks = chunks.len(), "chunked corpus");
        Ok(chunks.into_iter().enumerate().map(|(id, text)| Chunk { id, text }).collect())
    }

    /// Pack paragraphs into chunks. A paragraph larger than the budget still becomes
    /// (part of) a chunk whole; nothing is split mid-paragraph.
    pub fn chunk<S: AsRef<str>>(&self, paragraphs: &[S]) -> Vec<String> {
        let ChunkingConfig { max_tokens, overlap_tokens } = self.config;
        let mut chunks = Vec::new();
        let mut buf: Vec<&str> = Vec::new();
        let mut size = 0usize;
        for paragraph in paragraphs.iter().map(AsRef::as_ref) {
            let len = (self.estimate)(paragraph);
            if size + len <= max_tokens {
                buf.push(paragraph);
                size += len;
                continue;
            }
            if !buf.is_empty() {
                chunks.push(buf.join(PARAGRAPH_SEPARATOR));
            }
            let mut keep = self.overlap_tail(&buf, overlap_tokens);
            keep.push(paragraph);
            size = keep.iter().map(|p| (self.estimate)(p)).sum();
            buf = keep;
        }
        if !buf.is_empty() {
            chunks.push(buf.join(PARAGRAPH_SEPARATOR));
        }
        chunks
    }

    fn overlap_tail<'a>(&self, buf: &[&'a str], overlap_tokens: usize) -> Vec<&'a str> {
        let mut keep = Vec::new();
        let mut kept = 0usize;
        for paragraph in buf.iter().rev() {
            let len = (self.estimate)(paragraph);
            if kept + len > overlap_tokens {
                break;
            }
            keep.push(*paragraph);
            kept += len;
        }
        keep.reverse();
        keep
    }
}
