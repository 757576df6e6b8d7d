//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml` + `APP_*`
//! env vars (nested keys split on `__`, e.g. `APP_EMBEDDING__MODEL`). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunking::{DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSettings {
    pub corpus_name: String,
    pub acsm_source: String,
    pub text_store_dir: String,
    pub structured_source: String,
    pub structured_store_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    pub model: String,
    pub batch_size: usize,
    pub base_url: String,
    /// Name of the environment variable holding the provider credential.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingSettings {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    pub text_k: usize,
    pub structured_top_k: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data: DataSettings {
                corpus_name: "acsm6".to_string(),
                acsm_source: "fitness_reports/acsm_guidelines.json".to_string(),
                text_store_dir: "embed_store/acsm6".to_string(),
                structured_source: "fitness_reports/structured_records.json".to_string(),
                structured_store_dir: "embed_store/csv".to_string(),
            },
            embedding: EmbeddingSettings {
                model: "text-embedding-3-small".to_string(),
                batch_size: 64,
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                timeout_secs: 60,
            },
            chunking: ChunkingSettings {
                max_tokens: DEFAULT_MAX_TOKENS,
                overlap_tokens: DEFAULT_OVERLAP_TOKENS,
            },
            retrieval: RetrievalSettings { text_k: 5, structured_top_k: 6 },
        }
    }
}

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let base_dir = env::current_dir()?;
        let config = Self { figment, base_dir };
        config.validate()?;
        Ok(config)
    }

    /// Build a config from an explicit figment; paths resolve against `base_dir`.
    pub fn from_figment(figment: Figment, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = Self { figment, base_dir: base_dir.into() };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::Configuration(format!("Failed to load settings: {}", e)))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.base_dir, p)
    }

    fn validate(&self) -> Result<()> {
        let settings = self.settings()?;
        if settings.embedding.batch_size == 0 {
            return Err(Error::Configuration("embedding.batch_size must be > 0".to_string()));
        }
        if settings.chunking.max_tokens == 0 {
            return Err(Error::Configuration("chunking.max_tokens must be > 0".to_string()));
        }
        if settings.embedding.model.trim().is_empty() {
            return Err(Error::Configuration("embedding.model is empty".to_string()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
