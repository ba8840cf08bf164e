//! Search configuration.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied by the binary)
//! 2. Config file passed with `--config`
//! 3. Compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::europepmc::DEFAULT_SEARCH_URL;
use crate::provider::ncbi::DEFAULT_EFETCH_URL;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config {path}: {message}")]
    ReadError { path: String, message: String },

    /// The config file is not valid TOML for this schema
    #[error("Invalid config {path}: {message}")]
    ParseError { path: String, message: String },

    /// A value is out of range
    #[error("Invalid value for {field}: {message}")]
    ValidationFailed { field: String, message: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for one search deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when the caller does not ask for a count
    pub top_k: usize,

    /// Candidate articles requested per result slot
    pub over_fetch_factor: usize,

    /// Concurrent fetch+extract tasks
    pub max_concurrency: usize,

    /// Minimum trimmed section length worth embedding
    pub min_section_chars: usize,

    /// Summary length, in characters, at which sentence accumulation stops
    pub summary_min_chars: usize,

    /// Secondary stop for accumulation; whole sentences may still exceed it
    pub summary_max_chars: usize,

    /// Per-call timeout for the search provider
    pub search_timeout_secs: u64,

    /// Per-call timeout for the fetch provider
    pub fetch_timeout_secs: u64,

    /// SQLite file backing the embedding cache
    pub cache_path: PathBuf,

    /// Result link template; `{id}` is replaced by the source identifier
    pub link_template: String,

    /// Europe PMC REST search endpoint
    pub europe_pmc_url: String,

    /// NCBI E-utilities efetch endpoint
    pub efetch_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            over_fetch_factor: 2,
            max_concurrency: 5,
            min_section_chars: 200,
            summary_min_chars: 800,
            summary_max_chars: 1500,
            search_timeout_secs: 15,
            fetch_timeout_secs: 20,
            cache_path: PathBuf::from("data/embedding_cache.sqlite"),
            link_template: "https://pmc.ncbi.nlm.nih.gov/articles/{id}/".to_string(),
            europe_pmc_url: DEFAULT_SEARCH_URL.to_string(),
            efetch_url: DEFAULT_EFETCH_URL.to_string(),
        }
    }
}

impl SearchConfig {
    /// Load a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.over_fetch_factor == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "over_fetch_factor".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.summary_min_chars > self.summary_max_chars {
            return Err(ConfigError::ValidationFailed {
                field: "summary_min_chars".to_string(),
                message: format!(
                    "must not exceed summary_max_chars ({})",
                    self.summary_max_chars
                ),
            });
        }
        if !self.link_template.contains("{id}") {
            return Err(ConfigError::ValidationFailed {
                field: "link_template".to_string(),
                message: "must contain the {id} placeholder".to_string(),
            });
        }
        Ok(())
    }

    /// Search provider timeout as a `Duration`.
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Fetch provider timeout as a `Duration`.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
