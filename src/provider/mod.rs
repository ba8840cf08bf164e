//! External article providers.
//!
//! Retrieval talks to three collaborators, each behind a trait so tests and
//! alternative backends can stand in for the live services:
//!
//! - [`SearchProvider`]: query text to candidate article identifiers
//! - [`FetchProvider`]: identifier to raw article document
//! - [`SectionExtractor`]: raw document to labeled text sections
//!
//! Live implementations target Europe PMC search, NCBI efetch, and JATS XML.

pub mod europepmc;
pub mod jats;
pub mod ncbi;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to an article provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// API rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The request did not complete within the per-call timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Network or connection error, including non-success HTTP statuses
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other provider-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::ParseError(err.to_string())
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, url: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            ProviderError::RateLimitExceeded(url.to_string())
        } else {
            ProviderError::NetworkError(format!("{} returned {}", url, status))
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A `(section_label, text)` pair produced by a [`SectionExtractor`].
pub type ExtractedSection = (String, String);

/// Finds candidate articles for a free-text query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return up to `max_results` article identifiers relevant to `query`.
    ///
    /// # Errors
    /// Any failure here is terminal for the search request.
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<String>>;

    /// Human-readable provider name, used in logs.
    fn name(&self) -> &str;
}

/// Retrieves the raw document for one article.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Fetch the raw document for `source_id`.
    ///
    /// `Ok(None)` means the article has no retrievable content, which is not
    /// an error.
    async fn fetch(&self, source_id: &str) -> ProviderResult<Option<String>>;
}

/// Splits a raw document into labeled text sections.
pub trait SectionExtractor: Send + Sync {
    /// Extract sections from `raw_document`. An empty result is valid.
    fn extract(&self, raw_document: &str) -> ProviderResult<Vec<ExtractedSection>>;
}

/// Normalize a PubMed Central identifier.
///
/// `"PMC123"` (any case) is kept, a bare number gains the `PMC` prefix, and
/// anything else yields `None`.
pub fn normalize_pmcid(raw: &str) -> Option<String> {
    let value = raw.trim().to_ascii_uppercase();
    if value.starts_with("PMC") {
        Some(value)
    } else if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("PMC{}", value))
    } else {
        None
    }
}
