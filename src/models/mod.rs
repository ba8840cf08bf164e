//! Core data models for the PMC semantic search system.
//!
//! This module contains the data structures that flow through a search request:
//! the article sections produced by extraction, the ranked sections produced by
//! scoring, and the serializable response handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labeled span of article text extracted from one source document.
///
/// Sections are produced by the extractor, owned by the retrieval step for the
/// duration of one request, and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Source document identifier (a normalized PMCID such as `PMC1234567`)
    pub source_id: String,

    /// Section heading, or a generic label when the document has none
    pub section_label: String,

    /// Full section text
    pub text: String,
}

impl DocumentSection {
    /// Create a new document section.
    pub fn new(
        source_id: impl Into<String>,
        section_label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            section_label: section_label.into(),
            text: text.into(),
        }
    }

    /// Length of the trimmed text in characters.
    pub fn usable_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// A candidate section paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSection {
    /// Cosine similarity between the section and the query, in `[-1, 1]`
    pub score: f32,

    /// The scored section
    pub section: DocumentSection,
}

/// A single search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source document identifier
    pub source_id: String,

    /// Label of the matching section
    pub section_label: String,

    /// Cosine similarity score (-1.0 to 1.0, higher is better)
    pub score: f32,

    /// Sentence-aligned excerpt of the section text
    pub summary: String,

    /// Link to the article landing page
    pub link: String,
}

/// The full response for one query.
///
/// `results` is ordered by descending score and never longer than the
/// requested `top_k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The query text as received
    pub query: String,

    /// Time the response was assembled
    pub retrieved_at: DateTime<Utc>,

    /// Ranked results
    pub results: Vec<SearchResult>,
}

impl QueryResponse {
    /// A response with no results, stamped with the current time.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            retrieved_at: Utc::now(),
            results: Vec::new(),
        }
    }
}

/// Identity of the embedding model that produced a vector.
///
/// Cached vectors are tagged with this so that switching models never
/// serves vectors from an incompatible embedding space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "AllMiniLML6V2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
