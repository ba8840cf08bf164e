//! PMC Semantic Search - semantic section search over open-access biomedical articles.
//!
//! Given a free-text query, the library finds candidate open-access articles,
//! extracts their sections, ranks the sections by embedding similarity to the
//! query and returns sentence-aligned excerpts with links.
//!
//! # Architecture
//!
//! - **models**: Data structures (DocumentSection, SearchResult, QueryResponse, etc.)
//! - **embedding**: Embedding providers and the normalizing `Embedder`
//! - **storage**: Content-addressed embedding cache (SQLite-based)
//! - **summary**: Sentence-aligned extractive summaries
//! - **provider**: Article search, fetch and section extraction
//! - **retrieval**: Concurrent candidate fetching with partial-failure tolerance
//! - **query**: Similarity ranking
//! - **pipeline**: The composed `search` operation
//! - **config**: Tunables and TOML loading
//!
//! # Workflow
//!
//! 1. Ask the search provider for up to `top_k * over_fetch_factor` articles
//! 2. Fetch and extract every article concurrently, dropping failures and short sections
//! 3. Embed the query and every section, serving repeats from the cache
//! 4. Rank sections by cosine similarity and keep the top-k
//! 5. Summarize each kept section and attach its article link
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pmc_semantic_search::{
//!     config::SearchConfig,
//!     embedding::{hashed::HashedEmbedding, Embedder},
//!     pipeline::SearchPipeline,
//!     storage::sqlite::SqliteEmbeddingCache,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let embedder = Embedder::new(HashedEmbedding::default());
//!     let cache = SqliteEmbeddingCache::open(&config.cache_path, embedder.config().model_name)?;
//!     let pipeline = SearchPipeline::from_config(&config, embedder, Arc::new(cache))?;
//!
//!     let response = pipeline.search("tumor metabolism", 5).await?;
//!     for result in response.results {
//!         println!("{} [{}]: {:.3}", result.source_id, result.section_label, result.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod retrieval;
pub mod storage;
pub mod summary;

// Re-export commonly used types at the crate root
pub use config::SearchConfig;
pub use embedding::{Embedder, EmbeddingProvider};
pub use models::{DocumentSection, EmbeddingConfig, QueryResponse, RankedSection, SearchResult};
pub use pipeline::{SearchError, SearchPipeline};
pub use query::RankingEngine;
pub use retrieval::RetrievalOrchestrator;
pub use storage::EmbeddingCache;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
