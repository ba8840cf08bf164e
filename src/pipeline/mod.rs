//! The search pipeline.
//!
//! Wires retrieval, ranking and summarization into the single `search`
//! operation exposed to front ends.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::models::{QueryResponse, RankedSection, SearchResult};
use crate::provider::europepmc::EuropePmcSearch;
use crate::provider::jats::JatsExtractor;
use crate::provider::ncbi::NcbiFetcher;
use crate::provider::ProviderError;
use crate::query::{QueryError, RankingEngine};
use crate::retrieval::RetrievalOrchestrator;
use crate::storage::EmbeddingCache;
use crate::summary::SummaryBuilder;

/// Placeholder replaced by the source identifier in link templates.
pub const LINK_PLACEHOLDER: &str = "{id}";

/// Request-level search failures.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Candidate discovery failed
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] ProviderError),

    /// Ranking failed, including model failures and invalid queries
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, SearchError>;

/// Substitute `source_id` into `template`.
pub fn render_link(template: &str, source_id: &str) -> String {
    template.replace(LINK_PLACEHOLDER, source_id)
}

/// Retrieval, ranking and summarization composed into one operation.
pub struct SearchPipeline<E> {
    orchestrator: RetrievalOrchestrator,
    ranking: RankingEngine<E>,
    summary: SummaryBuilder,
    link_template: String,
    over_fetch_factor: usize,
}

impl<E: EmbeddingProvider> SearchPipeline<E> {
    /// Compose a pipeline with default summary bounds, link template and a
    /// 2x over-fetch.
    pub fn new(orchestrator: RetrievalOrchestrator, ranking: RankingEngine<E>) -> Self {
        let defaults = SearchConfig::default();
        Self {
            orchestrator,
            ranking,
            summary: SummaryBuilder::default(),
            link_template: defaults.link_template,
            over_fetch_factor: defaults.over_fetch_factor,
        }
    }

    /// Build a pipeline against the live Europe PMC and NCBI services.
    pub fn from_config(
        config: &SearchConfig,
        embedder: Embedder<E>,
        cache: Arc<dyn EmbeddingCache>,
    ) -> PipelineResult<Self> {
        let search = EuropePmcSearch::new(config.europe_pmc_url.clone(), config.search_timeout())?;
        let fetcher = NcbiFetcher::new(config.efetch_url.clone(), config.fetch_timeout())?;

        let orchestrator =
            RetrievalOrchestrator::new(Arc::new(search), Arc::new(fetcher), Arc::new(JatsExtractor))
                .with_max_concurrency(config.max_concurrency)
                .with_min_section_chars(config.min_section_chars);

        Ok(Self::new(orchestrator, RankingEngine::new(embedder, cache))
            .with_summary(SummaryBuilder::new(
                config.summary_min_chars,
                config.summary_max_chars,
            ))
            .with_link_template(config.link_template.clone())
            .with_over_fetch_factor(config.over_fetch_factor))
    }

    /// Replace the summary builder used for result excerpts.
    pub fn with_summary(mut self, summary: SummaryBuilder) -> Self {
        self.summary = summary;
        self
    }

    /// Set the result link template; `{id}` is replaced by the source identifier.
    pub fn with_link_template(mut self, link_template: impl Into<String>) -> Self {
        self.link_template = link_template.into();
        self
    }

    /// Candidate articles requested per result slot (at least one).
    pub fn with_over_fetch_factor(mut self, factor: usize) -> Self {
        self.over_fetch_factor = factor.max(1);
        self
    }

    /// Search for the `top_k` sections most similar to `query`.
    ///
    /// No candidates is not an error: the response simply has no results.
    ///
    /// # Errors
    /// - `SearchError::Query(QueryError::InvalidQuery)` for a blank query
    /// - `SearchError::Retrieval` when candidate discovery fails
    /// - `SearchError::Query(QueryError::EmbeddingError)` when the model fails
    pub async fn search(&self, query: &str, top_k: usize) -> PipelineResult<QueryResponse> {
        if query.trim().is_empty() {
            return Err(QueryError::InvalidQuery("query must not be blank".to_string()).into());
        }
        if top_k == 0 {
            return Ok(QueryResponse::empty(query));
        }

        let started = Instant::now();
        let max_candidates = top_k.saturating_mul(self.over_fetch_factor);
        let candidates = self
            .orchestrator
            .fetch_candidates(query, max_candidates)
            .await?;
        debug!(
            sections = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval stage done"
        );

        if candidates.is_empty() {
            info!(query, "no candidate sections");
            return Ok(QueryResponse::empty(query));
        }

        let ranked = self.ranking.rank(query, &candidates, top_k).await?;
        let results: Vec<SearchResult> = ranked.into_iter().map(|r| self.to_result(r)).collect();

        info!(
            query,
            candidates = candidates.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        Ok(QueryResponse {
            query: query.to_string(),
            retrieved_at: Utc::now(),
            results,
        })
    }

    fn to_result(&self, ranked: RankedSection) -> SearchResult {
        let RankedSection { score, section } = ranked;
        SearchResult {
            summary: self.summary.summarize(&section.text),
            link: render_link(&self.link_template, &section.source_id),
            source_id: section.source_id,
            section_label: section.section_label,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hashed::HashedEmbedding;
    use crate::models::DocumentSection;
    use crate::provider::{
        ExtractedSection, FetchProvider, ProviderResult, SearchProvider, SectionExtractor,
    };
    use crate::storage::sqlite::SqliteEmbeddingCache;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the requested candidate count.
    struct RecordingSearch {
        ids: Vec<String>,
        requested: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SearchProvider for RecordingSearch {
        async fn search(&self, _query: &str, max_results: usize) -> ProviderResult<Vec<String>> {
            self.requested.lock().unwrap().push(max_results);
            Ok(self.ids.iter().take(max_results).cloned().collect())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl FetchProvider for EchoFetcher {
        async fn fetch(&self, source_id: &str) -> ProviderResult<Option<String>> {
            Ok(Some(source_id.to_string()))
        }
    }

    /// One long section per document, mentioning the document id.
    struct SentenceExtractor;

    impl SectionExtractor for SentenceExtractor {
        fn extract(&self, raw: &str) -> ProviderResult<Vec<ExtractedSection>> {
            let text = format!("Article {} studies tumor metabolism in depth. ", raw).repeat(10);
            Ok(vec![("Results".to_string(), text)])
        }
    }

    fn pipeline(ids: &[&str]) -> (SearchPipeline<HashedEmbedding>, Arc<RecordingSearch>) {
        let search = Arc::new(RecordingSearch {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            requested: Mutex::new(Vec::new()),
        });
        let orchestrator = RetrievalOrchestrator::new(
            search.clone(),
            Arc::new(EchoFetcher),
            Arc::new(SentenceExtractor),
        );
        let embedder = Embedder::new(HashedEmbedding::new(64));
        let cache = SqliteEmbeddingCache::open_in_memory(embedder.config().model_name).unwrap();
        let ranking = RankingEngine::new(embedder, Arc::new(cache));
        (SearchPipeline::new(orchestrator, ranking), search)
    }

    #[test]
    fn test_render_link() {
        assert_eq!(
            render_link("https://pmc.ncbi.nlm.nih.gov/articles/{id}/", "PMC42"),
            "https://pmc.ncbi.nlm.nih.gov/articles/PMC42/"
        );
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let (pipeline, search) = pipeline(&["PMC1"]);
        let result = pipeline.search("   ", 3).await;
        assert!(matches!(
            result,
            Err(SearchError::Query(QueryError::InvalidQuery(_)))
        ));
        assert!(search.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_top_k_is_empty() {
        let (pipeline, _) = pipeline(&["PMC1"]);
        let response = pipeline.search("tumor", 0).await.unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_over_fetch_factor_scales_candidates() {
        let (pipeline, search) = pipeline(&["PMC1", "PMC2", "PMC3", "PMC4", "PMC5", "PMC6", "PMC7"]);
        pipeline.search("tumor metabolism", 3).await.unwrap();

        let pipeline = pipeline.with_over_fetch_factor(1);
        pipeline.search("tumor metabolism", 3).await.unwrap();

        assert_eq!(*search.requested.lock().unwrap(), vec![6, 3]);
    }

    #[tokio::test]
    async fn test_results_carry_summary_and_link() {
        let (pipeline, _) = pipeline(&["PMC1", "PMC2"]);
        let response = pipeline.search("tumor metabolism", 3).await.unwrap();

        assert_eq!(response.query, "tumor metabolism");
        assert_eq!(response.results.len(), 2);
        for result in &response.results {
            assert!(result.summary.ends_with('.'));
            assert!(result.summary.chars().count() <= 1500);
            assert_eq!(
                result.link,
                format!("https://pmc.ncbi.nlm.nih.gov/articles/{}/", result.source_id)
            );
        }
        assert!(response.results[0].score >= response.results[1].score);
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let (pipeline, _) = pipeline(&[]);
        let response = pipeline.search("tumor metabolism", 3).await.unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_to_result_moves_section_fields() {
        let (pipeline, _) = pipeline(&[]);
        let result = pipeline.to_result(RankedSection {
            score: 0.25,
            section: DocumentSection::new("PMC9", "Methods", "Cells were cultured. Then counted."),
        });
        assert_eq!(result.section_label, "Methods");
        assert_eq!(result.summary, "Cells were cultured. Then counted.");
        assert_eq!(result.link, "https://pmc.ncbi.nlm.nih.gov/articles/PMC9/");
    }
}
