//! Candidate retrieval.
//!
//! The orchestrator turns a query into candidate sections: one search call,
//! then a bounded fan-out of fetch+extract tasks, one per article. Per-article
//! failures are captured as [`FetchOutcome::Failed`] and never abort the
//! request; only the search call itself can fail.
//!
//! ```ignore
//! let orchestrator = RetrievalOrchestrator::new(search, fetcher, Arc::new(JatsExtractor));
//! let sections = orchestrator.fetch_candidates("tumor metabolism", 10).await?;
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::DocumentSection;
use crate::provider::{FetchProvider, ProviderResult, SearchProvider, SectionExtractor};

/// Default number of concurrent fetch+extract tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default minimum section length, in characters, worth embedding.
pub const DEFAULT_MIN_SECTION_CHARS: usize = 200;

/// What happened to one candidate article.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Content was fetched and extracted; `sections` are the usable ones
    Extracted {
        source_id: String,
        sections: Vec<DocumentSection>,
        discarded: usize,
    },

    /// The provider had no content for this article
    Missing { source_id: String },

    /// Fetching or extraction failed
    Failed { source_id: String, reason: String },
}

/// Tally of per-article outcomes for one retrieval.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchReport {
    /// Identifiers returned by the search provider
    pub candidates: usize,

    /// Articles that produced content
    pub extracted: usize,

    /// Articles without content
    pub missing: usize,

    /// Articles whose fetch or extraction failed, with the reason
    pub failures: Vec<(String, String)>,

    /// Usable sections kept across all articles
    pub sections: usize,

    /// Sections dropped for being too short
    pub discarded_short: usize,
}

impl FetchReport {
    fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Extracted {
                sections, discarded, ..
            } => {
                self.extracted += 1;
                self.sections += sections.len();
                self.discarded_short += discarded;
            }
            FetchOutcome::Missing { .. } => self.missing += 1,
            FetchOutcome::Failed { source_id, reason } => {
                self.failures.push((source_id.clone(), reason.clone()));
            }
        }
    }
}

/// Fetches and extracts candidate sections for a query.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn FetchProvider>,
    extractor: Arc<dyn SectionExtractor>,
    max_concurrency: usize,
    min_section_chars: usize,
}

impl RetrievalOrchestrator {
    /// Create an orchestrator with default concurrency and section length.
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn FetchProvider>,
        extractor: Arc<dyn SectionExtractor>,
    ) -> Self {
        Self {
            search,
            fetcher,
            extractor,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
        }
    }

    /// Set the number of concurrent fetch tasks (at least one).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Set the minimum trimmed length, in characters, of a kept section.
    pub fn with_min_section_chars(mut self, min_section_chars: usize) -> Self {
        self.min_section_chars = min_section_chars;
        self
    }

    /// Candidate sections for `query` from up to `max_candidates` articles.
    ///
    /// Returns an empty vector, not an error, when nothing is found or every
    /// article fails.
    ///
    /// # Errors
    /// Returns the search provider's error; per-article errors are swallowed.
    pub async fn fetch_candidates(
        &self,
        query: &str,
        max_candidates: usize,
    ) -> ProviderResult<Vec<DocumentSection>> {
        let (sections, _) = self.fetch_candidates_with_report(query, max_candidates).await?;
        Ok(sections)
    }

    /// Like [`fetch_candidates`](Self::fetch_candidates), also returning the
    /// per-article tally.
    pub async fn fetch_candidates_with_report(
        &self,
        query: &str,
        max_candidates: usize,
    ) -> ProviderResult<(Vec<DocumentSection>, FetchReport)> {
        let source_ids = self.search.search(query, max_candidates).await?;
        let mut report = FetchReport {
            candidates: source_ids.len(),
            ..FetchReport::default()
        };

        if source_ids.is_empty() {
            info!(provider = self.search.name(), "no candidate articles found");
            return Ok((Vec::new(), report));
        }

        let outcomes = self.fetch_all(source_ids).await;

        let mut sections = Vec::new();
        for outcome in outcomes {
            report.record(&outcome);
            match outcome {
                FetchOutcome::Extracted {
                    sections: mut kept, ..
                } => sections.append(&mut kept),
                FetchOutcome::Failed { source_id, reason } => {
                    warn!(source_id = %source_id, reason = %reason, "candidate fetch failed");
                }
                FetchOutcome::Missing { source_id } => {
                    debug!(source_id = %source_id, "candidate has no content");
                }
            }
        }

        info!(
            candidates = report.candidates,
            extracted = report.extracted,
            missing = report.missing,
            failed = report.failures.len(),
            sections = report.sections,
            discarded_short = report.discarded_short,
            "retrieval complete"
        );
        Ok((sections, report))
    }

    /// Run fetch+extract for every identifier with bounded concurrency and
    /// wait for all of them. Outcomes come back in submission order.
    async fn fetch_all(&self, source_ids: Vec<String>) -> Vec<FetchOutcome> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, source_id) in source_ids.iter().cloned().enumerate() {
            let permits = Arc::clone(&permits);
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let min_chars = self.min_section_chars;

            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_one(fetcher.as_ref(), extractor.as_ref(), source_id, min_chars).await
                    }
                    Err(_) => FetchOutcome::Failed {
                        source_id,
                        reason: "worker pool closed".to_string(),
                    },
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<FetchOutcome>> = vec![None; source_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!(error = %e, "fetch task aborted"),
            }
        }

        slots
            .into_iter()
            .zip(source_ids)
            .map(|(slot, source_id)| {
                slot.unwrap_or(FetchOutcome::Failed {
                    source_id,
                    reason: "fetch task panicked".to_string(),
                })
            })
            .collect()
    }
}

/// Fetch and extract one article, capturing every failure in the outcome.
async fn fetch_one(
    fetcher: &dyn FetchProvider,
    extractor: &dyn SectionExtractor,
    source_id: String,
    min_chars: usize,
) -> FetchOutcome {
    let raw = match fetcher.fetch(&source_id).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return FetchOutcome::Missing { source_id },
        Err(e) => {
            return FetchOutcome::Failed {
                source_id,
                reason: e.to_string(),
            }
        }
    };

    let extracted = match extractor.extract(&raw) {
        Ok(extracted) => extracted,
        Err(e) => {
            return FetchOutcome::Failed {
                source_id,
                reason: e.to_string(),
            }
        }
    };

    let total = extracted.len();
    let sections: Vec<DocumentSection> = extracted
        .into_iter()
        .map(|(label, text)| DocumentSection::new(source_id.clone(), label, text))
        .filter(|section| section.usable_len() >= min_chars)
        .collect();

    debug!(
        source_id = %source_id,
        extracted = total,
        kept = sections.len(),
        "extracted sections"
    );
    FetchOutcome::Extracted {
        source_id,
        discarded: total - sections.len(),
        sections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ExtractedSection, ProviderError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedSearch {
        ids: Vec<String>,
        fail: bool,
    }

    impl FixedSearch {
        fn new(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                ids: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, max_results: usize) -> ProviderResult<Vec<String>> {
            if self.fail {
                return Err(ProviderError::NetworkError("search unavailable".to_string()));
            }
            Ok(self.ids.iter().take(max_results).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    enum Canned {
        Doc(String),
        Absent,
        Timeout,
    }

    /// Serves canned documents and records peak concurrency.
    struct CannedFetcher {
        docs: HashMap<String, Canned>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CannedFetcher {
        fn new(docs: Vec<(&str, Canned)>) -> Self {
            Self {
                docs: docs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FetchProvider for CannedFetcher {
        async fn fetch(&self, source_id: &str) -> ProviderResult<Option<String>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.docs.get(source_id) {
                Some(Canned::Doc(doc)) => Ok(Some(doc.clone())),
                Some(Canned::Absent) | None => Ok(None),
                Some(Canned::Timeout) => Err(ProviderError::Timeout(source_id.to_string())),
            }
        }
    }

    /// Documents are `label|text` lines; a line `!` is a parse failure.
    struct LineExtractor;

    impl SectionExtractor for LineExtractor {
        fn extract(&self, raw: &str) -> ProviderResult<Vec<ExtractedSection>> {
            raw.lines()
                .map(|line| match line.split_once('|') {
                    Some((label, text)) => Ok((label.to_string(), text.to_string())),
                    None => Err(ProviderError::ParseError(line.to_string())),
                })
                .collect()
        }
    }

    fn long_text(word: &str) -> String {
        format!("{} ", word).repeat(250 / (word.len() + 1) + 1)
    }

    fn doc(labels: &[&str]) -> Canned {
        Canned::Doc(
            labels
                .iter()
                .map(|l| format!("{}|{}", l, long_text(l)))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn orchestrator(search: FixedSearch, fetcher: CannedFetcher) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(Arc::new(search), Arc::new(fetcher), Arc::new(LineExtractor))
    }

    #[tokio::test]
    async fn test_no_identifiers_returns_empty() {
        let orch = orchestrator(FixedSearch::new(&[]), CannedFetcher::new(vec![]));
        let sections = orch.fetch_candidates("anything", 10).await.unwrap();
        assert!(sections.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_terminal() {
        let orch = orchestrator(FixedSearch::failing(), CannedFetcher::new(vec![]));
        let result = orch.fetch_candidates("anything", 10).await;
        assert!(matches!(result, Err(ProviderError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_partial_failures_keep_successful_sections() {
        let fetcher = CannedFetcher::new(vec![
            ("PMC1", Canned::Timeout),
            ("PMC2", doc(&["Intro", "Methods", "Results", "Discussion"])),
            ("PMC3", Canned::Timeout),
        ]);
        let orch = orchestrator(FixedSearch::new(&["PMC1", "PMC2", "PMC3"]), fetcher);

        let (sections, report) = orch
            .fetch_candidates_with_report("tumor metabolism", 10)
            .await
            .unwrap();

        assert_eq!(sections.len(), 4);
        assert!(sections.iter().all(|s| s.source_id == "PMC2"));
        assert_eq!(report.candidates, 3);
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, "PMC1");
    }

    #[tokio::test]
    async fn test_all_failures_return_empty() {
        let fetcher = CannedFetcher::new(vec![
            ("PMC1", Canned::Timeout),
            ("PMC2", Canned::Doc("!".to_string())),
            ("PMC3", Canned::Absent),
        ]);
        let orch = orchestrator(FixedSearch::new(&["PMC1", "PMC2", "PMC3"]), fetcher);

        let (sections, report) = orch.fetch_candidates_with_report("q", 10).await.unwrap();
        assert!(sections.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.missing, 1);
    }

    #[tokio::test]
    async fn test_short_sections_are_discarded() {
        let fetcher = CannedFetcher::new(vec![(
            "PMC1",
            Canned::Doc(format!(
                "Title|Too short\nBody|{}\nEdge|{}",
                long_text("glycolysis"),
                "y".repeat(200)
            )),
        )]);
        let orch = orchestrator(FixedSearch::new(&["PMC1"]), fetcher);

        let (sections, report) = orch.fetch_candidates_with_report("q", 10).await.unwrap();
        assert_eq!(report.discarded_short, 1);
        let labels: Vec<&str> = sections.iter().map(|s| s.section_label.as_str()).collect();
        assert_eq!(labels, vec!["Body", "Edge"]);
    }

    #[tokio::test]
    async fn test_outcomes_keep_submission_order() {
        let ids = ["PMC1", "PMC2", "PMC3", "PMC4", "PMC5", "PMC6", "PMC7"];
        let fetcher = CannedFetcher::new(ids.iter().map(|id| (*id, doc(&[*id]))).collect());
        let orch = orchestrator(FixedSearch::new(&ids), fetcher);

        let sections = orch.fetch_candidates("q", 10).await.unwrap();
        let order: Vec<&str> = sections.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(order, ids.to_vec());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let ids: Vec<String> = (0..12).map(|i| format!("PMC{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let fetcher = Arc::new(CannedFetcher::new(
            id_refs.iter().map(|id| (*id, doc(&["Body"]))).collect(),
        ));

        let orch = RetrievalOrchestrator::new(
            Arc::new(FixedSearch::new(&id_refs)),
            fetcher.clone(),
            Arc::new(LineExtractor),
        )
        .with_max_concurrency(3);

        let sections = orch.fetch_candidates("q", 12).await.unwrap();
        assert_eq!(sections.len(), 12);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_max_candidates_is_passed_to_search() {
        let fetcher = CannedFetcher::new(vec![
            ("PMC1", doc(&["A"])),
            ("PMC2", doc(&["B"])),
            ("PMC3", doc(&["C"])),
        ]);
        let orch = orchestrator(FixedSearch::new(&["PMC1", "PMC2", "PMC3"]), fetcher);
        let sections = orch.fetch_candidates("q", 2).await.unwrap();
        assert_eq!(sections.len(), 2);
    }
}
