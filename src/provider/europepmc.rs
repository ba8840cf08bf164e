//! Europe PMC search provider.
//!
//! Queries the Europe PMC REST search endpoint, restricted to open-access
//! articles, and returns normalized PMCIDs in relevance order.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{normalize_pmcid, ProviderError, ProviderResult, SearchProvider};

/// Default Europe PMC search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

/// Search client for Europe PMC.
#[derive(Debug, Clone)]
pub struct EuropePmcSearch {
    client: Client,
    endpoint: String,
}

impl EuropePmcSearch {
    /// Create a search client with a per-request `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for EuropePmcSearch {
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<String>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let params = [
            ("query", format!("({}) AND OPEN_ACCESS:Y", query)),
            ("format", "json".to_string()),
            ("pageSize", max_results.to_string()),
            ("resultType", "core".to_string()),
        ];

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, &self.endpoint));
        }

        let body: SearchResponse = response.json().await.map_err(ProviderError::from_reqwest)?;
        let ids = body.into_pmcids(max_results);
        debug!(query, found = ids.len(), "europe pmc search");
        Ok(ids)
    }

    fn name(&self) -> &str {
        "europe-pmc"
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(rename = "resultList", default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<ResultItem>,
}

#[derive(Debug, Deserialize)]
struct ResultItem {
    pmcid: Option<String>,
    id: Option<String>,
}

impl SearchResponse {
    /// Normalized, de-duplicated identifiers in response order.
    pub(crate) fn into_pmcids(self, max_results: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.result_list
            .result
            .into_iter()
            .filter_map(|item| {
                let raw = item
                    .pmcid
                    .filter(|v| !v.trim().is_empty())
                    .or(item.id)?;
                normalize_pmcid(&raw)
            })
            .filter(|pmcid| seen.insert(pmcid.clone()))
            .take(max_results)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extracts_and_normalizes_ids() {
        let body = parse(
            r#"{"hitCount": 4, "resultList": {"result": [
                {"id": "38000001", "pmcid": "PMC1111"},
                {"id": "2222"},
                {"id": "MED/3", "pmcid": ""},
                {"pmcid": "pmc4444"}
            ]}}"#,
        );
        assert_eq!(
            body.into_pmcids(10),
            vec!["PMC1111".to_string(), "PMC2222".to_string(), "PMC4444".to_string()]
        );
    }

    #[test]
    fn test_deduplicates_and_caps() {
        let body = parse(
            r#"{"resultList": {"result": [
                {"pmcid": "PMC1"}, {"pmcid": "PMC1"}, {"pmcid": "PMC2"}, {"pmcid": "PMC3"}
            ]}}"#,
        );
        assert_eq!(body.into_pmcids(2), vec!["PMC1".to_string(), "PMC2".to_string()]);
    }

    #[test]
    fn test_missing_result_list_is_empty() {
        assert!(parse(r#"{"hitCount": 0}"#).into_pmcids(5).is_empty());
    }

    #[tokio::test]
    async fn test_zero_results_requested_skips_network() {
        let search = EuropePmcSearch::new("http://127.0.0.1:9/unreachable", Duration::from_secs(1))
            .unwrap();
        assert!(search.search("anything", 0).await.unwrap().is_empty());
    }
}
