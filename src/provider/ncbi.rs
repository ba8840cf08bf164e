//! NCBI efetch provider for PMC full-text XML.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{normalize_pmcid, FetchProvider, ProviderError, ProviderResult};

/// Default NCBI E-utilities efetch endpoint.
pub const DEFAULT_EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// Fetches JATS XML for PMC articles.
#[derive(Debug, Clone)]
pub struct NcbiFetcher {
    client: Client,
    endpoint: String,
}

impl NcbiFetcher {
    /// Create a fetcher with a per-request `timeout`.
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

/// Numeric part of a PMCID as efetch expects it.
fn efetch_id(source_id: &str) -> Option<String> {
    normalize_pmcid(source_id).map(|pmcid| pmcid.trim_start_matches("PMC").to_string())
}

#[async_trait]
impl FetchProvider for NcbiFetcher {
    async fn fetch(&self, source_id: &str) -> ProviderResult<Option<String>> {
        let Some(id) = efetch_id(source_id).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("db", "pmc"), ("id", id.as_str()), ("retmode", "xml")])
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::from_status(status, &self.endpoint));
        }

        let body = response.text().await.map_err(ProviderError::from_reqwest)?;
        Ok(Some(body).filter(|b| !b.trim().is_empty()))
    }
}
