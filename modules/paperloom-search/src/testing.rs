//! Mock adapters and record fixtures for deterministic tests: no network,
//! no API keys.

use async_trait::async_trait;

use paperloom_common::{PaperloomError, SearchQuery, SearchResult};
use paperloom_sources::{ProviderResponse, SourceAdapter};

/// A canned-response adapter. Returns the configured records regardless
/// of query, or always fails with the configured message.
pub struct MockAdapter {
    id: &'static str,
    results: Vec<SearchResult>,
    fail_with: Option<String>,
}

impl MockAdapter {
    pub fn with_results(id: &'static str, results: Vec<SearchResult>) -> Self {
        Self {
            id,
            results,
            fail_with: None,
        }
    }

    pub fn failing(id: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            results: Vec::new(),
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &'static str {
        self.id
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        if let Some(ref message) = self.fail_with {
            return Err(PaperloomError::provider(self.id, message));
        }
        let results: Vec<SearchResult> =
            self.results.iter().take(query.limit.max(1)).cloned().collect();
        let total = self.results.len() as u32;
        Ok(ProviderResponse {
            results,
            total,
            source: self.id.to_string(),
            execution_time_ms: 1,
        })
    }
}

/// Minimal record fixture. Fields beyond id/source/title/doi start empty.
pub fn record(source: &str, title: &str, doi: Option<&str>) -> SearchResult {
    SearchResult {
        id: format!("{source}:{title}"),
        source: source.to_string(),
        title: title.to_string(),
        doi: doi.map(String::from),
        ..Default::default()
    }
}
