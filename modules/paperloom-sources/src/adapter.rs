use async_trait::async_trait;

use paperloom_common::{PaperloomError, SearchQuery, SearchResult};

/// Response from one provider for one search call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub results: Vec<SearchResult>,
    /// Total hits the provider reports, which may exceed `results.len()`.
    pub total: u32,
    pub source: String,
    pub execution_time_ms: u64,
}

/// One external bibliographic database integration.
///
/// Adding a provider means adding a new implementation and registering it;
/// the aggregator never branches on provider identity. A failing or
/// unreachable provider surfaces as a single structured error, never an
/// uncaught panic.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used in source lists and error entries.
    fn id(&self) -> &'static str;

    /// Human-readable provider name.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError>;

    async fn get_by_id(&self, _id: &str) -> Result<Option<SearchResult>, PaperloomError> {
        Err(self.not_supported("get_by_id"))
    }

    /// Papers that cite `id`.
    async fn get_citations(
        &self,
        _id: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        Err(self.not_supported("get_citations"))
    }

    /// Papers related to `id`.
    async fn get_related(
        &self,
        _id: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        Err(self.not_supported("get_related"))
    }

    // --- Capability probes ---

    fn supports_full_text(&self) -> bool {
        false
    }

    fn supports_citation_count(&self) -> bool {
        false
    }

    fn supports_related_papers(&self) -> bool {
        false
    }

    fn not_supported(&self, operation: &str) -> PaperloomError {
        PaperloomError::NotSupported {
            provider: self.id().to_string(),
            operation: operation.to_string(),
        }
    }
}
