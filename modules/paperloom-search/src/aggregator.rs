//! Unified search across every registered bibliographic provider:
//! concurrent best-effort fan-out, merge/dedup, composite ranking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use paperloom_common::{PaperloomError, SearchQuery, SearchResult, SourceFailure, YearRange};
use paperloom_sources::{Discipline, ProviderResponse, SourceAdapter, SourceRegistry};

use crate::dedup;
use crate::rank;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    /// Explicit source list. When absent, the discipline default (or the
    /// full registry) is used.
    pub sources: Option<Vec<String>>,
    pub discipline: Option<Discipline>,
    pub limit: usize,
    pub year_range: Option<YearRange>,
    pub open_access_only: bool,
    pub deduplicate: bool,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            sources: None,
            discipline: None,
            limit,
            year_range: None,
            open_access_only: false,
            deduplicate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnifiedResponse {
    pub results: Vec<SearchResult>,
    /// Merged result count before truncation to the requested limit.
    pub total: u32,
    /// Pre-dedup result counts per source.
    pub by_source: HashMap<String, u32>,
    /// Number of successful merges performed.
    pub deduplicated: u32,
    pub errors: Vec<SourceFailure>,
    pub execution_time_ms: u64,
}

pub struct Aggregator {
    registry: Arc<SourceRegistry>,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve the adapters to query, in registry priority order. Unknown
    /// ids in an explicit list are reported, not fatal.
    fn resolve_sources(
        &self,
        options: &SearchOptions,
        errors: &mut Vec<SourceFailure>,
    ) -> Vec<Arc<dyn SourceAdapter>> {
        let requested: Vec<String> = match (&options.sources, options.discipline) {
            (Some(ids), _) => ids.clone(),
            (None, Some(discipline)) => discipline
                .default_sources()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            (None, None) => self.registry.ids().iter().map(|s| s.to_string()).collect(),
        };

        let mut resolved = Vec::new();
        for id in &requested {
            match self.registry.get(id) {
                Ok(adapter) => resolved.push(adapter),
                Err(_) => errors.push(SourceFailure {
                    source: id.clone(),
                    message: "unknown source".to_string(),
                }),
            }
        }
        // Priority order decides the dedup base record.
        resolved.sort_by_key(|a| {
            self.registry
                .adapters()
                .iter()
                .position(|r| r.id() == a.id())
                .unwrap_or(usize::MAX)
        });
        resolved.dedup_by_key(|a| a.id());
        resolved
    }

    /// Fan a query out to the selected sources. A single source failure
    /// never aborts the others; all sources failing yields zero results
    /// and a populated error list, not an error.
    pub async fn search(&self, options: &SearchOptions) -> UnifiedResponse {
        let started = Instant::now();
        let mut errors = Vec::new();
        let adapters = self.resolve_sources(options, &mut errors);

        if adapters.is_empty() {
            return UnifiedResponse {
                results: Vec::new(),
                total: 0,
                by_source: HashMap::new(),
                deduplicated: 0,
                errors,
                execution_time_ms: started.elapsed().as_millis() as u64,
            };
        }

        let per_source_limit = options.limit.div_ceil(adapters.len()).max(1);
        let query = SearchQuery {
            query: options.query.clone(),
            limit: per_source_limit,
            offset: 0,
            year_range: options.year_range,
            open_access_only: options.open_access_only,
            categories: Vec::new(),
        };

        let mut search_futures = Vec::with_capacity(adapters.len());
        for (index, adapter) in adapters.iter().enumerate() {
            let query = query.clone();
            let adapter = Arc::clone(adapter);
            search_futures.push(async move {
                let outcome = adapter.search(&query).await;
                (index, adapter.id(), outcome)
            });
        }
        let outcomes: Vec<(usize, &'static str, Result<ProviderResponse, PaperloomError>)> =
            stream::iter(search_futures)
                .buffer_unordered(adapters.len())
                .collect()
            .await;

        // Re-establish priority order scrambled by the concurrent collect.
        let mut outcomes = outcomes;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut by_source = HashMap::new();
        let mut collected: Vec<SearchResult> = Vec::new();
        for (_, source, outcome) in outcomes {
            match outcome {
                Ok(response) => {
                    info!(
                        source,
                        found = response.results.len(),
                        took_ms = response.execution_time_ms,
                        "Source responded"
                    );
                    by_source.insert(source.to_string(), response.results.len() as u32);
                    collected.extend(response.results);
                }
                Err(e) => {
                    warn!(source, error = %e, "Source failed");
                    errors.push(SourceFailure {
                        source: source.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let (mut results, deduplicated) = if options.deduplicate {
            dedup::deduplicate(collected)
        } else {
            (collected, 0)
        };

        rank::rank(&mut results, &options.query);
        let total = results.len() as u32;
        results.truncate(options.limit);

        UnifiedResponse {
            results,
            total,
            by_source,
            deduplicated,
            errors,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Single-source entry point. Unlike the aggregator, an empty or
    /// unknown source id here is a fatal configuration error.
    pub async fn search_database(
        &self,
        source: &str,
        query: &SearchQuery,
    ) -> Result<ProviderResponse, PaperloomError> {
        if source.trim().is_empty() {
            return Err(PaperloomError::EmptySourceList);
        }
        let adapter = self.registry.get(source)?;
        adapter.search(query).await
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, MockAdapter};

    fn aggregator(adapters: Vec<Arc<dyn SourceAdapter>>) -> Aggregator {
        Aggregator::new(Arc::new(SourceRegistry::from_adapters(adapters)))
    }

    #[tokio::test]
    async fn partial_failure_isolation() {
        let agg = aggregator(vec![
            Arc::new(MockAdapter::failing("alpha", "connection refused")),
            Arc::new(MockAdapter::with_results(
                "beta",
                vec![record("beta", "A result", Some("10.1/r"))],
            )),
        ]);

        let response = agg.search(&SearchOptions::new("anything", 10)).await;
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].source, "alpha");
        assert_eq!(response.by_source.get("beta"), Some(&1));
        assert!(!response.by_source.contains_key("alpha"));
    }

    #[tokio::test]
    async fn complete_outage_returns_empty_not_error() {
        let agg = aggregator(vec![
            Arc::new(MockAdapter::failing("alpha", "timeout")),
            Arc::new(MockAdapter::failing("beta", "HTTP 500")),
        ]);

        let response = agg.search(&SearchOptions::new("anything", 10)).await;
        assert!(response.results.is_empty());
        assert_eq!(response.errors.len(), 2);
    }

    #[tokio::test]
    async fn dedup_merges_across_sources_and_is_stable() {
        let mut high_cite = record("beta", "Shared entity", Some("10.1/shared"));
        high_cite.citation_count = Some(100);
        high_cite.open_access = true;

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(MockAdapter::with_results(
                "alpha",
                vec![
                    record("alpha", "Shared entity", Some("10.1/shared")),
                    record("alpha", "Alpha only", None),
                ],
            )),
            Arc::new(MockAdapter::with_results("beta", vec![high_cite])),
        ];
        let agg = aggregator(adapters);

        let options = SearchOptions::new("entity", 10);
        let first = agg.search(&options).await;
        let second = agg.search(&options).await;

        assert_eq!(first.deduplicated, 1);
        assert_eq!(first.results.len(), 2);
        // alpha is higher priority, so the merged base keeps its source
        let shared = first
            .results
            .iter()
            .find(|r| r.doi.as_deref() == Some("10.1/shared"))
            .unwrap();
        assert_eq!(shared.source, "alpha");
        assert_eq!(shared.citation_count, Some(100));
        assert!(shared.open_access);

        assert_eq!(second.deduplicated, first.deduplicated);
        let first_ids: Vec<_> = first.results.iter().map(|r| r.id.clone()).collect();
        let second_ids: Vec<_> = second.results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn unknown_source_in_explicit_list_is_reported_not_fatal() {
        let agg = aggregator(vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![record("alpha", "Only", None)],
        ))]);

        let mut options = SearchOptions::new("q", 10);
        options.sources = Some(vec!["alpha".to_string(), "mystery".to_string()]);
        let response = agg.search(&options).await;

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].source, "mystery");
    }

    #[tokio::test]
    async fn empty_explicit_selection_yields_empty_response() {
        let agg = aggregator(vec![Arc::new(MockAdapter::with_results("alpha", vec![]))]);
        let mut options = SearchOptions::new("q", 10);
        options.sources = Some(vec![]);

        let response = agg.search(&options).await;
        assert!(response.results.is_empty());
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn search_database_rejects_unknown_or_empty_source() {
        let agg = aggregator(vec![Arc::new(MockAdapter::with_results("alpha", vec![]))]);
        let err = agg
            .search_database("mystery", &SearchQuery::new("q", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, PaperloomError::UnknownSource(_)));

        let err = agg
            .search_database("", &SearchQuery::new("q", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, PaperloomError::EmptySourceList));
    }

    #[tokio::test]
    async fn results_truncate_to_limit() {
        // Two sources, three records fetched from each (ceil(5 / 2)),
        // six distinct survivors, truncated to the requested five.
        let alpha: Vec<SearchResult> = (0..10)
            .map(|i| record("alpha", &format!("Alpha paper {i}"), None))
            .collect();
        let beta: Vec<SearchResult> = (0..10)
            .map(|i| record("beta", &format!("Beta paper {i}"), None))
            .collect();
        let agg = aggregator(vec![
            Arc::new(MockAdapter::with_results("alpha", alpha)),
            Arc::new(MockAdapter::with_results("beta", beta)),
        ]);

        let response = agg.search(&SearchOptions::new("paper", 5)).await;
        assert_eq!(response.results.len(), 5);
        assert_eq!(response.total, 6);
        assert_eq!(response.by_source.get("alpha"), Some(&3));
        assert_eq!(response.by_source.get("beta"), Some(&3));
    }
}
