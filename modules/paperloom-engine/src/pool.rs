//! The session-wide source pool: the one structure concurrent exploration
//! tasks write into. A single mutex-guarded insertion entry point keeps
//! the at-most-once-per-entity invariant enforceable and testable in
//! isolation.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use paperloom_common::{ResearchSource, SearchResult};
use paperloom_search::dedup;

use crate::appraise;

/// Outcome of offering a record to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// First discovery anywhere in the tree: a new ResearchSource.
    Inserted(Uuid),
    /// Already known by DOI/title; the existing source was linked, and
    /// any better field values were merged in.
    Linked(Uuid),
    /// The session source budget is reached; the record was discarded.
    BudgetReached,
}

struct PoolInner {
    sources: Vec<ResearchSource>,
    by_doi: HashMap<String, Uuid>,
    by_title: HashMap<String, Uuid>,
    next_ordinal: u32,
}

pub struct SourcePool {
    session_id: Uuid,
    topic_terms: Vec<String>,
    max_sources: usize,
    inner: Mutex<PoolInner>,
}

impl SourcePool {
    pub fn new(session_id: Uuid, topic: &str, max_sources: usize) -> Self {
        Self {
            session_id,
            topic_terms: appraise::content_terms(topic),
            max_sources,
            inner: Mutex::new(PoolInner {
                sources: Vec::new(),
                by_doi: HashMap::new(),
                by_title: HashMap::new(),
                next_ordinal: 0,
            }),
        }
    }

    /// Offer a record discovered by `node_id`. Session-wide dedup: a
    /// source already present by DOI/title match is linked, not
    /// duplicated.
    pub async fn insert(&self, record: SearchResult, node_id: Uuid) -> PoolOutcome {
        let mut inner = self.inner.lock().await;

        let doi = record.doi.as_deref().and_then(dedup::normalize_doi);
        let title = dedup::normalize_title(&record.title);

        // Same matching rule as the aggregator: DOI first; title match
        // only when the DOI comparison is not decisive (records carrying
        // two different DOIs stay distinct).
        let existing = doi
            .as_ref()
            .and_then(|d| inner.by_doi.get(d).copied())
            .or_else(|| {
                inner.by_title.get(&title).copied().filter(|id| {
                    doi.is_none()
                        || inner
                            .sources
                            .iter()
                            .find(|s| s.id == *id)
                            .map(|s| s.record.doi.is_none())
                            .unwrap_or(false)
                })
            });

        if let Some(id) = existing {
            if let Some(source) = inner.sources.iter_mut().find(|s| s.id == id) {
                dedup::merge_into(&mut source.record, record);
            }
            if let Some(doi) = doi {
                inner.by_doi.entry(doi).or_insert(id);
            }
            return PoolOutcome::Linked(id);
        }

        if inner.sources.len() >= self.max_sources {
            return PoolOutcome::BudgetReached;
        }

        let id = Uuid::new_v4();
        let ordinal = inner.next_ordinal;
        inner.next_ordinal += 1;

        let quality = appraise::assess_quality(&record);
        let key_findings = record
            .abstract_text
            .as_deref()
            .map(|a| appraise::extract_key_findings(a, 3))
            .unwrap_or_default();
        let relevance_score = appraise::relevance_score(&record, &self.topic_terms);

        if let Some(doi) = doi {
            inner.by_doi.insert(doi, id);
        }
        inner.by_title.insert(title, id);
        inner.sources.push(ResearchSource {
            id,
            session_id: self.session_id,
            record,
            discovered_by: node_id,
            discovered_at: ordinal,
            relevance_score,
            quality: Some(quality),
            key_findings,
        });

        PoolOutcome::Inserted(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.sources.len()
    }

    pub async fn is_full(&self) -> bool {
        self.inner.lock().await.sources.len() >= self.max_sources
    }

    /// Sources in discovery order.
    pub async fn snapshot(&self) -> Vec<ResearchSource> {
        self.inner.lock().await.sources.clone()
    }

    pub fn into_sources(self) -> Vec<ResearchSource> {
        self.inner.into_inner().sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, doi: Option<&str>) -> SearchResult {
        SearchResult {
            id: title.to_string(),
            source: "mock".to_string(),
            title: title.to_string(),
            doi: doi.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_discovery_inserts_rediscovery_links() {
        let pool = SourcePool::new(Uuid::new_v4(), "topic", 10);
        let node_a = Uuid::new_v4();
        let node_b = Uuid::new_v4();

        let first = pool.insert(record("Paper", Some("10.1/p")), node_a).await;
        let PoolOutcome::Inserted(id) = first else {
            panic!("expected insert");
        };

        // Same DOI, different title: still the same entity.
        let second = pool
            .insert(record("Paper (author manuscript)", Some("10.1/p")), node_b)
            .await;
        assert_eq!(second, PoolOutcome::Linked(id));
        assert_eq!(pool.len().await, 1);

        let sources = pool.snapshot().await;
        assert_eq!(sources[0].discovered_by, node_a);
        assert_eq!(sources[0].discovered_at, 0);
    }

    #[tokio::test]
    async fn linking_merges_better_fields() {
        let pool = SourcePool::new(Uuid::new_v4(), "topic", 10);
        let node = Uuid::new_v4();

        pool.insert(record("Paper", Some("10.1/p")), node).await;
        let mut better = record("Paper", Some("10.1/p"));
        better.citation_count = Some(77);
        better.abstract_text = Some("We found something.".to_string());
        pool.insert(better, node).await;

        let sources = pool.snapshot().await;
        assert_eq!(sources[0].record.citation_count, Some(77));
        assert!(sources[0].record.abstract_text.is_some());
    }

    #[tokio::test]
    async fn budget_stops_new_inserts_but_not_links() {
        let pool = SourcePool::new(Uuid::new_v4(), "topic", 1);
        let node = Uuid::new_v4();

        let first = pool.insert(record("One", None), node).await;
        assert!(matches!(first, PoolOutcome::Inserted(_)));

        let over = pool.insert(record("Two", None), node).await;
        assert_eq!(over, PoolOutcome::BudgetReached);
        assert!(pool.is_full().await);

        // A rediscovery of an existing entity still links.
        let relink = pool.insert(record("One", None), node).await;
        assert!(matches!(relink, PoolOutcome::Linked(_)));
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_entity_create_one_source() {
        let pool = std::sync::Arc::new(SourcePool::new(Uuid::new_v4(), "topic", 50));
        let node = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = std::sync::Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.insert(record("Same entity", Some("10.1/same")), node).await
            }));
        }
        let outcomes: Vec<PoolOutcome> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let inserts = outcomes
            .iter()
            .filter(|o| matches!(o, PoolOutcome::Inserted(_)))
            .count();
        assert_eq!(inserts, 1);
        assert_eq!(pool.len().await, 1);
    }
}
