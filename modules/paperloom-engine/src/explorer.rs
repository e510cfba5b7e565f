//! The exploration engine: drives the tree of research sub-questions.
//! Nodes within one breadth level run concurrently; iterations within a
//! node run sequentially so each can refine its query from the previous
//! iteration's learnings.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use paperloom_common::{
    ExplorationNode, ExplorationTree, IterationResult, NodeStatus, Perspective, ResearchConfig,
    SessionEvent, SourceFailure,
};
use paperloom_search::{Aggregator, SearchOptions};

use crate::appraise;
use crate::events::EventBus;
use crate::pool::{PoolOutcome, SourcePool};

/// Records fetched per iteration before session-wide dedup.
const ITERATION_FETCH_LIMIT: usize = 10;
const MAX_LEARNINGS_PER_ITERATION: usize = 3;

pub struct Explorer<'a> {
    pub aggregator: &'a Aggregator,
    pub pool: &'a SourcePool,
    pub config: &'a ResearchConfig,
    pub session_id: Uuid,
    pub topic: &'a str,
    pub events: &'a EventBus,
    pub cancel: CancellationToken,
    /// Provider failures observed across all iterations, deduplicated.
    pub failures: &'a Mutex<Vec<SourceFailure>>,
}

/// Immutable per-node input captured before the concurrent pass, so node
/// tasks never touch the live tree.
struct NodeSeed {
    id: Uuid,
    topic: String,
    strategies: Vec<String>,
    index: usize,
}

struct NodeOutcome {
    node_id: Uuid,
    iterations: Vec<IterationResult>,
    source_ids: Vec<Uuid>,
    directions: Vec<String>,
    failed: bool,
}

impl<'a> Explorer<'a> {
    /// Populate `tree` (already holding its root) and the session pool.
    /// Returns normally on cancellation or budget exhaustion; the caller
    /// inspects the token and the pool.
    pub async fn explore(
        &self,
        tree: &mut ExplorationTree,
        perspectives: &[Perspective],
    ) -> Result<()> {
        let strategies_by_perspective: HashMap<String, Vec<String>> = perspectives
            .iter()
            .map(|p| (p.id.clone(), p.search_strategies.clone()))
            .collect();

        // The root is a container for the topic; perspectives do the
        // searching.
        for perspective in perspectives.iter().take(self.config.breadth) {
            let mut node = ExplorationNode::new(
                format!("{}: {}", self.topic, perspective.name.to_lowercase()),
                1,
            );
            node.perspective_id = Some(perspective.id.clone());
            tree.attach(tree.root_id, node);
        }
        if let Some(root) = tree.nodes.get_mut(&tree.root_id) {
            root.status = NodeStatus::Complete;
        }
        tree.completed_nodes += 1;

        for depth in 1..=self.config.depth {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let seeds: Vec<NodeSeed> = tree
                .node_ids_at_depth(depth)
                .into_iter()
                .filter(|id| tree.nodes[id].status == NodeStatus::Pending)
                .enumerate()
                .map(|(index, id)| {
                    let node = &tree.nodes[&id];
                    NodeSeed {
                        id,
                        topic: node.topic.clone(),
                        strategies: node
                            .perspective_id
                            .as_ref()
                            .and_then(|p| strategies_by_perspective.get(p).cloned())
                            .unwrap_or_default(),
                        index,
                    }
                })
                .collect();
            if seeds.is_empty() {
                break;
            }

            for seed in &seeds {
                let node = tree.nodes.get_mut(&seed.id).expect("seeded from tree");
                node.status = NodeStatus::Searching;
                self.events.emit(SessionEvent::NodeStarted {
                    session_id: self.session_id,
                    node_id: seed.id,
                    topic: seed.topic.clone(),
                    depth,
                });
            }

            // One breadth level runs concurrently, bounded by breadth.
            // Cancellation drops the stream, abandoning in-flight adapter
            // calls rather than awaiting them.
            let mut node_futures = Vec::with_capacity(seeds.len());
            for seed in &seeds {
                node_futures.push(self.process_node(seed));
            }
            let outcomes: Vec<NodeOutcome> = tokio::select! {
                outcomes = stream::iter(node_futures)
                    .buffer_unordered(self.config.breadth.max(1))
                    .collect::<Vec<_>>() => outcomes,
                _ = self.cancel.cancelled() => return Ok(()),
            };

            for outcome in outcomes {
                let status = if outcome.failed {
                    NodeStatus::Failed
                } else {
                    NodeStatus::Complete
                };
                let sources_found = outcome.source_ids.len() as u32;
                if let Some(node) = tree.nodes.get_mut(&outcome.node_id) {
                    node.iterations = outcome.iterations;
                    node.source_ids = outcome.source_ids;
                    node.status = status;
                }
                tree.completed_nodes += 1;
                self.events.emit(SessionEvent::NodeCompleted {
                    session_id: self.session_id,
                    node_id: outcome.node_id,
                    status,
                    sources_found,
                });

                // Spawn children below the depth ceiling; nodes at the
                // ceiling only iterate.
                if depth < self.config.depth && !outcome.failed && !self.pool.is_full().await {
                    let perspective_id = tree
                        .nodes
                        .get(&outcome.node_id)
                        .and_then(|n| n.perspective_id.clone());
                    for direction in outcome.directions.into_iter().take(self.config.breadth) {
                        let mut child = ExplorationNode::new(direction, depth + 1);
                        child.perspective_id = perspective_id.clone();
                        tree.attach(outcome.node_id, child);
                    }
                }
            }

            // Reaching the source budget short-circuits remaining pending
            // nodes: graceful early stop, not an error.
            if self.pool.is_full().await {
                let pending: Vec<Uuid> = tree
                    .nodes
                    .values()
                    .filter(|n| n.status == NodeStatus::Pending)
                    .map(|n| n.id)
                    .collect();
                for id in pending {
                    if let Some(node) = tree.nodes.get_mut(&id) {
                        node.status = NodeStatus::Complete;
                    }
                    tree.completed_nodes += 1;
                }
                let collected = self.pool.len().await;
                info!(
                    collected = collected,
                    budget = self.config.max_sources,
                    "Source budget reached, stopping exploration early"
                );
                break;
            }
        }

        Ok(())
    }

    async fn process_node(&self, seed: &NodeSeed) -> NodeOutcome {
        let mut iterations = Vec::new();
        let mut source_ids: Vec<Uuid> = Vec::new();
        let mut directions: Vec<String> = Vec::new();
        let mut learnings_so_far: Vec<String> = Vec::new();
        let mut every_iteration_failed = true;

        for iteration in 1..=self.config.iteration_limit {
            if self.cancel.is_cancelled() || self.pool.is_full().await {
                break;
            }

            let query = self.build_query(seed, iteration, &learnings_so_far);
            // Databases rotate across iterations so one node samples
            // several providers over its lifetime.
            let database = if self.config.sources.is_empty() {
                "all".to_string()
            } else {
                self.config.sources
                    [(seed.index + iteration as usize - 1) % self.config.sources.len()]
                .clone()
            };

            let mut options = SearchOptions::new(query.clone(), ITERATION_FETCH_LIMIT);
            if !self.config.sources.is_empty() {
                options.sources = Some(vec![database.clone()]);
            }
            options.year_range = self.config.year_range;
            let response = self.aggregator.search(&options).await;

            if !response.errors.is_empty() {
                let mut failures = self.failures.lock().await;
                for error in &response.errors {
                    if !failures.contains(error) {
                        failures.push(error.clone());
                    }
                }
            }

            let iteration_failed = response.results.is_empty() && !response.errors.is_empty();
            if iteration_failed {
                warn!(
                    node = %seed.id,
                    query = query.as_str(),
                    database = database.as_str(),
                    "Iteration produced no results, only errors"
                );
            } else {
                every_iteration_failed = false;
            }

            let mut learnings = Vec::new();
            let mut budget_reached = false;
            for record in response.results {
                if let Some(abstract_text) = record.abstract_text.as_deref() {
                    learnings.extend(appraise::extract_key_findings(abstract_text, 1));
                }
                let title = record.title.clone();
                match self.pool.insert(record, seed.id).await {
                    PoolOutcome::Inserted(id) => {
                        source_ids.push(id);
                        self.events.emit(SessionEvent::SourceDiscovered {
                            session_id: self.session_id,
                            node_id: seed.id,
                            source_id: id,
                            title,
                        });
                    }
                    PoolOutcome::Linked(id) => {
                        if !source_ids.contains(&id) {
                            source_ids.push(id);
                        }
                    }
                    PoolOutcome::BudgetReached => {
                        budget_reached = true;
                        break;
                    }
                }
            }
            learnings.truncate(MAX_LEARNINGS_PER_ITERATION);

            let new_directions = self.derive_directions(seed, &source_ids).await;
            for direction in &new_directions {
                if !directions.contains(direction) {
                    directions.push(direction.clone());
                }
            }

            let sources_found = source_ids.len() as u32;
            learnings_so_far.extend(learnings.iter().cloned());
            iterations.push(IterationResult {
                iteration,
                query: query.clone(),
                database,
                sources_found,
                learnings,
                new_directions,
                timestamp: Utc::now(),
            });
            self.events.emit(SessionEvent::IterationCompleted {
                session_id: self.session_id,
                node_id: seed.id,
                iteration,
                query,
                sources_found,
            });

            if budget_reached {
                break;
            }
        }

        let failed = !iterations.is_empty() && every_iteration_failed;
        NodeOutcome {
            node_id: seed.id,
            iterations,
            source_ids,
            directions,
            failed,
        }
    }

    /// First iteration uses the perspective's search strategy; later ones
    /// refine with a salient term from accumulated learnings.
    fn build_query(&self, seed: &NodeSeed, iteration: u32, learnings: &[String]) -> String {
        let base = seed
            .strategies
            .get((iteration as usize - 1) % seed.strategies.len().max(1))
            .cloned()
            .unwrap_or_else(|| seed.topic.clone());

        if iteration == 1 || learnings.is_empty() {
            return base;
        }

        let base_terms = appraise::content_terms(&base);
        let refinement = learnings
            .iter()
            .flat_map(|l| appraise::content_terms(l))
            .find(|t| !base_terms.contains(t));
        match refinement {
            Some(term) => format!("{base} {term}"),
            None => base,
        }
    }

    /// Candidate follow-up directions: topic + the most frequent novel
    /// terms across this node's discovered titles.
    async fn derive_directions(&self, seed: &NodeSeed, source_ids: &[Uuid]) -> Vec<String> {
        let topic_terms = appraise::content_terms(self.topic);
        let node_terms = appraise::content_terms(&seed.topic);

        let sources = self.pool.snapshot().await;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for source in sources.iter().filter(|s| source_ids.contains(&s.id)) {
            for term in appraise::content_terms(&source.record.title) {
                if !topic_terms.contains(&term) && !node_terms.contains(&term) {
                    *counts.entry(term).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.config.breadth)
            .map(|(term, _)| format!("{} {}", self.topic, term))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use paperloom_common::{ResearchMode, SearchResult};
    use paperloom_search::testing::MockAdapter;
    use paperloom_search::Aggregator;
    use paperloom_sources::{SourceAdapter, SourceRegistry};

    use super::*;
    use crate::perspectives;

    fn record(title: &str, doi: Option<&str>, abstract_text: &str) -> SearchResult {
        SearchResult {
            id: title.to_string(),
            source: "alpha".to_string(),
            title: title.to_string(),
            doi: doi.map(String::from),
            abstract_text: Some(abstract_text.to_string()).filter(|a| !a.is_empty()),
            ..Default::default()
        }
    }

    fn setup(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        mut config: paperloom_common::ResearchConfig,
        max_sources: usize,
    ) -> (Aggregator, SourcePool, paperloom_common::ResearchConfig) {
        config.sources = adapters.iter().map(|a| a.id().to_string()).collect();
        config.max_sources = max_sources;
        let aggregator = Aggregator::new(Arc::new(SourceRegistry::from_adapters(adapters)));
        let pool = SourcePool::new(Uuid::new_v4(), "sleep and memory", max_sources);
        (aggregator, pool, config)
    }

    async fn run_explorer(
        aggregator: &Aggregator,
        pool: &SourcePool,
        config: &paperloom_common::ResearchConfig,
    ) -> ExplorationTree {
        let mut tree = ExplorationTree::new(ExplorationNode::new("sleep and memory", 0));
        let perspectives = perspectives::generate("sleep and memory", config.breadth);
        let events = EventBus::new();
        let failures = Mutex::new(Vec::new());
        let explorer = Explorer {
            aggregator,
            pool,
            config,
            session_id: Uuid::new_v4(),
            topic: "sleep and memory",
            events: &events,
            cancel: CancellationToken::new(),
            failures: &failures,
        };
        explorer.explore(&mut tree, &perspectives).await.unwrap();
        tree
    }

    #[tokio::test]
    async fn tree_respects_depth_and_breadth_invariants() {
        let results = vec![
            record("Sleep spindles and consolidation", Some("10.1/a"), "We found spindles matter."),
            record("Hippocampal replay during sleep", Some("10.1/b"), "Results show replay."),
            record("Slow waves and recall", Some("10.1/c"), "We found recall improves."),
        ];
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::with_results("alpha", results))];
        let (aggregator, pool, config) =
            setup(adapters, ResearchMode::Standard.default_config(), 100);

        let tree = run_explorer(&aggregator, &pool, &config).await;

        assert_eq!(tree.total_nodes as usize, tree.nodes.len());
        for node in tree.nodes.values() {
            assert!(node.depth <= config.depth);
            assert!(node.children.len() <= config.breadth);
            assert!(node.status.ne(&NodeStatus::Pending));
            if let Some(parent_id) = node.parent_id {
                let parent = &tree.nodes[&parent_id];
                assert_eq!(node.depth, parent.depth + 1);
                assert!(parent.children.contains(&node.id));
            }
        }
    }

    #[tokio::test]
    async fn source_budget_short_circuits_remaining_nodes() {
        let results: Vec<SearchResult> = (0..10)
            .map(|i| record(&format!("Distinct paper {i}"), None, "We found things."))
            .collect();
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::with_results("alpha", results))];
        let (aggregator, pool, config) = setup(adapters, ResearchMode::Deep.default_config(), 3);

        let tree = run_explorer(&aggregator, &pool, &config).await;

        assert!(pool.len().await <= 3);
        for node in tree.nodes.values() {
            assert!(
                matches!(node.status, NodeStatus::Complete | NodeStatus::Failed),
                "node left non-terminal: {:?}",
                node.status
            );
        }
    }

    #[tokio::test]
    async fn failing_source_marks_nodes_failed_not_the_run() {
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::failing("alpha", "HTTP 503"))];
        let (aggregator, pool, config) = setup(adapters, ResearchMode::Quick.default_config(), 10);

        let tree = run_explorer(&aggregator, &pool, &config).await;

        let failed = tree
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Failed)
            .count();
        assert!(failed > 0, "searching nodes should fail when every iteration errors");
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn rediscovery_links_without_duplicating() {
        // Both perspectives hit the same adapter and get the same record.
        let results = vec![record("One shared paper", Some("10.1/shared"), "We found X.")];
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::with_results("alpha", results))];
        let (aggregator, pool, config) = setup(adapters, ResearchMode::Quick.default_config(), 10);

        let tree = run_explorer(&aggregator, &pool, &config).await;

        assert_eq!(pool.len().await, 1);
        let sources = pool.snapshot().await;
        let shared_id = sources[0].id;
        let nodes_linking: usize = tree
            .nodes
            .values()
            .filter(|n| n.source_ids.contains(&shared_id))
            .count();
        assert!(nodes_linking >= 2, "both perspective nodes should link the source");
    }

    #[tokio::test]
    async fn cancellation_stops_exploration_quietly() {
        let results = vec![record("Paper", None, "")];
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::with_results("alpha", results))];
        let (aggregator, pool, config) = setup(adapters, ResearchMode::Deep.default_config(), 100);

        let mut tree = ExplorationTree::new(ExplorationNode::new("sleep and memory", 0));
        let perspectives = perspectives::generate("sleep and memory", config.breadth);
        let events = EventBus::new();
        let failures = Mutex::new(Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let explorer = Explorer {
            aggregator: &aggregator,
            pool: &pool,
            config: &config,
            session_id: Uuid::new_v4(),
            topic: "sleep and memory",
            events: &events,
            cancel,
            failures: &failures,
        };

        explorer.explore(&mut tree, &perspectives).await.unwrap();
        assert_eq!(pool.len().await, 0);
    }
}
