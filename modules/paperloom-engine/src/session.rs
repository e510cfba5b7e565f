//! Session orchestration: the forward-only state machine that ties the
//! aggregator, exploration engine, citation graph, consensus, and review
//! loop into one research session, plus the small service surface the
//! UI/persistence collaborators consume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use paperloom_common::{
    Config, ExplorationNode, ExplorationTree, NodeStatus, Progress, Reference, ResearchMode,
    ResearchSession, SessionEvent, SessionOverrides, SessionStatus,
};
use paperloom_search::Aggregator;

use crate::citations;
use crate::consensus;
use crate::events::EventBus;
use crate::explorer::Explorer;
use crate::perspectives;
use crate::pool::SourcePool;
use crate::review::{HeuristicScorer, ReviewContext, ReviewLoop, SynthesisScorer};
use crate::synthesis::{self, ComposeInput};

/// Drives exactly one research session. Construct, subscribe to events,
/// then `run`.
pub struct Orchestrator {
    session_id: Uuid,
    aggregator: Arc<Aggregator>,
    settings: Config,
    events: EventBus,
    cancel: CancellationToken,
    scorer: Box<dyn SynthesisScorer>,
}

impl Orchestrator {
    pub fn new(aggregator: Arc<Aggregator>, settings: Config) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            aggregator,
            settings,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            scorer: Box::new(HeuristicScorer),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SynthesisScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Token for cooperative cancellation. Cancelling abandons in-flight
    /// adapter calls and ends the session with partial results.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&self, session: &mut ResearchSession, to: SessionStatus) {
        let from = session.status;
        session.status = to;
        session.updated_at = Utc::now();
        recompute_progress(session);
        info!(session_id = %session.id, %from, %to, "Session state change");
        self.events.emit(SessionEvent::StatusChanged {
            session_id: session.id,
            from,
            to,
            percentage: session.progress.percentage,
        });
    }

    /// Run the session to a terminal status. The caller always gets a
    /// session back; failure is encoded in `status` and `errors`, never
    /// thrown, except that a session with no retrievable sources at all
    /// ends `failed`.
    pub async fn run(
        &self,
        topic: &str,
        mode: ResearchMode,
        overrides: &SessionOverrides,
    ) -> ResearchSession {
        let config = mode.default_config().apply(overrides);
        let now = Utc::now();
        let mut session = ResearchSession {
            id: self.session_id,
            topic: topic.to_string(),
            mode,
            status: if overrides.clarify {
                SessionStatus::Clarifying
            } else {
                SessionStatus::Planning
            },
            tree: ExplorationTree::new(ExplorationNode::new(topic, 0)),
            sources: Vec::new(),
            citation_graph: Default::default(),
            consensus: None,
            synthesis: None,
            progress: Progress {
                sources_target: config.max_sources as u32,
                nodes_total: 1,
                ..Default::default()
            },
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            config,
        };

        // `clarifying` is optional; nothing blocks on it here, it exists
        // so a caller can park the session while questions go out.
        if session.status == SessionStatus::Clarifying {
            self.transition(&mut session, SessionStatus::Planning);
        }

        let perspectives = perspectives::generate(topic, session.config.breadth);
        info!(
            session_id = %session.id,
            %mode,
            perspectives = perspectives.len(),
            max_sources = session.config.max_sources,
            "Session planned"
        );

        // --- Researching ---
        self.transition(&mut session, SessionStatus::Researching);
        let pool = SourcePool::new(session.id, topic, session.config.max_sources);
        let failures = Mutex::new(Vec::new());
        let explorer = Explorer {
            aggregator: self.aggregator.as_ref(),
            pool: &pool,
            config: &session.config,
            session_id: session.id,
            topic,
            events: &self.events,
            cancel: self.cancel.clone(),
            failures: &failures,
        };

        let budget = Duration::from_secs(self.settings.session_budget_secs);
        let explored = tokio::time::timeout(
            budget,
            explorer.explore(&mut session.tree, &perspectives),
        )
        .await;
        match explored {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %session.id, error = %e, "Exploration error, continuing with partial results");
            }
            Err(_) => {
                // Same early-stop semantics as exhausting maxSources.
                warn!(
                    session_id = %session.id,
                    budget_secs = self.settings.session_budget_secs,
                    "Session budget exceeded, forcing early completion with partial results"
                );
            }
        }
        normalize_tree(&mut session.tree);
        session.sources = pool.snapshot().await;
        session.errors = failures.into_inner();

        if self.cancel.is_cancelled() {
            self.transition(&mut session, SessionStatus::Cancelled);
            self.events.emit(SessionEvent::Cancelled {
                session_id: session.id,
            });
            return session;
        }

        if session.sources.is_empty() {
            let message = "no sources could be retrieved for the query".to_string();
            warn!(session_id = %session.id, "{message}");
            self.transition(&mut session, SessionStatus::Failed);
            self.events.emit(SessionEvent::Failed {
                session_id: session.id,
                message,
            });
            return session;
        }

        // --- Analyzing ---
        self.transition(&mut session, SessionStatus::Analyzing);
        session.citation_graph = citations::build_graph(&session.sources);
        session.consensus = Some(consensus::calculate(topic, &session.sources));

        // --- Reviewing ---
        self.transition(&mut session, SessionStatus::Reviewing);
        let compose_input = ComposeInput {
            topic,
            perspectives: &perspectives,
            sources: &session.sources,
            tree: &session.tree,
            graph: &session.citation_graph,
            consensus: session.consensus.as_ref(),
        };
        let draft = synthesis::compose(&compose_input);
        let review_ctx = ReviewContext {
            topic,
            perspectives: &perspectives,
            sources: &session.sources,
            graph: &session.citation_graph,
            consensus: session.consensus.as_ref(),
        };
        let review = ReviewLoop {
            scorer: self.scorer.as_ref(),
            quality_threshold: session.config.quality_threshold,
            iteration_limit: session.config.iteration_limit,
            events: &self.events,
            session_id: session.id,
        };
        let reviewed = review.run(draft, &review_ctx);

        // --- Synthesizing ---
        self.transition(&mut session, SessionStatus::Synthesizing);
        let quality_score = reviewed.quality_score;
        session.synthesis = Some(reviewed);

        self.transition(&mut session, SessionStatus::Complete);
        self.events.emit(SessionEvent::Completed {
            session_id: session.id,
            total_sources: session.sources.len() as u32,
            quality_score,
        });
        session
    }
}

/// Progress blend: halfway weight to source collection, halfway to node
/// completion.
fn recompute_progress(session: &mut ResearchSession) {
    let progress = &mut session.progress;
    progress.sources_collected = session.sources.len() as u32;
    progress.nodes_total = session.tree.total_nodes;
    progress.nodes_complete = session
        .tree
        .nodes
        .values()
        .filter(|n| matches!(n.status, NodeStatus::Complete | NodeStatus::Failed))
        .count() as u32;

    let source_part = if progress.sources_target > 0 {
        progress.sources_collected as f32 / progress.sources_target as f32
    } else {
        0.0
    };
    let node_part = if progress.nodes_total > 0 {
        progress.nodes_complete as f32 / progress.nodes_total as f32
    } else {
        0.0
    };
    let blended = (source_part.min(1.0) * 0.5 + node_part.min(1.0) * 0.5) * 100.0;
    progress.percentage = if session.status.is_terminal() {
        100.0
    } else {
        blended.min(99.0)
    };
}

/// Force every non-terminal node to `complete` after an early stop
/// (budget or timeout) so the tree satisfies its terminal-status
/// invariant, and resync the counter.
fn normalize_tree(tree: &mut ExplorationTree) {
    for node in tree.nodes.values_mut() {
        if matches!(node.status, NodeStatus::Pending | NodeStatus::Searching) {
            node.status = NodeStatus::Complete;
        }
    }
    tree.total_nodes = tree.nodes.len() as u32;
    tree.completed_nodes = tree
        .nodes
        .values()
        .filter(|n| matches!(n.status, NodeStatus::Complete | NodeStatus::Failed))
        .count() as u32;
}

/// References for the external citation formatter. The core never
/// renders citation style text itself.
pub fn references(session: &ResearchSession) -> Vec<Reference> {
    let mut ordered: Vec<&paperloom_common::ResearchSource> = session.sources.iter().collect();
    ordered.sort_by_key(|s| s.discovered_at);
    ordered.into_iter().map(Reference::from).collect()
}

// --- Session service (create / observe / cancel) ---

struct SessionEntry {
    events: EventBus,
    cancel: CancellationToken,
    task: JoinHandle<ResearchSession>,
}

/// Owns running sessions keyed by id. This is the surface the UI and
/// persistence collaborators talk to.
pub struct ResearchService {
    aggregator: Arc<Aggregator>,
    settings: Config,
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl ResearchService {
    pub fn new(aggregator: Arc<Aggregator>, settings: Config) -> Self {
        Self {
            aggregator,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session in the background and return its id immediately.
    pub async fn create_session(
        &self,
        topic: &str,
        mode: ResearchMode,
        user_id: Option<&str>,
        overrides: SessionOverrides,
    ) -> Uuid {
        let orchestrator = Orchestrator::new(Arc::clone(&self.aggregator), self.settings.clone());
        let id = orchestrator.session_id();
        let events = orchestrator.events().clone();
        let cancel = orchestrator.cancel_token();
        info!(session_id = %id, user_id = user_id.unwrap_or("anonymous"), topic, "Session created");

        let topic = topic.to_string();
        let task = tokio::spawn(async move {
            orchestrator.run(&topic, mode, &overrides).await
        });

        self.sessions.lock().await.insert(
            id,
            SessionEntry {
                events,
                cancel,
                task,
            },
        );
        id
    }

    /// Subscribe to a session's event stream.
    pub async fn subscribe(
        &self,
        id: Uuid,
    ) -> Option<tokio::sync::broadcast::Receiver<SessionEvent>> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.events.subscribe())
    }

    /// Request cooperative cancellation. Returns false for unknown ids.
    pub async fn cancel_session(&self, id: Uuid) -> bool {
        match self.sessions.lock().await.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Await the session outcome and release its entry.
    pub async fn take_result(&self, id: Uuid) -> Option<ResearchSession> {
        let entry = self.sessions.lock().await.remove(&id)?;
        match entry.task.await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Session task panicked");
                None
            }
        }
    }
}

// --- Run summary ---

/// End-of-run counters for operators and the CLI.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub status: String,
    pub nodes_total: u32,
    pub nodes_failed: u32,
    pub sources_collected: u32,
    pub citation_edges: u32,
    pub revisions: u32,
    pub quality_score: f32,
    pub word_count: u32,
    pub provider_errors: u32,
}

impl RunSummary {
    pub fn from_session(session: &ResearchSession) -> Self {
        Self {
            status: session.status.to_string(),
            nodes_total: session.tree.total_nodes,
            nodes_failed: session
                .tree
                .nodes
                .values()
                .filter(|n| n.status == NodeStatus::Failed)
                .count() as u32,
            sources_collected: session.sources.len() as u32,
            citation_edges: session.citation_graph.edges.len() as u32,
            revisions: session.synthesis.as_ref().map(|s| s.revision_count).unwrap_or(0),
            quality_score: session.synthesis.as_ref().map(|s| s.quality_score).unwrap_or(0.0),
            word_count: session.synthesis.as_ref().map(|s| s.word_count).unwrap_or(0),
            provider_errors: session.errors.len() as u32,
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Research Session {} ===", self.status)?;
        writeln!(f, "Nodes explored:   {} ({} failed)", self.nodes_total, self.nodes_failed)?;
        writeln!(f, "Sources:          {}", self.sources_collected)?;
        writeln!(f, "Citation edges:   {}", self.citation_edges)?;
        writeln!(f, "Revisions:        {}", self.revisions)?;
        writeln!(f, "Quality score:    {:.1}", self.quality_score)?;
        writeln!(f, "Synthesis words:  {}", self.word_count)?;
        writeln!(f, "Provider errors:  {}", self.provider_errors)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use paperloom_common::SearchResult;
    use paperloom_search::testing::{record, MockAdapter};
    use paperloom_sources::{SourceAdapter, SourceRegistry};

    use super::*;
    use crate::review::QualityReport;

    struct FixedScorer(f32);

    impl SynthesisScorer for FixedScorer {
        fn score(
            &self,
            _synthesis: &paperloom_common::Synthesis,
            _ctx: &ReviewContext<'_>,
        ) -> QualityReport {
            QualityReport::weighted(self.0, self.0, self.0, self.0, self.0)
        }
    }

    fn rich_record(title: &str, doi: &str) -> SearchResult {
        let mut r = record("alpha", title, Some(doi));
        r.abstract_text = Some(format!(
            "We found that {title} was associated with significant improvement."
        ));
        r.year = Some(2024);
        r
    }

    fn service_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> (Arc<Aggregator>, Config) {
        let aggregator = Arc::new(Aggregator::new(Arc::new(SourceRegistry::from_adapters(
            adapters,
        ))));
        (aggregator, Config::default())
    }

    fn quick_overrides() -> SessionOverrides {
        SessionOverrides {
            sources: Some(vec!["alpha".to_string()]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn session_runs_to_complete_with_synthesis() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![
                rich_record("sleep restriction", "10.1/a"),
                rich_record("memory consolidation", "10.1/b"),
            ],
        ))];
        let (aggregator, settings) = service_with(adapters);

        let orchestrator = Orchestrator::new(aggregator, settings);
        let session = orchestrator
            .run("sleep and memory", ResearchMode::Quick, &quick_overrides())
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        assert!(!session.sources.is_empty());
        assert!(session.consensus.is_some());
        let synthesis = session.synthesis.expect("synthesis produced");
        assert!(synthesis.word_count > 0);
        assert_eq!(session.progress.percentage, 100.0);
        assert_eq!(session.tree.total_nodes as usize, session.tree.nodes.len());
    }

    #[tokio::test]
    async fn no_retrievable_sources_fails_the_session() {
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(MockAdapter::failing("alpha", "HTTP 500"))];
        let (aggregator, settings) = service_with(adapters);

        let orchestrator = Orchestrator::new(aggregator, settings);
        let session = orchestrator
            .run("anything", ResearchMode::Quick, &quick_overrides())
            .await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.sources.is_empty());
        assert!(!session.errors.is_empty());
        assert!(session.synthesis.is_none());
    }

    #[tokio::test]
    async fn stubbed_low_scorer_exhausts_revision_budget_without_failing() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![rich_record("topic paper", "10.1/t")],
        ))];
        let (aggregator, settings) = service_with(adapters);

        let orchestrator =
            Orchestrator::new(aggregator, settings).with_scorer(Box::new(FixedScorer(50.0)));
        let overrides = SessionOverrides {
            sources: Some(vec!["alpha".to_string()]),
            quality_threshold: Some(80.0),
            iteration_limit: Some(2),
            ..Default::default()
        };
        let session = orchestrator
            .run("topic", ResearchMode::Standard, &overrides)
            .await;

        assert_eq!(session.status, SessionStatus::Complete);
        let synthesis = session.synthesis.expect("best-so-far synthesis returned");
        assert_eq!(synthesis.revision_count, 2);
        assert!(synthesis.review_feedback.iter().any(|f| !f.resolved));
    }

    #[tokio::test]
    async fn pre_cancelled_session_ends_cancelled_with_partials() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![rich_record("paper", "10.1/p")],
        ))];
        let (aggregator, settings) = service_with(adapters);

        let orchestrator = Orchestrator::new(aggregator, settings);
        orchestrator.cancel_token().cancel();
        let session = orchestrator
            .run("topic", ResearchMode::Quick, &quick_overrides())
            .await;

        assert_eq!(session.status, SessionStatus::Cancelled);
        assert!(session.synthesis.is_none());
    }

    #[tokio::test]
    async fn service_creates_observes_and_cancels_sessions() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![rich_record("paper", "10.1/p")],
        ))];
        let (aggregator, settings) = service_with(adapters);
        let service = ResearchService::new(aggregator, settings);

        let id = service
            .create_session("topic", ResearchMode::Quick, Some("user-1"), quick_overrides())
            .await;
        assert!(service.subscribe(id).await.is_some());
        assert!(service.cancel_session(id).await);

        let session = service.take_result(id).await.expect("session result");
        assert!(session.status.is_terminal());
        // entry is gone after take_result
        assert!(!service.cancel_session(id).await);
    }

    #[tokio::test]
    async fn events_stream_reports_lifecycle() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(MockAdapter::with_results(
            "alpha",
            vec![rich_record("paper", "10.1/p")],
        ))];
        let (aggregator, settings) = service_with(adapters);

        let orchestrator = Orchestrator::new(aggregator, settings);
        let mut events = orchestrator.events().subscribe();
        let session = orchestrator
            .run("topic", ResearchMode::Quick, &quick_overrides())
            .await;
        assert_eq!(session.status, SessionStatus::Complete);

        let mut saw_researching = false;
        let mut saw_completed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::StatusChanged { to, .. } if to == SessionStatus::Researching => {
                    saw_researching = true;
                }
                SessionEvent::Completed { .. } => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_researching);
        assert!(saw_completed);
    }
}
