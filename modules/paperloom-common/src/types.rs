use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Bibliographic records ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub first: Option<String>,
    pub last: Option<String>,
    #[serde(default)]
    pub affiliations: Vec<String>,
    pub orcid: Option<String>,
}

impl Author {
    /// Build an author from a display name, splitting on the last space.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        let (first, last) = match name.rsplit_once(' ') {
            Some((first, last)) => (Some(first.to_string()), Some(last.to_string())),
            None => (None, Some(name.to_string())),
        };
        Self {
            name: name.to_string(),
            first,
            last,
            affiliations: Vec::new(),
            orcid: None,
        }
    }
}

/// A normalized bibliographic record as returned by a source adapter.
/// `id` + `source` uniquely identify a record before deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub source: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub citation_count: Option<u32>,
    pub open_access: bool,
    pub pdf_url: Option<String>,
    pub venue: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Year range filter, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub from: i32,
    pub to: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        year >= self.from && year <= self.to
    }
}

/// Query shape accepted by both the single-source entry point and the
/// aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub year_range: Option<YearRange>,
    #[serde(default)]
    pub open_access_only: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            offset: 0,
            year_range: None,
            open_access_only: false,
            categories: Vec::new(),
        }
    }
}

/// A provider failure surfaced as data, never as an exception past the
/// aggregator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

// --- Session configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    Quick,
    Standard,
    Deep,
    Exhaustive,
    Systematic,
}

impl std::fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchMode::Quick => write!(f, "quick"),
            ResearchMode::Standard => write!(f, "standard"),
            ResearchMode::Deep => write!(f, "deep"),
            ResearchMode::Exhaustive => write!(f, "exhaustive"),
            ResearchMode::Systematic => write!(f, "systematic"),
        }
    }
}

impl std::str::FromStr for ResearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(ResearchMode::Quick),
            "standard" => Ok(ResearchMode::Standard),
            "deep" => Ok(ResearchMode::Deep),
            "exhaustive" => Ok(ResearchMode::Exhaustive),
            "systematic" => Ok(ResearchMode::Systematic),
            other => Err(format!("Unknown research mode: {other}")),
        }
    }
}

/// Per-session budgets. Seeded from the mode preset, then individually
/// replaced by caller overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub depth: usize,
    pub breadth: usize,
    pub max_sources: usize,
    pub iteration_limit: u32,
    pub quality_threshold: f32,
    pub sources: Vec<String>,
    pub year_range: Option<YearRange>,
    #[serde(default)]
    pub article_types: Vec<String>,
}

impl ResearchMode {
    /// Fixed preset for this mode. Every downstream budget derives from it.
    pub fn default_config(&self) -> ResearchConfig {
        let (depth, breadth, max_sources, iteration_limit, quality_threshold) = match self {
            ResearchMode::Quick => (1, 2, 10, 1, 70.0),
            ResearchMode::Standard => (2, 3, 25, 2, 80.0),
            ResearchMode::Deep => (3, 4, 50, 3, 85.0),
            ResearchMode::Exhaustive => (4, 5, 100, 4, 90.0),
            ResearchMode::Systematic => (5, 6, 200, 5, 95.0),
        };
        let sources = match self {
            ResearchMode::Quick => vec!["pubmed", "semantic_scholar"],
            ResearchMode::Standard => vec!["pubmed", "semantic_scholar", "openalex"],
            ResearchMode::Deep => vec!["pubmed", "europepmc", "semantic_scholar", "openalex"],
            ResearchMode::Exhaustive => {
                vec!["pubmed", "europepmc", "semantic_scholar", "openalex", "crossref"]
            }
            ResearchMode::Systematic => vec![
                "pubmed",
                "europepmc",
                "semantic_scholar",
                "openalex",
                "crossref",
                "arxiv",
            ],
        };
        ResearchConfig {
            depth,
            breadth,
            max_sources,
            iteration_limit,
            quality_threshold,
            sources: sources.into_iter().map(String::from).collect(),
            year_range: None,
            article_types: Vec::new(),
        }
    }
}

/// Caller-supplied partial override. Each set field replaces the preset
/// value without altering the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOverrides {
    pub depth: Option<usize>,
    pub breadth: Option<usize>,
    pub max_sources: Option<usize>,
    pub iteration_limit: Option<u32>,
    pub quality_threshold: Option<f32>,
    pub sources: Option<Vec<String>>,
    pub year_range: Option<YearRange>,
    pub article_types: Option<Vec<String>>,
    /// Enter the optional `clarifying` state before planning.
    #[serde(default)]
    pub clarify: bool,
}

impl ResearchConfig {
    pub fn apply(mut self, overrides: &SessionOverrides) -> Self {
        if let Some(depth) = overrides.depth {
            self.depth = depth;
        }
        if let Some(breadth) = overrides.breadth {
            self.breadth = breadth;
        }
        if let Some(max_sources) = overrides.max_sources {
            self.max_sources = max_sources;
        }
        if let Some(iteration_limit) = overrides.iteration_limit {
            self.iteration_limit = iteration_limit;
        }
        if let Some(quality_threshold) = overrides.quality_threshold {
            self.quality_threshold = quality_threshold;
        }
        if let Some(ref sources) = overrides.sources {
            self.sources = sources.clone();
        }
        if let Some(year_range) = overrides.year_range {
            self.year_range = Some(year_range);
        }
        if let Some(ref article_types) = overrides.article_types {
            self.article_types = article_types.clone();
        }
        self
    }
}

// --- Session state machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Clarifying,
    Planning,
    Researching,
    Analyzing,
    Reviewing,
    Synthesizing,
    Complete,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Clarifying => write!(f, "clarifying"),
            SessionStatus::Planning => write!(f, "planning"),
            SessionStatus::Researching => write!(f, "researching"),
            SessionStatus::Analyzing => write!(f, "analyzing"),
            SessionStatus::Reviewing => write!(f, "reviewing"),
            SessionStatus::Synthesizing => write!(f, "synthesizing"),
            SessionStatus::Complete => write!(f, "complete"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f32,
    pub sources_collected: u32,
    pub sources_target: u32,
    pub nodes_complete: u32,
    pub nodes_total: u32,
}

// --- Exploration tree ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Searching,
    Complete,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Searching => write!(f, "searching"),
            NodeStatus::Complete => write!(f, "complete"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One search pass executed by an exploration node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub iteration: u32,
    pub query: String,
    pub database: String,
    pub sources_found: u32,
    pub learnings: Vec<String>,
    pub new_directions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One sub-question in the research tree. Parent/child relations are ids,
/// resolved through the tree's node map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationNode {
    pub id: Uuid,
    pub topic: String,
    pub perspective_id: Option<String>,
    pub parent_id: Option<Uuid>,
    pub depth: usize,
    pub status: NodeStatus,
    pub iterations: Vec<IterationResult>,
    pub source_ids: Vec<Uuid>,
    pub children: Vec<Uuid>,
}

impl ExplorationNode {
    pub fn new(topic: impl Into<String>, depth: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            perspective_id: None,
            parent_id: None,
            depth,
            status: NodeStatus::Pending,
            iterations: Vec::new(),
            source_ids: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Flat id-keyed arena of exploration nodes. Counters are kept consistent
/// with the map by the exploration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationTree {
    pub root_id: Uuid,
    pub nodes: HashMap<Uuid, ExplorationNode>,
    pub total_nodes: u32,
    pub completed_nodes: u32,
}

impl ExplorationTree {
    pub fn new(root: ExplorationNode) -> Self {
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            root_id,
            nodes,
            total_nodes: 1,
            completed_nodes: 0,
        }
    }

    /// Insert `child` under `parent_id`, wiring both sides of the relation.
    pub fn attach(&mut self, parent_id: Uuid, mut child: ExplorationNode) -> Uuid {
        child.parent_id = Some(parent_id);
        let child_id = child.id;
        self.nodes.insert(child_id, child);
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(child_id);
        }
        self.total_nodes += 1;
        child_id
    }

    pub fn node_ids_at_depth(&self, depth: usize) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .nodes
            .values()
            .filter(|n| n.depth == depth)
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }
}

// --- Collected sources ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyDesign {
    MetaAnalysis,
    SystematicReview,
    RandomizedTrial,
    CohortStudy,
    CaseControl,
    CrossSectional,
    CaseReport,
    Preprint,
    Review,
    Other,
}

impl StudyDesign {
    /// Methodological rigor on a 0-9 scale. Drives consensus confidence and
    /// evidence-quality scoring.
    pub fn rigor(&self) -> u8 {
        match self {
            StudyDesign::MetaAnalysis => 9,
            StudyDesign::SystematicReview => 8,
            StudyDesign::RandomizedTrial => 7,
            StudyDesign::CohortStudy => 5,
            StudyDesign::CaseControl => 4,
            StudyDesign::CrossSectional => 3,
            StudyDesign::Review => 3,
            StudyDesign::Preprint => 2,
            StudyDesign::CaseReport => 1,
            StudyDesign::Other => 1,
        }
    }
}

impl std::fmt::Display for StudyDesign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudyDesign::MetaAnalysis => write!(f, "meta-analysis"),
            StudyDesign::SystematicReview => write!(f, "systematic review"),
            StudyDesign::RandomizedTrial => write!(f, "randomized trial"),
            StudyDesign::CohortStudy => write!(f, "cohort study"),
            StudyDesign::CaseControl => write!(f, "case-control study"),
            StudyDesign::CrossSectional => write!(f, "cross-sectional study"),
            StudyDesign::CaseReport => write!(f, "case report"),
            StudyDesign::Preprint => write!(f, "preprint"),
            StudyDesign::Review => write!(f, "review"),
            StudyDesign::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub study_design: StudyDesign,
    pub sample_size: Option<u32>,
    pub peer_reviewed: bool,
    pub conflict_of_interest: bool,
}

/// A deduplicated record plus session-scoped fields. Created once per
/// unique source the first time it is discovered anywhere in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSource {
    pub id: Uuid,
    pub session_id: Uuid,
    pub record: SearchResult,
    /// Node that first discovered this source.
    pub discovered_by: Uuid,
    /// Discovery ordinal within the session.
    pub discovered_at: u32,
    pub relevance_score: f32,
    pub quality: Option<SourceQuality>,
    #[serde(default)]
    pub key_findings: Vec<String>,
}

// --- Citation graph ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperNode {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub citation_count: Option<u32>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Supporting,
    Disputing,
    Mentioning,
    Methodology,
    Data,
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeType::Supporting => write!(f, "supporting"),
            EdgeType::Disputing => write!(f, "disputing"),
            EdgeType::Mentioning => write!(f, "mentioning"),
            EdgeType::Methodology => write!(f, "methodology"),
            EdgeType::Data => write!(f, "data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub edge_type: EdgeType,
    pub confidence: f32,
    pub statement: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub label: String,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationGraph {
    pub nodes: Vec<PaperNode>,
    pub edges: Vec<CitationEdge>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl CitationGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// --- Consensus ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    YesNo,
    Categorical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanceDistribution {
    pub supporting: u32,
    pub neutral: u32,
    pub contradicting: u32,
}

impl StanceDistribution {
    pub fn total(&self) -> u32 {
        self.supporting + self.neutral + self.contradicting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Moderate,
    High,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "high"),
            ConfidenceLevel::Moderate => write!(f, "moderate"),
            ConfidenceLevel::Low => write!(f, "low"),
            ConfidenceLevel::VeryLow => write!(f, "very_low"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyTypeBreakdown {
    pub design: StudyDesign,
    pub distribution: StanceDistribution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetrics {
    pub has_rcts: bool,
    pub has_meta_analyses: bool,
    pub average_study_quality: f32,
    pub total_sample_size: u64,
    pub recent_studies_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusData {
    pub question: String,
    pub question_type: QuestionType,
    /// Raw stance counts, not percentages.
    pub distribution: StanceDistribution,
    pub breakdown: Vec<StudyTypeBreakdown>,
    pub confidence: ConfidenceLevel,
    pub confidence_reason: String,
    pub total_studies: u32,
    pub metrics: EvidenceMetrics,
}

// --- Synthesis ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    MissingCoverage,
    UnsupportedClaim,
    Contradiction,
    Bias,
    InsufficientEvidence,
    OutdatedSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSeverity {
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub feedback_type: FeedbackType,
    pub severity: FeedbackSeverity,
    pub description: String,
    pub location: Option<String>,
    pub suggestions: Vec<String>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSection {
    pub title: String,
    pub content: String,
    pub source_ids: Vec<Uuid>,
    pub perspective_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synthesis {
    pub content: String,
    pub sections: Vec<SynthesisSection>,
    pub quality_score: f32,
    pub review_feedback: Vec<ReviewFeedback>,
    pub revision_count: u32,
    pub word_count: u32,
    pub citation_count: u32,
}

// --- Perspectives ---

/// A named angle of inquiry on the research topic. Breadth = number of
/// perspectives explored concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perspective {
    pub id: String,
    pub name: String,
    pub guiding_questions: Vec<String>,
    pub search_strategies: Vec<String>,
}

// --- Citation formatting boundary ---

/// Record handed to an external formatter for human-readable citation
/// text. The core never renders citation style itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub authors: Vec<String>,
    pub issued_year: Option<i32>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub url: Option<String>,
    pub venue: Option<String>,
}

impl From<&ResearchSource> for Reference {
    fn from(source: &ResearchSource) -> Self {
        let record = &source.record;
        Self {
            title: record.title.clone(),
            authors: record.authors.iter().map(|a| a.name.clone()).collect(),
            issued_year: record.year,
            doi: record.doi.clone(),
            pmid: record.pmid.clone(),
            url: record.pdf_url.clone(),
            venue: record.venue.clone(),
        }
    }
}

// --- Root aggregate ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    pub topic: String,
    pub mode: ResearchMode,
    pub status: SessionStatus,
    pub config: ResearchConfig,
    pub tree: ExplorationTree,
    pub sources: Vec<ResearchSource>,
    pub citation_graph: CitationGraph,
    pub consensus: Option<ConsensusData>,
    pub synthesis: Option<Synthesis>,
    pub progress: Progress,
    pub errors: Vec<SourceFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systematic_preset_matches_table() {
        let config = ResearchMode::Systematic.default_config();
        assert_eq!(config.depth, 5);
        assert_eq!(config.breadth, 6);
        assert_eq!(config.max_sources, 200);
        assert_eq!(config.iteration_limit, 5);
        assert_eq!(config.quality_threshold, 95.0);
        assert_eq!(config.sources.len(), 6);
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let overrides = SessionOverrides {
            max_sources: Some(40),
            quality_threshold: Some(60.0),
            ..Default::default()
        };
        let config = ResearchMode::Standard.default_config().apply(&overrides);
        assert_eq!(config.max_sources, 40);
        assert_eq!(config.quality_threshold, 60.0);
        // untouched preset values survive
        assert_eq!(config.depth, 2);
        assert_eq!(config.breadth, 3);
        assert_eq!(config.iteration_limit, 2);
    }

    #[test]
    fn attach_wires_parent_and_child() {
        let root = ExplorationNode::new("root", 0);
        let mut tree = ExplorationTree::new(root);
        let child = ExplorationNode::new("child", 1);
        let child_id = tree.attach(tree.root_id, child);

        let parent = &tree.nodes[&tree.root_id];
        assert!(parent.children.contains(&child_id));
        assert_eq!(tree.nodes[&child_id].parent_id, Some(tree.root_id));
        assert_eq!(tree.total_nodes, 2);
    }

    #[test]
    fn author_from_name_splits_on_last_space() {
        let a = Author::from_name("Maria van der Berg");
        assert_eq!(a.first.as_deref(), Some("Maria van der"));
        assert_eq!(a.last.as_deref(), Some("Berg"));

        let single = Author::from_name("Aristotle");
        assert_eq!(single.first, None);
        assert_eq!(single.last.as_deref(), Some("Aristotle"));
    }
}
