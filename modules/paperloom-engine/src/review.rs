//! The quality review loop: score the synthesis along fixed dimensions,
//! generate typed feedback, revise, and repeat until the threshold is met
//! or the revision budget is exhausted. Exhausting the budget is not a
//! failure; the best-so-far synthesis is returned with its feedback left
//! unresolved.

use chrono::{Datelike, Utc};
use tracing::info;
use uuid::Uuid;

use paperloom_common::{
    CitationGraph, ConsensusData, EdgeType, FeedbackSeverity, FeedbackType, Perspective,
    ResearchSource, ReviewFeedback, SessionEvent, Synthesis, SynthesisSection,
};

use crate::events::EventBus;
use crate::synthesis;

/// A dimension scoring below this generates feedback; one scoring at or
/// above it resolves earlier feedback of its type.
const DIMENSION_BAR: f32 = 70.0;
const CRITICAL_BAR: f32 = 40.0;

const WEIGHT_COVERAGE: f32 = 0.25;
const WEIGHT_EVIDENCE: f32 = 0.25;
const WEIGHT_BALANCE: f32 = 0.20;
const WEIGHT_RECENCY: f32 = 0.15;
const WEIGHT_CITATIONS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub coverage: f32,
    pub evidence_quality: f32,
    pub balance: f32,
    pub recency: f32,
    pub citation_accuracy: f32,
    pub overall: f32,
}

impl QualityReport {
    pub fn weighted(
        coverage: f32,
        evidence_quality: f32,
        balance: f32,
        recency: f32,
        citation_accuracy: f32,
    ) -> Self {
        let overall = coverage * WEIGHT_COVERAGE
            + evidence_quality * WEIGHT_EVIDENCE
            + balance * WEIGHT_BALANCE
            + recency * WEIGHT_RECENCY
            + citation_accuracy * WEIGHT_CITATIONS;
        Self {
            coverage,
            evidence_quality,
            balance,
            recency,
            citation_accuracy,
            overall,
        }
    }

    fn dimension(&self, feedback_type: FeedbackType) -> f32 {
        match feedback_type {
            FeedbackType::MissingCoverage => self.coverage,
            FeedbackType::InsufficientEvidence => self.evidence_quality,
            FeedbackType::Bias | FeedbackType::Contradiction => self.balance,
            FeedbackType::OutdatedSources => self.recency,
            FeedbackType::UnsupportedClaim => self.citation_accuracy,
        }
    }
}

pub struct ReviewContext<'a> {
    pub topic: &'a str,
    pub perspectives: &'a [Perspective],
    pub sources: &'a [ResearchSource],
    pub graph: &'a CitationGraph,
    pub consensus: Option<&'a ConsensusData>,
}

/// Scores a synthesis. A trait so tests can pin the score and exercise
/// the loop's termination behavior.
pub trait SynthesisScorer: Send + Sync {
    fn score(&self, synthesis: &Synthesis, ctx: &ReviewContext<'_>) -> QualityReport;
}

pub struct HeuristicScorer;

impl SynthesisScorer for HeuristicScorer {
    fn score(&self, synthesis: &Synthesis, ctx: &ReviewContext<'_>) -> QualityReport {
        let coverage = score_coverage(synthesis, ctx);
        let evidence = score_evidence(ctx);
        let balance = score_balance(synthesis, ctx);
        let recency = score_recency(ctx);
        let citations = score_citations(synthesis);
        QualityReport::weighted(coverage, evidence, balance, recency, citations)
    }
}

fn score_coverage(synthesis: &Synthesis, ctx: &ReviewContext<'_>) -> f32 {
    if ctx.perspectives.is_empty() {
        return 0.0;
    }
    let covered = ctx
        .perspectives
        .iter()
        .filter(|p| {
            synthesis
                .sections
                .iter()
                .any(|s| s.perspective_ids.contains(&p.id) && !s.source_ids.is_empty())
        })
        .count();
    let perspective_part = covered as f32 / ctx.perspectives.len() as f32 * 80.0;
    let volume_part = (ctx.sources.len() as f32 / 10.0).min(1.0) * 20.0;
    perspective_part + volume_part
}

fn score_evidence(ctx: &ReviewContext<'_>) -> f32 {
    if ctx.sources.is_empty() {
        return 0.0;
    }
    let n = ctx.sources.len() as f32;
    let rigor: f32 = ctx
        .sources
        .iter()
        .filter_map(|s| s.quality)
        .map(|q| q.study_design.rigor() as f32 / 9.0)
        .sum::<f32>()
        / n;
    let peer_reviewed = ctx
        .sources
        .iter()
        .filter_map(|s| s.quality)
        .filter(|q| q.peer_reviewed)
        .count() as f32
        / n;
    rigor * 70.0 + peer_reviewed * 30.0
}

fn score_balance(synthesis: &Synthesis, ctx: &ReviewContext<'_>) -> f32 {
    let mut score = 50.0;
    let has_contention_section = synthesis
        .sections
        .iter()
        .any(|s| s.title == "Points of contention");
    let has_disputes = ctx
        .graph
        .edges
        .iter()
        .any(|e| e.edge_type == EdgeType::Disputing);
    if !has_disputes || has_contention_section {
        score += 25.0;
    }
    match ctx.consensus {
        Some(consensus) => {
            let d = consensus.distribution;
            // Minority evidence acknowledged in the text, or genuinely
            // one-sided evidence.
            if d.contradicting == 0 || d.supporting == 0 || has_contention_section {
                score += 25.0;
            }
        }
        None => score += 25.0,
    }
    score
}

fn score_recency(ctx: &ReviewContext<'_>) -> f32 {
    if ctx.sources.is_empty() {
        return 0.0;
    }
    let current_year = Utc::now().year();
    let recent = ctx
        .sources
        .iter()
        .filter(|s| s.record.year.map(|y| y >= current_year - 5).unwrap_or(false))
        .count();
    recent as f32 / ctx.sources.len() as f32 * 100.0
}

fn score_citations(synthesis: &Synthesis) -> f32 {
    let substantive: Vec<&SynthesisSection> = synthesis
        .sections
        .iter()
        .filter(|s| !s.perspective_ids.is_empty() || s.title == "Points of contention")
        .collect();
    if substantive.is_empty() {
        return 0.0;
    }
    let cited = substantive.iter().filter(|s| !s.source_ids.is_empty()).count();
    cited as f32 / substantive.len() as f32 * 100.0
}

fn severity_for(score: f32) -> FeedbackSeverity {
    if score < CRITICAL_BAR {
        FeedbackSeverity::Critical
    } else {
        FeedbackSeverity::Major
    }
}

fn generate_feedback(
    report: &QualityReport,
    synthesis: &Synthesis,
    ctx: &ReviewContext<'_>,
) -> Vec<ReviewFeedback> {
    let mut feedback = Vec::new();

    if report.coverage < DIMENSION_BAR {
        let uncovered: Vec<&str> = ctx
            .perspectives
            .iter()
            .filter(|p| {
                !synthesis
                    .sections
                    .iter()
                    .any(|s| s.perspective_ids.contains(&p.id) && !s.source_ids.is_empty())
            })
            .map(|p| p.name.as_str())
            .collect();
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::MissingCoverage,
            severity: severity_for(report.coverage),
            description: format!(
                "Perspectives without cited evidence: {}",
                if uncovered.is_empty() {
                    "none, but source volume is thin".to_string()
                } else {
                    uncovered.join(", ")
                }
            ),
            location: None,
            suggestions: vec![
                "Add sections citing sources for the uncovered perspectives".to_string(),
                "Broaden search strategies for thin branches".to_string(),
            ],
            resolved: false,
        });
    }

    if report.evidence_quality < DIMENSION_BAR {
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::InsufficientEvidence,
            severity: severity_for(report.evidence_quality),
            description: "The evidence base leans on low-rigor study designs".to_string(),
            location: Some("Evidence base".to_string()),
            suggestions: vec![
                "State design limitations explicitly".to_string(),
                "Weight conclusions toward the most rigorous studies".to_string(),
            ],
            resolved: false,
        });
    }

    if report.balance < DIMENSION_BAR {
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::Bias,
            severity: severity_for(report.balance),
            description: "Minority or contradicting evidence is underrepresented".to_string(),
            location: None,
            suggestions: vec!["Acknowledge the contradicting evidence explicitly".to_string()],
            resolved: false,
        });
    }

    let has_disputes = ctx
        .graph
        .edges
        .iter()
        .any(|e| e.edge_type == EdgeType::Disputing);
    let has_contention_section = synthesis
        .sections
        .iter()
        .any(|s| s.title == "Points of contention");
    if has_disputes && !has_contention_section {
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::Contradiction,
            severity: FeedbackSeverity::Major,
            description: "Disputing relationships in the citation graph are not surfaced"
                .to_string(),
            location: None,
            suggestions: vec!["Add a contention section covering the disputes".to_string()],
            resolved: false,
        });
    }

    if report.recency < DIMENSION_BAR {
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::OutdatedSources,
            severity: severity_for(report.recency),
            description: "Most cited sources are older than five years".to_string(),
            location: None,
            suggestions: vec!["Flag conclusions that rest on dated evidence".to_string()],
            resolved: false,
        });
    }

    if report.citation_accuracy < DIMENSION_BAR {
        feedback.push(ReviewFeedback {
            feedback_type: FeedbackType::UnsupportedClaim,
            severity: severity_for(report.citation_accuracy),
            description: "Sections make claims without citing any source".to_string(),
            location: None,
            suggestions: vec!["Attach citation markers to every substantive claim".to_string()],
            resolved: false,
        });
    }

    feedback
}

/// Apply one round of feedback to the synthesis.
fn revise(synthesis: Synthesis, feedback: &[ReviewFeedback], ctx: &ReviewContext<'_>) -> Synthesis {
    let mut synthesis = synthesis;
    let markers = synthesis::citation_markers(ctx.sources);

    for item in feedback {
        match item.feedback_type {
            FeedbackType::MissingCoverage => {
                // Cite sources that no section reaches yet.
                let cited: Vec<Uuid> = synthesis
                    .sections
                    .iter()
                    .flat_map(|s| s.source_ids.iter().copied())
                    .collect();
                let mut unused: Vec<&ResearchSource> = ctx
                    .sources
                    .iter()
                    .filter(|s| !cited.contains(&s.id))
                    .collect();
                if unused.is_empty() {
                    continue;
                }
                unused.sort_by(|a, b| {
                    b.relevance_score
                        .partial_cmp(&a.relevance_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                unused.truncate(5);
                let mut content = String::from("Further evidence not covered above.");
                for source in &unused {
                    let marker = markers.get(&source.id).copied().unwrap_or(0);
                    let claim = source
                        .key_findings
                        .first()
                        .cloned()
                        .unwrap_or_else(|| source.record.title.clone());
                    content.push_str(&format!(" {} [{}].", claim.trim_end_matches('.'), marker));
                }
                synthesis.sections.push(SynthesisSection {
                    title: "Additional evidence".to_string(),
                    content,
                    source_ids: unused.iter().map(|s| s.id).collect(),
                    perspective_ids: Vec::new(),
                });
            }
            FeedbackType::Contradiction => {
                let already = synthesis
                    .sections
                    .iter()
                    .any(|s| s.title == "Points of contention");
                if !already {
                    if let Some(section) =
                        synthesis::contention_section(ctx.graph, ctx.sources, &markers)
                    {
                        synthesis.sections.push(section);
                    }
                }
            }
            FeedbackType::Bias => {
                if let Some(consensus) = ctx.consensus {
                    if let Some(section) = synthesis.sections.first_mut() {
                        let d = consensus.distribution;
                        section.content.push_str(&format!(
                            " Note: {} of {} studies contradict the majority reading and are \
                             weighed in the sections below.",
                            d.contradicting,
                            d.total(),
                        ));
                    }
                }
            }
            FeedbackType::OutdatedSources => {
                let current_year = Utc::now().year();
                let dated = ctx
                    .sources
                    .iter()
                    .filter(|s| s.record.year.map(|y| y < current_year - 5).unwrap_or(true))
                    .count();
                if let Some(section) = synthesis.sections.last_mut() {
                    section.content.push_str(&format!(
                        " {dated} of the cited studies predate the last five years; conclusions \
                         drawn from them should be read with that in mind."
                    ));
                }
            }
            FeedbackType::InsufficientEvidence | FeedbackType::UnsupportedClaim => {
                if let Some(section) = synthesis.sections.last_mut() {
                    section.content.push_str(
                        " Claims above are limited to what the cited designs can support.",
                    );
                }
            }
        }
    }

    synthesis::finalize(synthesis)
}

pub struct ReviewLoop<'a> {
    pub scorer: &'a dyn SynthesisScorer,
    pub quality_threshold: f32,
    pub iteration_limit: u32,
    pub events: &'a EventBus,
    pub session_id: Uuid,
}

impl<'a> ReviewLoop<'a> {
    /// Run the bounded synthesis-review-revise loop.
    pub fn run(&self, synthesis: Synthesis, ctx: &ReviewContext<'_>) -> Synthesis {
        let mut synthesis = synthesis;
        let mut report = self.scorer.score(&synthesis, ctx);
        synthesis.quality_score = report.overall;

        while report.overall < self.quality_threshold
            && synthesis.revision_count < self.iteration_limit
        {
            let feedback = generate_feedback(&report, &synthesis, ctx);
            synthesis.review_feedback.extend(feedback.clone());

            synthesis = revise(synthesis, &feedback, ctx);
            synthesis.revision_count += 1;

            report = self.scorer.score(&synthesis, ctx);
            synthesis.quality_score = report.overall;

            // Feedback whose dimension recovered is resolved; the rest
            // stays visible to the caller.
            for item in synthesis.review_feedback.iter_mut() {
                if !item.resolved && report.dimension(item.feedback_type) >= DIMENSION_BAR {
                    item.resolved = true;
                }
            }

            info!(
                revision = synthesis.revision_count,
                overall = report.overall,
                threshold = self.quality_threshold,
                "Synthesis revised"
            );
            self.events.emit(SessionEvent::SynthesisRevised {
                session_id: self.session_id,
                revision: synthesis.revision_count,
                overall: report.overall,
            });
        }

        synthesis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperloom_common::{CitationGraph, SearchResult, SourceQuality, StudyDesign};

    struct FixedScorer(f32);

    impl SynthesisScorer for FixedScorer {
        fn score(&self, _synthesis: &Synthesis, _ctx: &ReviewContext<'_>) -> QualityReport {
            QualityReport::weighted(self.0, self.0, self.0, self.0, self.0)
        }
    }

    fn source(title: &str, year: i32, ordinal: u32) -> ResearchSource {
        ResearchSource {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            record: SearchResult {
                title: title.to_string(),
                year: Some(year),
                ..Default::default()
            },
            discovered_by: Uuid::new_v4(),
            discovered_at: ordinal,
            relevance_score: 0.5,
            quality: Some(SourceQuality {
                study_design: StudyDesign::RandomizedTrial,
                sample_size: Some(50),
                peer_reviewed: true,
                conflict_of_interest: false,
            }),
            key_findings: vec![format!("{title} finding")],
        }
    }

    fn empty_ctx<'a>(
        perspectives: &'a [paperloom_common::Perspective],
        sources: &'a [ResearchSource],
        graph: &'a CitationGraph,
    ) -> ReviewContext<'a> {
        ReviewContext {
            topic: "topic",
            perspectives,
            sources,
            graph,
            consensus: None,
        }
    }

    #[test]
    fn loop_stops_after_exactly_iteration_limit_revisions() {
        let scorer = FixedScorer(50.0);
        let perspectives = crate::perspectives::generate("topic", 2);
        let sources = vec![source("A", 2023, 0), source("B", 2022, 1)];
        let graph = CitationGraph::default();
        let ctx = empty_ctx(&perspectives, &sources, &graph);
        let events = EventBus::new();

        let review = ReviewLoop {
            scorer: &scorer,
            quality_threshold: 80.0,
            iteration_limit: 2,
            events: &events,
            session_id: Uuid::new_v4(),
        };
        let result = review.run(Synthesis::default(), &ctx);

        assert_eq!(result.revision_count, 2);
        assert_eq!(result.quality_score, 50.0);
        assert!(!result.review_feedback.is_empty());
        assert!(
            result.review_feedback.iter().all(|f| !f.resolved),
            "pinned low scores can never resolve feedback"
        );
    }

    #[test]
    fn meeting_the_threshold_skips_revision_entirely() {
        let scorer = FixedScorer(90.0);
        let perspectives = crate::perspectives::generate("topic", 2);
        let sources = vec![source("A", 2023, 0)];
        let graph = CitationGraph::default();
        let ctx = empty_ctx(&perspectives, &sources, &graph);
        let events = EventBus::new();

        let review = ReviewLoop {
            scorer: &scorer,
            quality_threshold: 80.0,
            iteration_limit: 5,
            events: &events,
            session_id: Uuid::new_v4(),
        };
        let result = review.run(Synthesis::default(), &ctx);

        assert_eq!(result.revision_count, 0);
        assert!(result.review_feedback.is_empty());
        assert_eq!(result.quality_score, 90.0);
    }

    #[test]
    fn missing_coverage_revision_cites_unused_sources() {
        let scorer = HeuristicScorer;
        let perspectives = crate::perspectives::generate("topic", 3);
        let sources = vec![source("A", 2024, 0), source("B", 2024, 1)];
        let graph = CitationGraph::default();
        let ctx = empty_ctx(&perspectives, &sources, &graph);
        let events = EventBus::new();

        let review = ReviewLoop {
            scorer: &scorer,
            quality_threshold: 99.0,
            iteration_limit: 1,
            events: &events,
            session_id: Uuid::new_v4(),
        };
        // Empty draft: nothing cited, coverage is zero.
        let result = review.run(synthesis::finalize(Synthesis::default()), &ctx);

        assert_eq!(result.revision_count, 1);
        let additional = result
            .sections
            .iter()
            .find(|s| s.title == "Additional evidence")
            .expect("revision should add an evidence section");
        assert_eq!(additional.source_ids.len(), 2);
        assert!(result.citation_count >= 2);
    }
}
