//! Consensus calculation: stance tally across collected sources and a
//! rigor-based confidence label. The study-count cutoffs are configurable
//! constants, validated by the monotonicity property rather than exact
//! boundary values.

use std::collections::HashMap;

use chrono::{Datelike, Utc};

use paperloom_common::{
    ConfidenceLevel, ConsensusData, EvidenceMetrics, QuestionType, ResearchSource,
    StanceDistribution, StudyDesign, StudyTypeBreakdown,
};

/// `high` needs randomized or meta-analytic evidence and at least this
/// many studies.
pub const HIGH_MIN_STUDIES: u32 = 20;
/// `moderate` needs randomized evidence and at least this many studies.
pub const MODERATE_MIN_STUDIES: u32 = 10;
/// Below this, evidence is `very_low` regardless of design.
pub const LOW_MIN_STUDIES: u32 = 3;

/// Publications within this many years count as recent.
const RECENT_WINDOW_YEARS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stance {
    Supporting,
    Neutral,
    Contradicting,
}

const SUPPORT_CUES: &[&str] = &[
    "significant improvement",
    "significantly improved",
    "significantly reduced",
    "effective",
    "beneficial",
    "supports",
    "confirm",
    "reduced risk",
    "improved",
    "benefit",
    "positive association",
];

const CONTRADICT_CUES: &[&str] = &[
    "no significant",
    "no effect",
    "not associated",
    "no association",
    "ineffective",
    "failed to",
    "no benefit",
    "no difference",
    "adverse",
    "harmful",
    "worse outcomes",
];

/// Heuristic stance of one source toward the session question.
fn stance_for(source: &ResearchSource) -> Stance {
    let mut text = source
        .record
        .abstract_text
        .clone()
        .unwrap_or_default()
        .to_lowercase();
    for finding in &source.key_findings {
        text.push(' ');
        text.push_str(&finding.to_lowercase());
    }
    if text.trim().is_empty() {
        return Stance::Neutral;
    }

    let support = SUPPORT_CUES.iter().filter(|c| text.contains(*c)).count();
    let contradict = CONTRADICT_CUES.iter().filter(|c| text.contains(*c)).count();

    if contradict > support {
        Stance::Contradicting
    } else if support > contradict {
        Stance::Supporting
    } else {
        Stance::Neutral
    }
}

/// Normalize raw counts to integer percentages summing to exactly 100,
/// with the rounding remainder apportioned to the largest bucket. An
/// all-zero input stays all-zero.
pub fn consensus_percentages(distribution: &StanceDistribution) -> StanceDistribution {
    let total = distribution.total();
    if total == 0 {
        return StanceDistribution::default();
    }

    let mut supporting = distribution.supporting * 100 / total;
    let mut neutral = distribution.neutral * 100 / total;
    let mut contradicting = distribution.contradicting * 100 / total;

    let remainder = 100 - (supporting + neutral + contradicting);
    // Largest raw bucket absorbs the remainder; ties go to supporting,
    // then neutral.
    if distribution.supporting >= distribution.neutral
        && distribution.supporting >= distribution.contradicting
    {
        supporting += remainder;
    } else if distribution.neutral >= distribution.contradicting {
        neutral += remainder;
    } else {
        contradicting += remainder;
    }

    StanceDistribution {
        supporting,
        neutral,
        contradicting,
    }
}

/// Confidence is a monotonic function of study-design rigor and total
/// study count, never of the raw consensus percentage.
pub fn classify_confidence(
    has_rcts: bool,
    has_meta_analyses: bool,
    total_studies: u32,
) -> (ConfidenceLevel, String) {
    let has_rigorous = has_rcts || has_meta_analyses;
    if has_rigorous && total_studies >= HIGH_MIN_STUDIES {
        (
            ConfidenceLevel::High,
            format!("randomized or meta-analytic evidence across {total_studies} studies"),
        )
    } else if has_rigorous && total_studies >= MODERATE_MIN_STUDIES {
        (
            ConfidenceLevel::Moderate,
            format!("randomized evidence, but only {total_studies} studies"),
        )
    } else if total_studies >= LOW_MIN_STUDIES {
        (
            ConfidenceLevel::Low,
            format!("{total_studies} studies without randomized evidence"),
        )
    } else {
        (
            ConfidenceLevel::VeryLow,
            format!("only {total_studies} low-rigor studies"),
        )
    }
}

fn infer_question_type(question: &str) -> QuestionType {
    const YES_NO_OPENERS: &[&str] = &[
        "is ", "are ", "does ", "do ", "can ", "should ", "will ", "has ", "have ",
    ];
    let lower = question.to_lowercase();
    if YES_NO_OPENERS.iter().any(|o| lower.starts_with(o)) {
        QuestionType::YesNo
    } else {
        QuestionType::Categorical
    }
}

/// Aggregate stance, per-design breakdown, evidence metrics, and a
/// confidence label for the collected sources.
pub fn calculate(question: &str, sources: &[ResearchSource]) -> ConsensusData {
    let mut distribution = StanceDistribution::default();
    let mut by_design: HashMap<StudyDesign, StanceDistribution> = HashMap::new();
    let mut total_sample_size: u64 = 0;
    let mut rigor_sum: u32 = 0;
    let mut recent = 0u32;
    let current_year = Utc::now().year();

    for source in sources {
        let stance = stance_for(source);
        let design = source
            .quality
            .map(|q| q.study_design)
            .unwrap_or(StudyDesign::Other);

        let bucket = by_design.entry(design).or_default();
        match stance {
            Stance::Supporting => {
                distribution.supporting += 1;
                bucket.supporting += 1;
            }
            Stance::Neutral => {
                distribution.neutral += 1;
                bucket.neutral += 1;
            }
            Stance::Contradicting => {
                distribution.contradicting += 1;
                bucket.contradicting += 1;
            }
        }

        rigor_sum += design.rigor() as u32;
        if let Some(quality) = source.quality {
            total_sample_size += quality.sample_size.unwrap_or(0) as u64;
        }
        if source
            .record
            .year
            .map(|y| y >= current_year - RECENT_WINDOW_YEARS)
            .unwrap_or(false)
        {
            recent += 1;
        }
    }

    let total_studies = sources.len() as u32;
    let has_rcts = by_design.contains_key(&StudyDesign::RandomizedTrial);
    let has_meta_analyses = by_design.contains_key(&StudyDesign::MetaAnalysis)
        || by_design.contains_key(&StudyDesign::SystematicReview);
    let (confidence, confidence_reason) =
        classify_confidence(has_rcts, has_meta_analyses, total_studies);

    let mut breakdown: Vec<StudyTypeBreakdown> = by_design
        .into_iter()
        .map(|(design, distribution)| StudyTypeBreakdown {
            design,
            distribution,
        })
        .collect();
    breakdown.sort_by(|a, b| b.design.rigor().cmp(&a.design.rigor()));

    ConsensusData {
        question: question.to_string(),
        question_type: infer_question_type(question),
        distribution,
        breakdown,
        confidence,
        confidence_reason,
        total_studies,
        metrics: EvidenceMetrics {
            has_rcts,
            has_meta_analyses,
            average_study_quality: if total_studies > 0 {
                rigor_sum as f32 / total_studies as f32
            } else {
                0.0
            },
            total_sample_size,
            recent_studies_count: recent,
        },
    }
}
