//! Perspective generation: named angles of inquiry on the topic, each
//! with guiding questions and search strategies. Breadth picks how many
//! are explored concurrently.

use paperloom_common::Perspective;

struct Angle {
    id: &'static str,
    name: &'static str,
    questions: &'static [&'static str],
    strategies: &'static [&'static str],
}

/// Angles are ordered by how often they matter: evidence first, then
/// mechanisms and contradictions, then context. `{}` is replaced with the
/// topic.
const ANGLES: &[Angle] = &[
    Angle {
        id: "evidence",
        name: "Current evidence",
        questions: &[
            "What does the strongest recent evidence say about {}?",
            "Which outcomes of {} are consistently reported?",
            "How large are the reported effects for {}?",
        ],
        strategies: &["{} systematic review", "{} meta-analysis", "{} randomized trial"],
    },
    Angle {
        id: "mechanisms",
        name: "Mechanisms and theory",
        questions: &[
            "What mechanisms are proposed to explain {}?",
            "Which theoretical models frame {}?",
            "What remains unexplained about how {} works?",
        ],
        strategies: &["{} mechanism", "{} pathway model", "{} theoretical framework"],
    },
    Angle {
        id: "contradictions",
        name: "Contradictions and limitations",
        questions: &[
            "Where do studies of {} disagree?",
            "What null or negative results exist for {}?",
            "Which methodological limitations recur in {} research?",
        ],
        strategies: &["{} conflicting results", "{} null results", "{} limitations criticism"],
    },
    Angle {
        id: "applications",
        name: "Applications and practice",
        questions: &[
            "How is {} applied in practice?",
            "What barriers limit adoption of {}?",
            "Which guidelines or standards address {}?",
        ],
        strategies: &["{} clinical practice", "{} implementation", "{} guidelines"],
    },
    Angle {
        id: "populations",
        name: "Populations and context",
        questions: &[
            "How do findings on {} vary across populations?",
            "Which subgroups are under-studied for {}?",
            "Does context change the effect of {}?",
        ],
        strategies: &["{} subgroup analysis", "{} population differences", "{} moderators"],
    },
    Angle {
        id: "history",
        name: "Historical development",
        questions: &[
            "How has research on {} evolved?",
            "Which early findings on {} were later revised?",
        ],
        strategies: &["{} history", "{} early studies", "{} replication"],
    },
    Angle {
        id: "future",
        name: "Open questions",
        questions: &[
            "What are the open research questions about {}?",
            "Which methods could resolve current uncertainty about {}?",
        ],
        strategies: &["{} future research", "{} research gaps", "{} emerging methods"],
    },
];

/// Generate up to `breadth` perspectives for `topic`.
pub fn generate(topic: &str, breadth: usize) -> Vec<Perspective> {
    ANGLES
        .iter()
        .take(breadth.max(1).min(ANGLES.len()))
        .map(|angle| Perspective {
            id: angle.id.to_string(),
            name: angle.name.to_string(),
            guiding_questions: angle
                .questions
                .iter()
                .map(|q| q.replace("{}", topic))
                .collect(),
            search_strategies: angle
                .strategies
                .iter()
                .map(|s| s.replace("{}", topic))
                .collect(),
        })
        .collect()
}
