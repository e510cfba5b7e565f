//! Citation graph construction: pairwise directional relationships
//! between collected sources, scored from shared-claim term overlap plus
//! stance cues. Rule-based; low-confidence candidates are discarded
//! rather than stored.

use std::collections::{HashMap, HashSet};

use tracing::info;
use uuid::Uuid;

use paperloom_common::{
    CitationEdge, CitationGraph, Cluster, EdgeType, PaperNode, ResearchSource,
};

use crate::appraise;

/// Candidate edges below this confidence are dropped.
pub const EDGE_CONFIDENCE_FLOOR: f32 = 0.4;
/// Edges at or above this confidence participate in clustering.
const STRONG_EDGE_CONFIDENCE: f32 = 0.7;
/// Minimum shared-term overlap for a pair to be considered related at all.
const MIN_SHARED_TERMS: usize = 3;

const DISPUTING_CUES: &[&str] = &[
    "no significant",
    "not associated",
    "no effect",
    "failed to",
    "in contrast",
    "however",
    "contradict",
    "inconsistent with",
    "did not replicate",
    "refute",
];

const SUPPORTING_CUES: &[&str] = &[
    "consistent with",
    "supports",
    "confirm",
    "replicate",
    "in line with",
    "corroborate",
    "agreement with",
];

const METHODOLOGY_CUES: &[&str] = &[
    "protocol", "method", "assay", "instrument", "procedure", "framework", "algorithm",
];

const DATA_CUES: &[&str] = &["dataset", "registry", "database", "cohort data", "survey data"];

fn claim_text(source: &ResearchSource) -> String {
    let mut text = source.record.title.clone();
    if let Some(abstract_text) = source.record.abstract_text.as_deref() {
        text.push(' ');
        text.push_str(abstract_text);
    }
    for finding in &source.key_findings {
        text.push(' ');
        text.push_str(finding);
    }
    text.to_lowercase()
}

fn cue_hits(text: &str, cues: &[&str]) -> usize {
    cues.iter().filter(|cue| text.contains(*cue)).count()
}

/// Classify the relationship from the newer source toward the older one.
/// Returns `None` when the pair shares too little to relate.
fn classify_pair(newer: &ResearchSource, older: &ResearchSource) -> Option<CitationEdge> {
    let newer_terms: HashSet<String> =
        appraise::content_terms(&claim_text(newer)).into_iter().collect();
    let older_terms: HashSet<String> =
        appraise::content_terms(&claim_text(older)).into_iter().collect();
    if newer_terms.is_empty() || older_terms.is_empty() {
        return None;
    }

    let shared: Vec<&String> = newer_terms.intersection(&older_terms).collect();
    if shared.len() < MIN_SHARED_TERMS {
        return None;
    }
    let overlap = shared.len() as f32 / newer_terms.len().min(older_terms.len()) as f32;

    let newer_text = claim_text(newer);
    let disputing = cue_hits(&newer_text, DISPUTING_CUES);
    let supporting = cue_hits(&newer_text, SUPPORTING_CUES);
    let methodology = cue_hits(&newer_text, METHODOLOGY_CUES);
    let data = cue_hits(&newer_text, DATA_CUES);

    let (edge_type, cue_bonus) = if disputing > 0 && disputing >= supporting {
        (EdgeType::Disputing, 0.15 * disputing as f32)
    } else if supporting > 0 {
        (EdgeType::Supporting, 0.15 * supporting as f32)
    } else if data > 0 && data >= methodology {
        (EdgeType::Data, 0.1)
    } else if methodology > 0 {
        (EdgeType::Methodology, 0.1)
    } else {
        (EdgeType::Mentioning, 0.0)
    };

    let confidence = (0.25 + overlap * 0.6 + cue_bonus).clamp(0.0, 1.0);
    if confidence < EDGE_CONFIDENCE_FLOOR {
        return None;
    }

    let statement = newer
        .key_findings
        .iter()
        .find(|f| {
            let lower = f.to_lowercase();
            shared.iter().any(|t| lower.contains(t.as_str()))
        })
        .cloned();

    Some(CitationEdge {
        from: newer.id,
        to: older.id,
        edge_type,
        confidence,
        statement,
        context: None,
    })
}

/// Order a pair so `from` is the newer publication; undated sources are
/// treated as newest.
fn orient<'a>(
    a: &'a ResearchSource,
    b: &'a ResearchSource,
) -> (&'a ResearchSource, &'a ResearchSource) {
    let year_a = a.record.year.unwrap_or(i32::MAX);
    let year_b = b.record.year.unwrap_or(i32::MAX);
    if year_a >= year_b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Build the full graph for the session's collected sources.
pub fn build_graph(sources: &[ResearchSource]) -> CitationGraph {
    let nodes: Vec<PaperNode> = sources
        .iter()
        .map(|s| PaperNode {
            id: s.id,
            title: s.record.title.clone(),
            authors: s.record.authors.iter().map(|a| a.name.clone()).collect(),
            year: s.record.year,
            citation_count: s.record.citation_count,
            source: s.record.source.clone(),
        })
        .collect();

    let mut edges = Vec::new();
    for i in 0..sources.len() {
        for j in (i + 1)..sources.len() {
            let (newer, older) = orient(&sources[i], &sources[j]);
            if let Some(edge) = classify_pair(newer, older) {
                edges.push(edge);
            }
        }
    }

    let clusters = find_clusters(sources, &edges);
    info!(
        nodes = nodes.len(),
        edges = edges.len(),
        clusters = clusters.len(),
        "Citation graph built"
    );

    CitationGraph {
        nodes,
        edges,
        clusters,
    }
}

/// Connected components over strong edges, labelled by their most common
/// title term.
fn find_clusters(sources: &[ResearchSource], edges: &[CitationEdge]) -> Vec<Cluster> {
    let ids: Vec<Uuid> = sources.iter().map(|s| s.id).collect();
    let index: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // Union-find over strong edges.
    let mut parent: Vec<usize> = (0..ids.len()).collect();
    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let root = find(parent, parent[i]);
            parent[i] = root;
        }
        parent[i]
    }
    for edge in edges.iter().filter(|e| e.confidence >= STRONG_EDGE_CONFIDENCE) {
        let (Some(&a), Some(&b)) = (index.get(&edge.from), index.get(&edge.to)) else {
            continue;
        };
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        if ra != rb {
            parent[ra] = rb;
        }
    }

    let mut components: HashMap<usize, Vec<Uuid>> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = find(&mut parent, i);
        components.entry(root).or_default().push(*id);
    }

    let mut clusters: Vec<Cluster> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|mut members| {
            members.sort();
            let mut term_counts: HashMap<String, u32> = HashMap::new();
            for id in &members {
                if let Some(source) = sources.iter().find(|s| s.id == *id) {
                    for term in appraise::content_terms(&source.record.title) {
                        *term_counts.entry(term).or_insert(0) += 1;
                    }
                }
            }
            let label = term_counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(term, _)| term)
                .unwrap_or_else(|| "related work".to_string());
            Cluster { label, members }
        })
        .collect();
    clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperloom_common::{SearchResult, SourceQuality, StudyDesign};

    fn source(title: &str, abstract_text: &str, year: i32) -> ResearchSource {
        let record = SearchResult {
            id: title.to_string(),
            source: "mock".to_string(),
            title: title.to_string(),
            abstract_text: Some(abstract_text.to_string()),
            year: Some(year),
            ..Default::default()
        };
        ResearchSource {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            key_findings: appraise::extract_key_findings(abstract_text, 3),
            quality: Some(SourceQuality {
                study_design: StudyDesign::Other,
                sample_size: None,
                peer_reviewed: true,
                conflict_of_interest: false,
            }),
            relevance_score: 0.5,
            discovered_by: Uuid::new_v4(),
            discovered_at: 0,
            record,
        }
    }

    #[test]
    fn disputing_cues_produce_disputing_edge_from_newer_to_older() {
        let older = source(
            "Vitamin D supplementation reduces fracture risk",
            "We found vitamin d supplementation reduces fracture risk in older adults.",
            2015,
        );
        let newer = source(
            "Vitamin D supplementation and fracture risk revisited",
            "In contrast to earlier reports, vitamin d supplementation showed no significant \
             effect on fracture risk in older adults.",
            2022,
        );

        let graph = build_graph(&[older.clone(), newer.clone()]);
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.edge_type, EdgeType::Disputing);
        assert_eq!(edge.from, newer.id);
        assert_eq!(edge.to, older.id);
        assert!(edge.confidence >= EDGE_CONFIDENCE_FLOOR);
    }

    #[test]
    fn supporting_cues_produce_supporting_edge() {
        let older = source(
            "Exercise improves depression outcomes",
            "We found exercise improves depression outcomes.",
            2018,
        );
        let newer = source(
            "Replication: exercise and depression outcomes",
            "Our results are consistent with prior work: exercise improves depression outcomes.",
            2023,
        );

        let graph = build_graph(&[older, newer]);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].edge_type, EdgeType::Supporting);
    }

    #[test]
    fn unrelated_sources_get_no_edge() {
        let a = source(
            "Soil bacteria diversity in rainforests",
            "We catalogued rainforest soil bacteria.",
            2020,
        );
        let b = source(
            "Quantum error correction codes",
            "We propose a quantum error correction scheme.",
            2021,
        );

        let graph = build_graph(&[a, b]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn strong_components_become_labelled_clusters() {
        let a = source(
            "Sleep deprivation impairs memory consolidation",
            "Results show sleep deprivation impairs memory consolidation in adults. \
             Our findings are consistent with memory consolidation models.",
            2019,
        );
        let b = source(
            "Sleep deprivation and memory consolidation: a replication",
            "Consistent with prior work, sleep deprivation impairs memory consolidation in adults.",
            2021,
        );
        let c = source(
            "Unrelated agronomy paper",
            "We measured wheat yields.",
            2020,
        );

        let graph = build_graph(&[a, b, c]);
        if let Some(cluster) = graph.clusters.first() {
            assert!(cluster.members.len() >= 2);
            assert!(!cluster.label.is_empty());
        }
        // The agronomy paper never joins a cluster with the sleep papers.
        for cluster in &graph.clusters {
            assert!(cluster.members.len() >= 2);
        }
    }
}
