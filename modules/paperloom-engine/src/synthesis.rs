//! Synthesis assembly: a sectioned narrative over the collected sources,
//! with per-section source and perspective links and numeric citation
//! markers keyed by discovery order.

use std::collections::HashMap;

use paperloom_common::{
    CitationGraph, ConsensusData, EdgeType, ExplorationTree, Perspective, ResearchSource,
    StudyDesign, Synthesis, SynthesisSection,
};

use crate::consensus;

/// Sources cited per perspective section.
const SOURCES_PER_SECTION: usize = 8;
/// Disputes surfaced in the contention section.
const MAX_CONTENTIONS: usize = 5;

pub struct ComposeInput<'a> {
    pub topic: &'a str,
    pub perspectives: &'a [Perspective],
    pub sources: &'a [ResearchSource],
    pub tree: &'a ExplorationTree,
    pub graph: &'a CitationGraph,
    pub consensus: Option<&'a ConsensusData>,
}

/// Citation marker (1-based) for each source, in discovery order.
pub fn citation_markers(sources: &[ResearchSource]) -> HashMap<uuid::Uuid, usize> {
    let mut ordered: Vec<&ResearchSource> = sources.iter().collect();
    ordered.sort_by_key(|s| s.discovered_at);
    ordered
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i + 1))
        .collect()
}

fn overview_section(input: &ComposeInput<'_>) -> SynthesisSection {
    let databases: Vec<&str> = {
        let mut seen = Vec::new();
        for source in input.sources {
            let name = source.record.source.as_str();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    };

    let mut content = format!(
        "This synthesis reviews {} sources on \"{}\" collected from {} database(s): {}.",
        input.sources.len(),
        input.topic,
        databases.len(),
        databases.join(", "),
    );
    if let Some(consensus) = input.consensus {
        let pct = consensus::consensus_percentages(&consensus.distribution);
        content.push_str(&format!(
            " Across {} studies the evidence distribution is {}% supporting, {}% neutral, \
             and {}% contradicting (confidence: {}; {}).",
            consensus.total_studies,
            pct.supporting,
            pct.neutral,
            pct.contradicting,
            consensus.confidence,
            consensus.confidence_reason,
        ));
    }

    SynthesisSection {
        title: "Overview".to_string(),
        content,
        source_ids: Vec::new(),
        perspective_ids: Vec::new(),
    }
}

fn perspective_section(
    perspective: &Perspective,
    input: &ComposeInput<'_>,
    markers: &HashMap<uuid::Uuid, usize>,
) -> Option<SynthesisSection> {
    // Sources reached through this perspective's branch of the tree.
    let node_source_ids: Vec<uuid::Uuid> = input
        .tree
        .nodes
        .values()
        .filter(|n| n.perspective_id.as_deref() == Some(perspective.id.as_str()))
        .flat_map(|n| n.source_ids.iter().copied())
        .collect();

    let mut cited: Vec<&ResearchSource> = input
        .sources
        .iter()
        .filter(|s| node_source_ids.contains(&s.id))
        .collect();
    if cited.is_empty() {
        return None;
    }
    cited.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    cited.truncate(SOURCES_PER_SECTION);

    let mut content = format!("{}.", perspective.name);
    for source in &cited {
        let marker = markers.get(&source.id).copied().unwrap_or(0);
        let claim = source
            .key_findings
            .first()
            .cloned()
            .unwrap_or_else(|| source.record.title.clone());
        let claim = claim.trim_end_matches('.');
        content.push_str(&format!(" {claim} [{marker}]."));
    }

    Some(SynthesisSection {
        title: perspective.name.clone(),
        content,
        source_ids: cited.iter().map(|s| s.id).collect(),
        perspective_ids: vec![perspective.id.clone()],
    })
}

pub fn contention_section(
    graph: &CitationGraph,
    sources: &[ResearchSource],
    markers: &HashMap<uuid::Uuid, usize>,
) -> Option<SynthesisSection> {
    let mut disputes: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Disputing)
        .collect();
    if disputes.is_empty() {
        return None;
    }
    disputes.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    disputes.truncate(MAX_CONTENTIONS);

    let title_of = |id: uuid::Uuid| {
        sources
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.record.title.clone())
            .unwrap_or_else(|| "an earlier study".to_string())
    };

    let mut content = String::from("The collected evidence is not uniform.");
    let mut source_ids = Vec::new();
    for edge in &disputes {
        let from_marker = markers.get(&edge.from).copied().unwrap_or(0);
        let to_marker = markers.get(&edge.to).copied().unwrap_or(0);
        content.push_str(&format!(
            " \"{}\" [{}] disputes \"{}\" [{}]",
            title_of(edge.from),
            from_marker,
            title_of(edge.to),
            to_marker,
        ));
        if let Some(statement) = &edge.statement {
            content.push_str(&format!(": {}", statement.trim_end_matches('.')));
        }
        content.push('.');
        for id in [edge.from, edge.to] {
            if !source_ids.contains(&id) {
                source_ids.push(id);
            }
        }
    }

    Some(SynthesisSection {
        title: "Points of contention".to_string(),
        content,
        source_ids,
        perspective_ids: Vec::new(),
    })
}

fn evidence_base_section(sources: &[ResearchSource]) -> SynthesisSection {
    let mut design_counts: HashMap<StudyDesign, usize> = HashMap::new();
    let mut total_sample: u64 = 0;
    for source in sources {
        if let Some(quality) = source.quality {
            *design_counts.entry(quality.study_design).or_insert(0) += 1;
            total_sample += quality.sample_size.unwrap_or(0) as u64;
        }
    }
    let mut designs: Vec<(StudyDesign, usize)> = design_counts.into_iter().collect();
    designs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.rigor().cmp(&a.0.rigor())));

    let tally = designs
        .iter()
        .map(|(design, count)| format!("{count} {design}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut content = format!("The evidence base comprises {tally}.");
    if total_sample > 0 {
        content.push_str(&format!(
            " Reported samples cover roughly {total_sample} participants in total."
        ));
    }

    SynthesisSection {
        title: "Evidence base".to_string(),
        content,
        source_ids: Vec::new(),
        perspective_ids: Vec::new(),
    }
}

/// Assemble the first-draft synthesis. Quality scoring and revision
/// happen in the review loop.
pub fn compose(input: &ComposeInput<'_>) -> Synthesis {
    let markers = citation_markers(input.sources);

    let mut sections = vec![overview_section(input)];
    for perspective in input.perspectives {
        if let Some(section) = perspective_section(perspective, input, &markers) {
            sections.push(section);
        }
    }
    if let Some(section) = contention_section(input.graph, input.sources, &markers) {
        sections.push(section);
    }
    if !input.sources.is_empty() {
        sections.push(evidence_base_section(input.sources));
    }

    finalize(Synthesis {
        sections,
        ..Default::default()
    })
}

/// Recompute derived fields after any structural change.
pub fn finalize(mut synthesis: Synthesis) -> Synthesis {
    let mut content = String::new();
    let mut cited: Vec<uuid::Uuid> = Vec::new();
    for section in &synthesis.sections {
        content.push_str("## ");
        content.push_str(&section.title);
        content.push_str("\n\n");
        content.push_str(&section.content);
        content.push_str("\n\n");
        for id in &section.source_ids {
            if !cited.contains(id) {
                cited.push(*id);
            }
        }
    }
    synthesis.word_count = content.split_whitespace().count() as u32;
    synthesis.citation_count = cited.len() as u32;
    synthesis.content = content;
    synthesis
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperloom_common::{ExplorationNode, SearchResult};
    use uuid::Uuid;

    fn source(title: &str, ordinal: u32) -> ResearchSource {
        ResearchSource {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            record: SearchResult {
                title: title.to_string(),
                source: "mock".to_string(),
                abstract_text: Some("We found improvement.".to_string()),
                year: Some(2023),
                ..Default::default()
            },
            discovered_by: Uuid::new_v4(),
            discovered_at: ordinal,
            relevance_score: 0.8,
            quality: None,
            key_findings: vec!["We found improvement".to_string()],
        }
    }

    #[test]
    fn markers_follow_discovery_order() {
        let a = source("First", 0);
        let b = source("Second", 1);
        let markers = citation_markers(&[b.clone(), a.clone()]);
        assert_eq!(markers[&a.id], 1);
        assert_eq!(markers[&b.id], 2);
    }

    #[test]
    fn compose_links_sections_to_perspectives_and_sources() {
        let topic = "exercise and mood";
        let perspectives = crate::perspectives::generate(topic, 2);

        let mut tree = ExplorationTree::new(ExplorationNode::new(topic, 0));
        let mut node = ExplorationNode::new("exercise and mood: current evidence", 1);
        node.perspective_id = Some("evidence".to_string());
        let node_id = tree.attach(tree.root_id, node);

        let mut src = source("Exercise improves mood", 0);
        src.discovered_by = node_id;
        if let Some(n) = tree.nodes.get_mut(&node_id) {
            n.source_ids.push(src.id);
        }

        let sources = vec![src.clone()];
        let input = ComposeInput {
            topic,
            perspectives: &perspectives,
            sources: &sources,
            tree: &tree,
            graph: &CitationGraph::default(),
            consensus: None,
        };
        let synthesis = compose(&input);

        assert!(synthesis.word_count > 0);
        assert_eq!(synthesis.citation_count, 1);
        let evidence_section = synthesis
            .sections
            .iter()
            .find(|s| s.perspective_ids.contains(&"evidence".to_string()))
            .expect("evidence perspective section");
        assert!(evidence_section.source_ids.contains(&src.id));
        assert!(evidence_section.content.contains("[1]"));
        // mechanisms perspective found nothing, so no empty section
        assert!(!synthesis
            .sections
            .iter()
            .any(|s| s.perspective_ids.contains(&"mechanisms".to_string())));
    }
}
