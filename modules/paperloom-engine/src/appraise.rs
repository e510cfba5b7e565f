//! Heuristic appraisal of a bibliographic record: study design, sample
//! size, key findings, relevance to the session topic. Everything here
//! is lexical: publication-type strings, cue phrases, simple counts.

use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;

use paperloom_common::{SearchResult, SourceQuality, StudyDesign};

/// Map provider publication types and title phrasing onto a study design.
/// Provider categories (PubMed publication types, Semantic Scholar
/// publicationTypes) are checked first; the title is the fallback.
pub fn classify_study_design(record: &SearchResult) -> StudyDesign {
    let categories: Vec<String> = record.categories.iter().map(|c| c.to_lowercase()).collect();
    let title = record.title.to_lowercase();

    let has = |needle: &str| categories.iter().any(|c| c.contains(needle)) || title.contains(needle);

    if has("meta-analysis") || has("metaanalysis") {
        StudyDesign::MetaAnalysis
    } else if has("systematic review") {
        StudyDesign::SystematicReview
    } else if has("randomized controlled trial") || has("randomized trial") || has("randomised") {
        StudyDesign::RandomizedTrial
    } else if has("cohort") {
        StudyDesign::CohortStudy
    } else if has("case-control") || has("case control") {
        StudyDesign::CaseControl
    } else if has("cross-sectional") || has("cross sectional") {
        StudyDesign::CrossSectional
    } else if has("case report") || has("case series") {
        StudyDesign::CaseReport
    } else if record.source == "arxiv" || has("preprint") {
        StudyDesign::Preprint
    } else if has("review") {
        StudyDesign::Review
    } else {
        StudyDesign::Other
    }
}

fn sample_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:n\s*=\s*|a total of\s+)?([0-9][0-9,]{1,8})\s+(?:patients|participants|subjects|individuals|adults|children|respondents|women|men)\b")
            .expect("valid regex")
    })
}

/// Pull a sample size out of the abstract, if one is stated.
pub fn extract_sample_size(abstract_text: &str) -> Option<u32> {
    sample_size_regex()
        .captures_iter(abstract_text)
        .filter_map(|cap| cap[1].replace(',', "").parse::<u32>().ok())
        .max()
}

/// Assemble the quality record for a source.
pub fn assess_quality(record: &SearchResult) -> SourceQuality {
    let study_design = classify_study_design(record);
    let abstract_text = record.abstract_text.as_deref().unwrap_or("");
    let lower = abstract_text.to_lowercase();

    let conflict_of_interest = lower.contains("conflict of interest")
        && !lower.contains("no conflict of interest")
        && !lower.contains("no conflicts of interest")
        && !lower.contains("declare no");

    SourceQuality {
        study_design,
        sample_size: extract_sample_size(abstract_text),
        peer_reviewed: !matches!(study_design, StudyDesign::Preprint),
        conflict_of_interest,
    }
}

const FINDING_CUES: &[&str] = &[
    "we found",
    "we show",
    "results show",
    "results indicate",
    "findings suggest",
    "demonstrate",
    "was associated with",
    "were associated with",
    "significantly",
    "no significant",
    "concluded",
    "conclusion",
];

/// Split text into sentences on `.`/`!`/`?` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).map(|n| n.is_ascii_whitespace()).unwrap_or(true)
        {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Extract up to `limit` short claims from an abstract: sentences carrying
/// a finding cue, clipped to a readable length.
pub fn extract_key_findings(abstract_text: &str, limit: usize) -> Vec<String> {
    let mut findings = Vec::new();
    for sentence in sentences(abstract_text) {
        if findings.len() >= limit {
            break;
        }
        let lower = sentence.to_lowercase();
        if FINDING_CUES.iter().any(|cue| lower.contains(cue)) {
            findings.push(clip(sentence, 220));
        }
    }
    findings
}

fn clip(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Content words of a query or topic: lower-cased, stopwords and short
/// tokens dropped.
pub fn content_terms(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "from", "into", "about", "between", "effect", "effects",
        "does", "can", "are", "was", "were", "that", "this", "their", "have", "has",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

/// Relevance of a record to the session topic, in [0, 1]. Term overlap
/// carries most of the weight; recency and citations nudge it.
pub fn relevance_score(record: &SearchResult, topic_terms: &[String]) -> f32 {
    if topic_terms.is_empty() {
        return 0.5;
    }
    let haystack = format!(
        "{} {}",
        record.title.to_lowercase(),
        record.abstract_text.as_deref().unwrap_or("").to_lowercase()
    );
    let hits = topic_terms
        .iter()
        .filter(|t| haystack.contains(t.as_str()))
        .count();
    let overlap = hits as f32 / topic_terms.len() as f32;

    let current_year = Utc::now().year();
    let recency = match record.year {
        Some(year) if year >= current_year - 3 => 1.0,
        Some(year) if year >= current_year - 10 => 0.6,
        Some(_) => 0.3,
        None => 0.4,
    };
    let citations = match record.citation_count {
        Some(c) if c >= 100 => 1.0,
        Some(c) => c as f32 / 100.0,
        None => 0.2,
    };

    (overlap * 0.6 + recency * 0.2 + citations * 0.2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(categories: &[&str], title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn design_comes_from_categories_before_title() {
        let r = record_with(&["Meta-Analysis"], "Exercise and mood");
        assert_eq!(classify_study_design(&r), StudyDesign::MetaAnalysis);

        let r = record_with(&[], "A randomized trial of exercise");
        assert_eq!(classify_study_design(&r), StudyDesign::RandomizedTrial);

        let r = record_with(&[], "Exercise: a systematic review");
        assert_eq!(classify_study_design(&r), StudyDesign::SystematicReview);
    }

    #[test]
    fn arxiv_records_are_preprints() {
        let mut r = record_with(&[], "Scaling laws");
        r.source = "arxiv".to_string();
        assert_eq!(classify_study_design(&r), StudyDesign::Preprint);
        assert!(!assess_quality(&r).peer_reviewed);
    }

    #[test]
    fn sample_size_takes_the_largest_stated_cohort() {
        let text = "We screened 1,204 patients and randomized 832 participants.";
        assert_eq!(extract_sample_size(text), Some(1204));
        assert_eq!(extract_sample_size("No numbers here."), None);
    }

    #[test]
    fn key_findings_pick_cue_sentences() {
        let text = "Background is long. We found a 23% reduction in events. \
                    Methods were standard. Results indicate benefit persists at one year.";
        let findings = extract_key_findings(text, 3);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].contains("23% reduction"));
    }

    #[test]
    fn relevance_rewards_term_overlap() {
        let terms = content_terms("intermittent fasting glucose");
        let mut on_topic = record_with(&[], "Intermittent fasting improves glucose control");
        on_topic.year = Some(Utc::now().year());
        let off_topic = record_with(&[], "Soil bacteria of the Amazon");

        assert!(relevance_score(&on_topic, &terms) > relevance_score(&off_topic, &terms));
        assert!(relevance_score(&on_topic, &terms) <= 1.0);
    }

    #[test]
    fn declared_conflicts_are_flagged() {
        let mut r = record_with(&[], "Industry-funded trial");
        r.abstract_text =
            Some("The authors report a conflict of interest with the sponsor.".to_string());
        assert!(assess_quality(&r).conflict_of_interest);

        r.abstract_text = Some("The authors declare no conflict of interest.".to_string());
        assert!(!assess_quality(&r).conflict_of_interest);
    }
}
