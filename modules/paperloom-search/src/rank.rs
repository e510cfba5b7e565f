//! Composite relevance ranking for merged result sets.

use chrono::{Datelike, Utc};

use paperloom_common::SearchResult;

/// Weight for each query term found in the title.
const TITLE_TERM_WEIGHT: f32 = 2.0;
/// Weight applied to ln(1 + citations).
const CITATION_WEIGHT: f32 = 0.5;
/// Bonus for publication within the last three years.
const RECENCY_BONUS: f32 = 1.0;
const RECENCY_WINDOW_YEARS: i32 = 3;
const OPEN_ACCESS_BONUS: f32 = 0.25;

/// Query terms used for title scoring: lower-cased, short stopwords
/// dropped.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(String::from)
        .collect()
}

pub fn score(record: &SearchResult, terms: &[String], current_year: i32) -> f32 {
    let title = record.title.to_lowercase();
    let mut score = 0.0;

    for term in terms {
        if title.contains(term.as_str()) {
            score += TITLE_TERM_WEIGHT;
        }
    }
    if let Some(citations) = record.citation_count {
        score += (1.0 + citations as f32).ln() * CITATION_WEIGHT;
    }
    if let Some(year) = record.year {
        if year >= current_year - RECENCY_WINDOW_YEARS {
            score += RECENCY_BONUS;
        }
    }
    if record.open_access {
        score += OPEN_ACCESS_BONUS;
    }
    score
}

/// Sort `records` by composite score descending. Ties break by citation
/// count descending, then year descending, keeping the ordering stable
/// across runs on identical input.
pub fn rank(records: &mut [SearchResult], query: &str) {
    let terms = query_terms(query);
    let current_year = Utc::now().year();
    records.sort_by(|a, b| {
        let score_a = score(a, &terms, current_year);
        let score_b = score(b, &terms, current_year);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.citation_count.unwrap_or(0).cmp(&a.citation_count.unwrap_or(0)))
            .then_with(|| b.year.unwrap_or(0).cmp(&a.year.unwrap_or(0)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, citations: Option<u32>, year: Option<i32>, oa: bool) -> SearchResult {
        SearchResult {
            id: title.to_string(),
            title: title.to_string(),
            citation_count: citations,
            year,
            open_access: oa,
            ..Default::default()
        }
    }

    #[test]
    fn title_term_hits_dominate() {
        let current_year = Utc::now().year();
        let terms = query_terms("transformer attention");

        let on_topic = record("Attention and the transformer", None, None, false);
        let off_topic = record("Unrelated botany paper", Some(50), Some(current_year), true);

        assert!(
            score(&on_topic, &terms, current_year) > score(&off_topic, &terms, current_year),
            "two term hits should outrank citations plus recency plus OA"
        );
    }

    #[test]
    fn recency_window_is_three_years() {
        let terms: Vec<String> = Vec::new();
        let recent = record("a", None, Some(2024), false);
        let old = record("b", None, Some(2015), false);
        assert!(score(&recent, &terms, 2026) > score(&old, &terms, 2026));
        // boundary year still counts
        assert!(score(&record("c", None, Some(2023), false), &terms, 2026) > 0.0);
    }

    #[test]
    fn ties_break_by_citations_then_year() {
        // Years far enough in the past that the recency bonus never
        // applies, so all three score identically on the composite.
        let mut records = vec![
            record("same", Some(5), Some(1995), false),
            record("same", Some(5), Some(1999), false),
            record("same", Some(5), Some(1991), false),
        ];
        rank(&mut records, "zzz");
        assert_eq!(records[0].year, Some(1999));
        assert_eq!(records[1].year, Some(1995));
        assert_eq!(records[2].year, Some(1991));
    }
}
