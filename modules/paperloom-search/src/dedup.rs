//! Cross-provider deduplication. Two records are the same entity when
//! their normalized DOIs match, or, when at least one side lacks a DOI,
//! when their normalized titles match. Two records carrying different
//! DOIs stay distinct even with identical titles (preprint vs. published
//! version).

use std::collections::HashMap;

use paperloom_common::SearchResult;

/// Lower-case a DOI and strip any resolver prefix. Empty input yields
/// `None`.
pub fn normalize_doi(doi: &str) -> Option<String> {
    let mut doi = doi.trim().to_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi:"] {
        if let Some(tail) = doi.strip_prefix(prefix) {
            doi = tail.to_string();
        }
    }
    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

/// Lower-case, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge `other` into `base`, keeping the best available value per field.
/// `base` is the record from the higher-priority source.
pub fn merge_into(base: &mut SearchResult, other: SearchResult) {
    if base
        .abstract_text
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        base.abstract_text = other.abstract_text;
    }
    base.citation_count = match (base.citation_count, other.citation_count) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    base.open_access = base.open_access || other.open_access;
    if base.pdf_url.is_none() {
        base.pdf_url = other.pdf_url;
    }
    if base.doi.is_none() {
        base.doi = other.doi;
    }
    if base.pmid.is_none() {
        base.pmid = other.pmid;
    }
    if base.year.is_none() {
        base.year = other.year;
    }
    if base.venue.is_none() {
        base.venue = other.venue;
    }
    if base.authors.is_empty() {
        base.authors = other.authors;
    }
    for category in other.categories {
        if !base.categories.contains(&category) {
            base.categories.push(category);
        }
    }
}

/// Deduplicate `records`, which must already be in source-priority order:
/// the first-seen record becomes the merge base. Returns the survivors
/// and the number of successful merges.
pub fn deduplicate(records: Vec<SearchResult>) -> (Vec<SearchResult>, u32) {
    let mut out: Vec<SearchResult> = Vec::with_capacity(records.len());
    let mut by_doi: HashMap<String, usize> = HashMap::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();
    let mut merged = 0u32;

    for record in records {
        let doi = record.doi.as_deref().and_then(normalize_doi);
        let title = normalize_title(&record.title);

        let existing = match &doi {
            Some(doi_key) => by_doi.get(doi_key).copied().or_else(|| {
                // Title match only counts when the existing record has no
                // DOI of its own.
                by_title
                    .get(&title)
                    .copied()
                    .filter(|&i| out[i].doi.is_none())
            }),
            None => by_title.get(&title).copied(),
        };

        match existing {
            Some(index) => {
                merge_into(&mut out[index], record);
                merged += 1;
                // The merge may have given the base a DOI it lacked.
                if let Some(doi_key) = out[index].doi.as_deref().and_then(normalize_doi) {
                    by_doi.entry(doi_key).or_insert(index);
                }
            }
            None => {
                let index = out.len();
                out.push(record);
                if let Some(doi_key) = doi {
                    by_doi.insert(doi_key, index);
                }
                by_title.entry(title).or_insert(index);
            }
        }
    }

    (out, merged)
}
