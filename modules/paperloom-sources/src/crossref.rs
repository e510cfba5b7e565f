//! Crossref REST works API. Abstracts come wrapped in JATS markup, which
//! is stripped to plain text.

use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::{normalize_ws, strip_doi_prefix};

const WORKS_URL: &str = "https://api.crossref.org/works";

pub struct CrossrefAdapter {
    http: Http,
    mailto: Option<String>,
}

impl CrossrefAdapter {
    pub fn new(http: Http, mailto: Option<String>) -> Self {
        Self { http, mailto }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(rename = "total-results", default)]
    total_results: u32,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<ItemAuthor>,
    issued: Option<DateParts>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u32>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    license: Vec<License>,
}

#[derive(Debug, Deserialize)]
struct ItemAuthor {
    given: Option<String>,
    family: Option<String>,
    #[serde(rename = "ORCID")]
    orcid: Option<String>,
    #[serde(default)]
    affiliation: Vec<Affiliation>,
}

#[derive(Debug, Deserialize)]
struct Affiliation {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateParts {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
struct License {
    #[serde(rename = "URL")]
    url: Option<String>,
}

fn jats_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?jats:[^>]+>|</?[a-zA-Z][^>]*>").expect("valid regex"))
}

fn parse_item(item: Item) -> Option<SearchResult> {
    let title = normalize_ws(item.title.first()?);
    if title.is_empty() {
        return None;
    }

    let authors: Vec<Author> = item
        .author
        .into_iter()
        .filter_map(|a| {
            let name = match (&a.given, &a.family) {
                (Some(given), Some(family)) => format!("{given} {family}"),
                (None, Some(family)) => family.clone(),
                (Some(given), None) => given.clone(),
                (None, None) => return None,
            };
            Some(Author {
                name,
                first: a.given,
                last: a.family,
                affiliations: a.affiliation.into_iter().filter_map(|x| x.name).collect(),
                orcid: a
                    .orcid
                    .map(|o| o.rsplit('/').next().unwrap_or(&o).to_string()),
            })
        })
        .collect();

    let year = item
        .issued
        .and_then(|d| d.date_parts.first().and_then(|p| p.first().copied()));

    // No OA flag in the works payload; a Creative Commons license is the
    // usual proxy.
    let open_access = item.license.iter().any(|l| {
        l.url
            .as_deref()
            .map(|u| u.contains("creativecommons.org"))
            .unwrap_or(false)
    });

    let abstract_text = item
        .abstract_text
        .map(|a| normalize_ws(&jats_regex().replace_all(&a, " ")))
        .filter(|a| !a.is_empty());

    let doi = item.doi.map(|d| strip_doi_prefix(&d));
    Some(SearchResult {
        id: doi.clone().unwrap_or_default(),
        source: "crossref".to_string(),
        title,
        authors,
        abstract_text,
        year,
        doi,
        pmid: None,
        citation_count: item.is_referenced_by_count,
        open_access,
        // The works payload links to the landing page, not a PDF.
        pdf_url: None,
        venue: item.container_title.into_iter().next().filter(|v| !v.is_empty()),
        categories: Vec::new(),
    })
}

#[async_trait]
impl SourceAdapter for CrossrefAdapter {
    fn id(&self) -> &'static str {
        "crossref"
    }

    fn name(&self) -> &'static str {
        "Crossref"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let mut url =
            Url::parse(WORKS_URL).map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("query", &query.query)
            .append_pair("rows", &limit.to_string())
            .append_pair("offset", &query.offset.to_string());

        let mut filters = Vec::new();
        if let Some(range) = query.year_range {
            filters.push(format!("from-pub-date:{}-01-01", range.from));
            filters.push(format!("until-pub-date:{}-12-31", range.to));
        }
        if !filters.is_empty() {
            url.query_pairs_mut().append_pair("filter", &filters.join(","));
        }
        if let Some(ref mailto) = self.mailto {
            url.query_pairs_mut().append_pair("mailto", mailto);
        }

        let envelope: Envelope = self.http.get_json(self.id(), url).await?;
        let mut results: Vec<SearchResult> = envelope
            .message
            .items
            .into_iter()
            .filter_map(parse_item)
            .collect();
        // Crossref has no open-access filter parameter worth trusting.
        if query.open_access_only {
            results.retain(|r| r.open_access);
        }

        Ok(ProviderResponse {
            results,
            total: envelope.message.total_results,
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SearchResult>, PaperloomError> {
        #[derive(Debug, Deserialize)]
        struct SingleEnvelope {
            message: Item,
        }

        let mut url = Url::parse(&format!("{WORKS_URL}/{id}"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        if let Some(ref mailto) = self.mailto {
            url.query_pairs_mut().append_pair("mailto", mailto);
        }

        let envelope: SingleEnvelope = self.http.get_json(self.id(), url).await?;
        Ok(parse_item(envelope.message))
    }

    fn supports_citation_count(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_parses_year_license_and_jats_abstract() {
        let raw = serde_json::json!({
            "DOI": "10.1038/s41586-020-2649-2",
            "title": ["Array programming with NumPy"],
            "author": [{
                "given": "Charles",
                "family": "Harris",
                "ORCID": "http://orcid.org/0000-0003-0000-0000",
                "affiliation": [{"name": "UC Berkeley"}]
            }],
            "issued": {"date-parts": [[2020, 9]]},
            "container-title": ["Nature"],
            "is-referenced-by-count": 5000,
            "abstract": "<jats:p>Array programming  is fundamental.</jats:p>",
            "license": [{"URL": "http://creativecommons.org/licenses/by/4.0/"}],
            "URL": "http://dx.doi.org/10.1038/s41586-020-2649-2"
        });
        let item: Item = serde_json::from_value(raw).unwrap();
        let record = parse_item(item).expect("parseable");

        assert_eq!(record.year, Some(2020));
        assert!(record.open_access);
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("Array programming is fundamental.")
        );
        assert_eq!(record.authors[0].last.as_deref(), Some("Harris"));
        assert_eq!(record.venue.as_deref(), Some("Nature"));
    }

    #[test]
    fn untitled_item_is_dropped() {
        let raw = serde_json::json!({ "DOI": "10.1/x", "title": [] });
        let item: Item = serde_json::from_value(raw).unwrap();
        assert!(parse_item(item).is_none());
    }
}
