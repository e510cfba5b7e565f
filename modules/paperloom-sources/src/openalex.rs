//! OpenAlex works API. Abstracts arrive as an inverted index and are
//! reconstructed; DOIs arrive as resolver URLs and are stripped.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::{normalize_ws, strip_doi_prefix};

const WORKS_URL: &str = "https://api.openalex.org/works";

const SELECT: &str = "id,display_name,publication_year,primary_location,authorships,doi,cited_by_count,open_access,abstract_inverted_index";

pub struct OpenAlexAdapter {
    http: Http,
    mailto: Option<String>,
}

impl OpenAlexAdapter {
    pub fn new(http: Http, mailto: Option<String>) -> Self {
        Self { http, mailto }
    }

    fn apply_common_params(&self, url: &mut Url) {
        url.query_pairs_mut().append_pair("select", SELECT);
        if let Some(ref mailto) = self.mailto {
            url.query_pairs_mut().append_pair("mailto", mailto);
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorksEnvelope {
    meta: Option<Meta>,
    results: Option<Vec<Work>>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    cited_by_count: Option<u32>,
    primary_location: Option<Location>,
    open_access: Option<OpenAccess>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<u32>>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    pdf_url: Option<String>,
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    #[serde(default)]
    is_oa: bool,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<WorkAuthor>,
    #[serde(default)]
    institutions: Vec<Institution>,
}

#[derive(Debug, Deserialize)]
struct WorkAuthor {
    display_name: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Institution {
    display_name: Option<String>,
}

/// Reconstruct a best-effort abstract from OpenAlex's token -> positions
/// map, deterministically.
fn inverted_index_to_text(inv: &BTreeMap<String, Vec<u32>>) -> String {
    let mut positions: BTreeMap<u32, &str> = BTreeMap::new();
    for (token, ps) in inv {
        for p in ps {
            positions.entry(*p).or_insert(token.as_str());
        }
    }
    let mut out = String::new();
    for (_p, token) in positions {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

fn parse_work(work: Work) -> Option<SearchResult> {
    let title = normalize_ws(&work.display_name?);
    if title.is_empty() {
        return None;
    }

    // Work ids look like "https://openalex.org/W2741809807"
    let id = work
        .id
        .as_deref()
        .map(|i| i.rsplit('/').next().unwrap_or(i).to_string())
        .unwrap_or_default();

    let authors: Vec<Author> = work
        .authorships
        .into_iter()
        .filter_map(|a| {
            let author = a.author?;
            let name = author.display_name?;
            if name.trim().is_empty() {
                return None;
            }
            let mut parsed = Author::from_name(&name);
            parsed.orcid = author
                .orcid
                .map(|o| o.rsplit('/').next().unwrap_or(&o).to_string());
            parsed.affiliations = a
                .institutions
                .into_iter()
                .filter_map(|i| i.display_name)
                .collect();
            Some(parsed)
        })
        .collect();

    let venue = work
        .primary_location
        .as_ref()
        .and_then(|l| l.source.as_ref())
        .and_then(|s| s.display_name.clone());
    let pdf_url = work.primary_location.and_then(|l| l.pdf_url);

    Some(SearchResult {
        id,
        source: "openalex".to_string(),
        title,
        authors,
        abstract_text: work
            .abstract_inverted_index
            .map(|inv| inverted_index_to_text(&inv))
            .filter(|a| !a.is_empty()),
        year: work.publication_year,
        doi: work.doi.map(|d| strip_doi_prefix(&d)),
        pmid: None,
        citation_count: work.cited_by_count,
        open_access: work.open_access.map(|oa| oa.is_oa).unwrap_or(false),
        pdf_url,
        venue,
        categories: Vec::new(),
    })
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn id(&self) -> &'static str {
        "openalex"
    }

    fn name(&self) -> &'static str {
        "OpenAlex"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let mut url =
            Url::parse(WORKS_URL).map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("search", &query.query)
            .append_pair("per-page", &limit.to_string());

        let mut filters = Vec::new();
        if let Some(range) = query.year_range {
            filters.push(format!("from_publication_date:{}-01-01", range.from));
            filters.push(format!("to_publication_date:{}-12-31", range.to));
        }
        if query.open_access_only {
            filters.push("open_access.is_oa:true".to_string());
        }
        if !filters.is_empty() {
            url.query_pairs_mut().append_pair("filter", &filters.join(","));
        }
        self.apply_common_params(&mut url);

        let envelope: WorksEnvelope = self.http.get_json(self.id(), url).await?;
        let results: Vec<SearchResult> = envelope
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_work)
            .collect();

        Ok(ProviderResponse {
            results,
            total: envelope.meta.map(|m| m.count).unwrap_or(0),
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SearchResult>, PaperloomError> {
        let mut url = Url::parse(&format!("{WORKS_URL}/{id}"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        self.apply_common_params(&mut url);

        let work: Work = self.http.get_json(self.id(), url).await?;
        Ok(parse_work(work))
    }

    async fn get_citations(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        let mut url =
            Url::parse(WORKS_URL).map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("cites:{id}"))
            .append_pair("per-page", &limit.clamp(1, 100).to_string());
        self.apply_common_params(&mut url);

        let envelope: WorksEnvelope = self.http.get_json(self.id(), url).await?;
        Ok(envelope
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_work)
            .collect())
    }

    async fn get_related(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        let mut url =
            Url::parse(WORKS_URL).map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("related_to:{id}"))
            .append_pair("per-page", &limit.clamp(1, 100).to_string());
        self.apply_common_params(&mut url);

        let envelope: WorksEnvelope = self.http.get_json(self.id(), url).await?;
        Ok(envelope
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_work)
            .collect())
    }

    fn supports_citation_count(&self) -> bool {
        true
    }

    fn supports_related_papers(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_index_reconstructs_in_position_order() {
        let mut inv = BTreeMap::new();
        inv.insert("world".to_string(), vec![1]);
        inv.insert("hello".to_string(), vec![0]);
        inv.insert("again".to_string(), vec![2]);
        assert_eq!(inverted_index_to_text(&inv), "hello world again");
    }

    #[test]
    fn work_parses_doi_and_short_id() {
        let raw = serde_json::json!({
            "id": "https://openalex.org/W2741809807",
            "display_name": "The state of OA",
            "publication_year": 2018,
            "doi": "https://doi.org/10.7717/peerj.4375",
            "cited_by_count": 1000,
            "open_access": {"is_oa": true},
            "authorships": [{
                "author": {"display_name": "Heather Piwowar", "orcid": "https://orcid.org/0000-0003-1613-5981"},
                "institutions": [{"display_name": "Impactstory"}]
            }],
            "primary_location": {
                "pdf_url": "https://peerj.com/articles/4375.pdf",
                "source": {"display_name": "PeerJ"}
            },
            "abstract_inverted_index": {"Open": [0], "access": [1]}
        });
        let work: Work = serde_json::from_value(raw).unwrap();
        let record = parse_work(work).expect("parseable");

        assert_eq!(record.id, "W2741809807");
        assert_eq!(record.doi.as_deref(), Some("10.7717/peerj.4375"));
        assert_eq!(record.abstract_text.as_deref(), Some("Open access"));
        assert_eq!(record.authors[0].orcid.as_deref(), Some("0000-0003-1613-5981"));
        assert_eq!(record.authors[0].affiliations, vec!["Impactstory".to_string()]);
        assert_eq!(record.venue.as_deref(), Some("PeerJ"));
        assert!(record.open_access);
    }
}
