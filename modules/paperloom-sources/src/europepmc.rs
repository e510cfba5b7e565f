//! Europe PMC REST API. Covers PubMed plus preprints and agency
//! repositories, and unlike esummary it returns abstracts and citation
//! counts in one call.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::{normalize_ws, strip_doi_prefix};

const BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

pub struct EuropePmcAdapter {
    http: Http,
}

impl EuropePmcAdapter {
    pub fn new(http: Http) -> Self {
        Self { http }
    }

    fn build_query(query: &SearchQuery) -> String {
        let mut q = query.query.clone();
        if let Some(range) = query.year_range {
            q.push_str(&format!(" AND PUB_YEAR:[{} TO {}]", range.from, range.to));
        }
        if query.open_access_only {
            q.push_str(" AND OPEN_ACCESS:Y");
        }
        q
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEnvelope {
    #[serde(default)]
    hit_count: u32,
    result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationEnvelope {
    citation_list: Option<CitationList>,
}

#[derive(Debug, Deserialize)]
struct CitationList {
    #[serde(default)]
    citation: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    id: String,
    pmid: Option<String>,
    doi: Option<String>,
    #[serde(default)]
    title: String,
    author_list: Option<AuthorList>,
    #[serde(default)]
    author_string: String,
    journal_title: Option<String>,
    pub_year: Option<String>,
    abstract_text: Option<String>,
    is_open_access: Option<String>,
    cited_by_count: Option<u32>,
    pub_type_list: Option<PubTypeList>,
    full_text_url_list: Option<FullTextUrlList>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(default)]
    author: Vec<ItemAuthor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemAuthor {
    full_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubTypeList {
    #[serde(default)]
    pub_type: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrlList {
    #[serde(default)]
    full_text_url: Vec<FullTextUrl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrl {
    document_style: Option<String>,
    url: Option<String>,
}

fn parse_item(item: Item) -> Option<SearchResult> {
    let title = normalize_ws(&item.title);
    if title.is_empty() {
        return None;
    }

    let authors: Vec<Author> = match item.author_list {
        Some(list) => list
            .author
            .into_iter()
            .filter_map(|a| {
                let name = a.full_name?;
                let mut author = Author::from_name(&name);
                author.first = a.first_name.or(author.first);
                author.last = a.last_name.or(author.last);
                Some(author)
            })
            .collect(),
        None => item
            .author_string
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Author::from_name)
            .collect(),
    };

    let pdf_url = item.full_text_url_list.and_then(|list| {
        list.full_text_url
            .into_iter()
            .find(|u| u.document_style.as_deref() == Some("pdf"))
            .and_then(|u| u.url)
    });

    Some(SearchResult {
        id: item.id,
        source: "europepmc".to_string(),
        title,
        authors,
        abstract_text: item
            .abstract_text
            .map(|a| normalize_ws(&a))
            .filter(|a| !a.is_empty()),
        year: item.pub_year.and_then(|y| y.parse().ok()),
        doi: item.doi.map(|d| strip_doi_prefix(&d)),
        pmid: item.pmid,
        citation_count: item.cited_by_count,
        open_access: item.is_open_access.as_deref() == Some("Y"),
        pdf_url,
        venue: item.journal_title.filter(|v| !v.is_empty()),
        categories: item.pub_type_list.map(|l| l.pub_type).unwrap_or_default(),
    })
}

#[async_trait]
impl SourceAdapter for EuropePmcAdapter {
    fn id(&self) -> &'static str {
        "europepmc"
    }

    fn name(&self) -> &'static str {
        "Europe PMC"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let mut url = Url::parse(&format!("{BASE_URL}/search"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("query", &Self::build_query(query))
            .append_pair("format", "json")
            .append_pair("resultType", "core")
            .append_pair("pageSize", &limit.to_string());

        let envelope: SearchEnvelope = self.http.get_json(self.id(), url).await?;
        let results: Vec<SearchResult> = envelope
            .result_list
            .map(|l| l.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_item)
            .collect();

        Ok(ProviderResponse {
            results,
            total: envelope.hit_count,
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_citations(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        let mut url = Url::parse(&format!("{BASE_URL}/MED/{id}/citations"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("pageSize", &limit.clamp(1, 100).to_string());

        let envelope: CitationEnvelope = self.http.get_json(self.id(), url).await?;
        Ok(envelope
            .citation_list
            .map(|l| l.citation)
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_item)
            .collect())
    }

    fn supports_full_text(&self) -> bool {
        true
    }

    fn supports_citation_count(&self) -> bool {
        true
    }
}
