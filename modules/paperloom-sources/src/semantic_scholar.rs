//! Semantic Scholar Graph API. Also backs citation and recommendation
//! lookups for the citation-graph stage.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::{normalize_ws, strip_doi_prefix};

const GRAPH_URL: &str = "https://api.semanticscholar.org/graph/v1";
const RECOMMENDATIONS_URL: &str = "https://api.semanticscholar.org/recommendations/v1";

const FIELDS: &str =
    "paperId,title,year,venue,authors,externalIds,abstract,openAccessPdf,citationCount,isOpenAccess,publicationTypes";

pub struct SemanticScholarAdapter {
    http: Http,
    api_key: Option<String>,
}

impl SemanticScholarAdapter {
    pub fn new(http: Http, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    total: u32,
    data: Option<Vec<Item>>,
}

#[derive(Debug, Deserialize)]
struct CitationsEnvelope {
    data: Option<Vec<CitationEntry>>,
}

#[derive(Debug, Deserialize)]
struct CitationEntry {
    #[serde(rename = "citingPaper")]
    citing_paper: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct RecommendationsEnvelope {
    #[serde(rename = "recommendedPapers", default)]
    recommended_papers: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(default)]
    authors: Vec<ItemAuthor>,
    #[serde(rename = "externalIds")]
    external_ids: Option<ExternalIds>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<OpenAccessPdf>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u32>,
    #[serde(rename = "isOpenAccess")]
    is_open_access: Option<bool>,
    #[serde(rename = "publicationTypes")]
    publication_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ItemAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

fn parse_item(item: Item) -> Option<SearchResult> {
    let title = normalize_ws(&item.title?);
    if title.is_empty() {
        return None;
    }
    let (doi, pmid) = item
        .external_ids
        .map(|x| (x.doi, x.pubmed))
        .unwrap_or((None, None));
    let pdf_url = item.open_access_pdf.and_then(|p| p.url);

    Some(SearchResult {
        id: item.paper_id.unwrap_or_default(),
        source: "semantic_scholar".to_string(),
        title,
        authors: item
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .filter(|n| !n.trim().is_empty())
            .map(|n| Author::from_name(&n))
            .collect(),
        abstract_text: item
            .abstract_text
            .map(|a| normalize_ws(&a))
            .filter(|a| !a.is_empty()),
        year: item.year,
        doi: doi.map(|d| strip_doi_prefix(&d)),
        pmid,
        citation_count: item.citation_count,
        open_access: item.is_open_access.unwrap_or(false) || pdf_url.is_some(),
        pdf_url,
        venue: item.venue.filter(|v| !v.is_empty()),
        categories: item.publication_types.unwrap_or_default(),
    })
}

impl SemanticScholarAdapter {
    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, PaperloomError> {
        match &self.api_key {
            Some(key) => {
                self.http
                    .get_json_with_headers(self.id(), url, &[("x-api-key", key)])
                    .await
            }
            None => self.http.get_json(self.id(), url).await,
        }
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn id(&self) -> &'static str {
        "semantic_scholar"
    }

    fn name(&self) -> &'static str {
        "Semantic Scholar"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let mut url = Url::parse(&format!("{GRAPH_URL}/paper/search"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("query", &query.query)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &query.offset.to_string())
            .append_pair("fields", FIELDS);
        if let Some(range) = query.year_range {
            url.query_pairs_mut()
                .append_pair("year", &format!("{}-{}", range.from, range.to));
        }
        if query.open_access_only {
            url.query_pairs_mut().append_pair("openAccessPdf", "");
        }

        let envelope: SearchEnvelope = self.fetch_json(url).await?;
        let results: Vec<SearchResult> = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_item)
            .collect();

        Ok(ProviderResponse {
            results,
            total: envelope.total,
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SearchResult>, PaperloomError> {
        let mut url = Url::parse(&format!("{GRAPH_URL}/paper/{id}"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut().append_pair("fields", FIELDS);

        let item: Item = self.fetch_json(url).await?;
        Ok(parse_item(item))
    }

    async fn get_citations(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        let mut url = Url::parse(&format!("{GRAPH_URL}/paper/{id}/citations"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("fields", FIELDS)
            .append_pair("limit", &limit.clamp(1, 100).to_string());

        let envelope: CitationsEnvelope = self.fetch_json(url).await?;
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.citing_paper)
            .filter_map(parse_item)
            .collect())
    }

    async fn get_related(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, PaperloomError> {
        let mut url = Url::parse(&format!("{RECOMMENDATIONS_URL}/papers/forpaper/{id}"))
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("fields", FIELDS)
            .append_pair("limit", &limit.clamp(1, 100).to_string());

        let envelope: RecommendationsEnvelope = self.fetch_json(url).await?;
        Ok(envelope
            .recommended_papers
            .into_iter()
            .filter_map(parse_item)
            .collect())
    }

    fn supports_citation_count(&self) -> bool {
        true
    }

    fn supports_related_papers(&self) -> bool {
        true
    }
}
