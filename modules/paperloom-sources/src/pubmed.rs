//! PubMed via the NCBI E-utilities: esearch for the id list, esummary for
//! record metadata. Both endpoints speak JSON with `retmode=json`.
//! esummary carries no abstracts; the merge step fills those in from
//! providers that do.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::normalize_ws;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const ESUMMARY_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

pub struct PubMedAdapter {
    http: Http,
    api_key: Option<String>,
}

impl PubMedAdapter {
    pub fn new(http: Http, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    fn build_term(query: &SearchQuery) -> String {
        let mut term = query.query.clone();
        if let Some(range) = query.year_range {
            term.push_str(&format!(" AND {}:{}[dp]", range.from, range.to));
        }
        if query.open_access_only {
            term.push_str(" AND free full text[sb]");
        }
        term
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: String,
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EsummaryResponse {
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DocSummary {
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    authors: Vec<SummaryAuthor>,
    #[serde(default)]
    fulljournalname: String,
    #[serde(default)]
    pubtype: Vec<String>,
    #[serde(default)]
    articleids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct SummaryAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(default)]
    idtype: String,
    #[serde(default)]
    value: String,
}

fn parse_summary(doc: DocSummary) -> Option<SearchResult> {
    let title = normalize_ws(&doc.title);
    if title.is_empty() {
        return None;
    }
    // pubdate looks like "2021 Mar 15" or "2021"
    let year = doc.pubdate.get(..4).and_then(|y| y.parse().ok());
    let doi = doc
        .articleids
        .iter()
        .find(|a| a.idtype == "doi")
        .map(|a| a.value.clone())
        .filter(|v| !v.is_empty());
    // A PMC id means the full text is freely available
    let open_access = doc
        .articleids
        .iter()
        .any(|a| a.idtype == "pmc" && !a.value.is_empty());
    let authors = doc
        .authors
        .into_iter()
        .filter(|a| !a.name.trim().is_empty())
        .map(|a| Author::from_name(&a.name))
        .collect();

    Some(SearchResult {
        id: doc.uid.clone(),
        source: "pubmed".to_string(),
        title,
        authors,
        abstract_text: None,
        year,
        doi,
        pmid: Some(doc.uid),
        citation_count: None,
        open_access,
        pdf_url: None,
        venue: Some(doc.fulljournalname).filter(|v| !v.is_empty()),
        categories: doc.pubtype,
    })
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn id(&self) -> &'static str {
        "pubmed"
    }

    fn name(&self) -> &'static str {
        "PubMed"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let mut url = Url::parse(ESEARCH_URL)
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("db", "pubmed")
            .append_pair("retmode", "json")
            .append_pair("retmax", &limit.to_string())
            .append_pair("retstart", &query.offset.to_string())
            .append_pair("term", &Self::build_term(query));
        if let Some(ref key) = self.api_key {
            url.query_pairs_mut().append_pair("api_key", key);
        }

        let ids: EsearchResponse = self.http.get_json(self.id(), url).await?;
        let total: u32 = ids.esearchresult.count.parse().unwrap_or(0);
        let idlist = ids.esearchresult.idlist;
        if idlist.is_empty() {
            return Ok(ProviderResponse {
                results: Vec::new(),
                total,
                source: self.id().to_string(),
                execution_time_ms: started.elapsed().as_millis() as u64,
            });
        }

        let mut url = Url::parse(ESUMMARY_URL)
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("db", "pubmed")
            .append_pair("retmode", "json")
            .append_pair("id", &idlist.join(","));
        if let Some(ref key) = self.api_key {
            url.query_pairs_mut().append_pair("api_key", key);
        }

        let summaries: EsummaryResponse = self.http.get_json(self.id(), url).await?;
        let result = summaries
            .result
            .ok_or_else(|| PaperloomError::provider(self.id(), "esummary returned no result"))?;

        // The result object maps each uid to its summary, alongside a
        // "uids" array listing them in order.
        let mut results = Vec::new();
        for uid in &idlist {
            let Some(value) = result.get(uid) else {
                continue;
            };
            match serde_json::from_value::<DocSummary>(value.clone()) {
                Ok(doc) => {
                    if let Some(record) = parse_summary(doc) {
                        results.push(record);
                    }
                }
                Err(e) => {
                    debug!(source = self.id(), uid, error = %e, "Skipping unparseable summary");
                }
            }
        }

        Ok(ProviderResponse {
            results,
            total,
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SearchResult>, PaperloomError> {
        let mut url = Url::parse(ESUMMARY_URL)
            .map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("db", "pubmed")
            .append_pair("retmode", "json")
            .append_pair("id", id);
        if let Some(ref key) = self.api_key {
            url.query_pairs_mut().append_pair("api_key", key);
        }

        let summaries: EsummaryResponse = self.http.get_json(self.id(), url).await?;
        let Some(result) = summaries.result else {
            return Ok(None);
        };
        let Some(value) = result.get(id) else {
            return Ok(None);
        };
        let doc: DocSummary = serde_json::from_value(value.clone())
            .map_err(|e| PaperloomError::provider(self.id(), format!("bad summary: {e}")))?;
        Ok(parse_summary(doc))
    }
}
