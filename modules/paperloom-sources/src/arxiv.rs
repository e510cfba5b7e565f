//! arXiv Atom API, parsed with feed-rs. Everything on arXiv is open
//! access; citation counts are not available here.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Datelike;
use url::Url;

use paperloom_common::{Author, PaperloomError, SearchQuery, SearchResult};

use crate::adapter::{ProviderResponse, SourceAdapter};
use crate::http::Http;
use crate::util::normalize_ws;

const API_URL: &str = "https://export.arxiv.org/api/query";

pub struct ArxivAdapter {
    http: Http,
}

impl ArxivAdapter {
    pub fn new(http: Http) -> Self {
        Self { http }
    }
}

fn entry_to_record(entry: feed_rs::model::Entry) -> Option<SearchResult> {
    let title = entry.title.map(|t| normalize_ws(&t.content))?;
    if title.is_empty() {
        return None;
    }

    // Entry ids look like "http://arxiv.org/abs/2101.00001v2"
    let id = entry
        .id
        .rsplit("/abs/")
        .next()
        .unwrap_or(&entry.id)
        .to_string();

    let pdf_url = entry
        .links
        .iter()
        .find(|l| {
            l.media_type.as_deref() == Some("application/pdf")
                || l.title.as_deref() == Some("pdf")
        })
        .map(|l| l.href.clone());

    Some(SearchResult {
        id,
        source: "arxiv".to_string(),
        title,
        authors: entry
            .authors
            .into_iter()
            .filter(|p| !p.name.trim().is_empty())
            .map(|p| Author::from_name(&p.name))
            .collect(),
        abstract_text: entry
            .summary
            .map(|s| normalize_ws(&s.content))
            .filter(|s| !s.is_empty()),
        year: entry.published.map(|d| d.year()),
        doi: None,
        pmid: None,
        citation_count: None,
        open_access: true,
        pdf_url,
        venue: None,
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
    })
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn id(&self) -> &'static str {
        "arxiv"
    }

    fn name(&self) -> &'static str {
        "arXiv"
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProviderResponse, PaperloomError> {
        let started = Instant::now();
        let limit = query.limit.clamp(1, 100);

        let search_query = if query.categories.is_empty() {
            format!("all:\"{}\"", query.query)
        } else {
            let cats = query
                .categories
                .iter()
                .map(|c| format!("cat:{c}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("all:\"{}\" AND ({cats})", query.query)
        };

        let mut url =
            Url::parse(API_URL).map_err(|e| PaperloomError::provider(self.id(), e))?;
        url.query_pairs_mut()
            .append_pair("search_query", &search_query)
            .append_pair("start", &query.offset.to_string())
            .append_pair("max_results", &limit.to_string())
            .append_pair("sortBy", "relevance");

        let body = self.http.get_text(self.id(), url).await?;
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| PaperloomError::provider(self.id(), format!("malformed Atom feed: {e}")))?;

        let results: Vec<SearchResult> = feed
            .entries
            .into_iter()
            .filter_map(entry_to_record)
            // The Atom API has no year filter, so apply it client-side.
            .filter(|r| match (query.year_range, r.year) {
                (Some(range), Some(year)) => range.contains(year),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();

        let total = results.len() as u32;
        Ok(ProviderResponse {
            results,
            total,
            source: self.id().to_string(),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn supports_full_text(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <id>http://arxiv.org/api/example</id>
  <updated>2024-01-10T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v1</id>
    <updated>2024-01-03T12:00:00Z</updated>
    <published>2024-01-03T12:00:00Z</published>
    <title>Sparse  attention for long documents</title>
    <summary>We study sparse attention mechanisms.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2401.01234v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.01234v1" rel="related" type="application/pdf"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn atom_entry_parses_into_record() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let entry = feed.entries.into_iter().next().unwrap();
        let record = entry_to_record(entry).expect("parseable");

        assert_eq!(record.id, "2401.01234v1");
        assert_eq!(record.title, "Sparse attention for long documents");
        assert_eq!(record.year, Some(2024));
        assert_eq!(record.authors.len(), 2);
        assert!(record.open_access);
        assert_eq!(
            record.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2401.01234v1")
        );
        assert_eq!(record.categories, vec!["cs.CL".to_string()]);
    }
}
