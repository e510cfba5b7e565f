use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use paperloom_common::{Config, PaperloomError};

/// Max attempts per request. Only transient failures (429, 5xx, network
/// errors) are retried.
const MAX_ATTEMPTS: u32 = 2;
/// Base backoff for retries. Actual delay is base * 3^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Shared HTTP client for all adapters: per-request timeout, polite
/// user agent, and a single backoff retry on transient failures.
#[derive(Debug, Clone)]
pub struct Http {
    client: reqwest::Client,
    timeout: Duration,
}

impl Http {
    pub fn new(config: &Config) -> Self {
        let user_agent = match &config.mailto {
            Some(mailto) => format!("paperloom/0.1 (mailto:{mailto})"),
            None => "paperloom/0.1".to_string(),
        };
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();
        Self {
            client,
            timeout: Duration::from_secs(config.adapter_timeout_secs),
        }
    }

    /// GET `url` and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        source: &str,
        url: Url,
    ) -> Result<T, PaperloomError> {
        self.get_json_with_headers(source, url, &[]).await
    }

    /// GET `url` with extra request headers (API keys) and deserialize the
    /// JSON body.
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        source: &str,
        url: Url,
        headers: &[(&str, &str)],
    ) -> Result<T, PaperloomError> {
        let body = self
            .get_with_retry(source, url, Some("application/json"), headers)
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| PaperloomError::provider(source, format!("malformed JSON response: {e}")))
    }

    /// GET `url` and return the raw body. Used for Atom/XML providers.
    pub async fn get_text(&self, source: &str, url: Url) -> Result<String, PaperloomError> {
        self.get_with_retry(source, url, None, &[]).await
    }

    async fn get_with_retry(
        &self,
        source: &str,
        url: Url,
        accept: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<String, PaperloomError> {
        for attempt in 0..MAX_ATTEMPTS {
            let mut request = self.client.get(url.clone()).timeout(self.timeout);
            if let Some(accept) = accept {
                request = request.header(reqwest::header::ACCEPT, accept);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| {
                            PaperloomError::provider(source, format!("failed reading body: {e}"))
                        });
                    }
                    let transient = status.as_u16() == 429 || status.is_server_error();
                    if transient && attempt + 1 < MAX_ATTEMPTS {
                        let backoff = RETRY_BASE * 3u32.pow(attempt);
                        let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                        warn!(
                            source,
                            status = status.as_u16(),
                            backoff_ms = backoff.as_millis() as u64,
                            "Transient provider error, retrying after backoff"
                        );
                        tokio::time::sleep(backoff + jitter).await;
                        continue;
                    }
                    return Err(PaperloomError::provider(source, format!("HTTP {status}")));
                }
                Err(e) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        let backoff = RETRY_BASE * 3u32.pow(attempt);
                        let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                        warn!(source, error = %e, "Request failed, retrying after backoff");
                        tokio::time::sleep(backoff + jitter).await;
                        continue;
                    }
                    return Err(PaperloomError::provider(source, e));
                }
            }
        }
        Err(PaperloomError::provider(source, "retries exhausted"))
    }
}
