use std::env;

/// Runtime configuration loaded from environment variables.
///
/// Every bibliographic provider used here has a public anonymous tier, so
/// all keys are optional; setting them raises rate limits.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-adapter request timeout in seconds.
    pub adapter_timeout_secs: u64,
    /// Overall wall-clock budget for one research session, in seconds.
    /// Exceeding it forces early completion with partial results.
    pub session_budget_secs: u64,

    /// NCBI E-utilities API key (raises PubMed rate limits).
    pub ncbi_api_key: Option<String>,
    /// Semantic Scholar Graph API key.
    pub semantic_scholar_api_key: Option<String>,
    /// Contact email for the OpenAlex/Crossref polite pools.
    pub mailto: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            adapter_timeout_secs: env_u64("PAPERLOOM_ADAPTER_TIMEOUT_SECS", 20),
            session_budget_secs: env_u64("PAPERLOOM_SESSION_BUDGET_SECS", 600),
            ncbi_api_key: optional_env("NCBI_API_KEY"),
            semantic_scholar_api_key: optional_env("SEMANTIC_SCHOLAR_API_KEY"),
            mailto: optional_env("PAPERLOOM_MAILTO"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 20,
            session_budget_secs: 600,
            ncbi_api_key: None,
            semantic_scholar_api_key: None,
            mailto: None,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
