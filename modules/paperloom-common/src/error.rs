use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperloomError {
    /// Network failure, rate limiting, or a malformed response from a
    /// provider. Caught at the adapter boundary and reported as a
    /// `{source, message}` entry, never propagated past the aggregator.
    #[error("Provider error from {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Empty source list")]
    EmptySourceList,

    #[error("Operation {operation} not supported by {provider}")]
    NotSupported { provider: String, operation: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Orchestration error: {0}")]
    Orchestration(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PaperloomError {
    pub fn provider(source: impl Into<String>, message: impl ToString) -> Self {
        PaperloomError::Provider {
            provider: source.into(),
            message: message.to_string(),
        }
    }
}
