use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to a remote rendering or generation API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed (HTTP {status}); verify the configured API key")]
    Unauthorized { status: u16 },
    #[error("API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub const BODY_LIMIT: usize = 200;

    /// Maps a non-2xx response onto the auth / generic split.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::Status { status, body: crate::types::truncate_body(body, Self::BODY_LIMIT) },
        }
    }

    /// A 2xx body that did not match the expected shape; keeps the body, not the parser's message.
    pub fn decode(body: &str) -> Self {
        Self::Decode(crate::types::truncate_body(body, Self::BODY_LIMIT))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read secrets file {path}: {source}")]
    SecretsFile { path: PathBuf, source: dotenvy::Error },
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}
