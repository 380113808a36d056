//! Error taxonomy of the update pipeline.
//!
//! None of these escalate past the orchestrator: each one is turned into a
//! wire payload, a retry, or a log line.

use thiserror::Error;

/// Failure of a single provider fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure, non-200 status, or a body that could not be normalized.
    #[error("{0}")]
    HttpOrParse(String),

    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(&'static str),
}

impl FetchError {
    pub(crate) fn http(message: impl Into<String>) -> Self {
        FetchError::HttpOrParse(message.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::HttpOrParse(err.to_string())
    }
}

/// No positioning fix available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Negative acknowledgement from the downstream device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device rejected message: {reason}")]
pub struct DeliveryRejection {
    pub reason: String,
}

impl DeliveryRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Malformed response from the configuration portal.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("settings response is not valid URL encoding: {0}")]
    Decode(String),
    #[error("settings response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
