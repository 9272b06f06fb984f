//! Admin API errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed entity does not exist (HTTP 404)
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Any other non-success response
    #[error("admin API returned {status} for {path}: {body}")]
    Http {
        status: u16,
        path: String,
        body: String,
    },

    #[error("admin API request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode admin API response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The remote returned something structurally unexpected
    #[error("unexpected admin API response: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Errors raised by 3scale validations (HTTP 422)
    pub fn is_unprocessable(&self) -> bool {
        matches!(self, ApiError::Http { status: 422, .. })
    }
}
