//! Typed client for the trip planner API, plus the views `tripctl` renders.

pub mod api;
pub mod calendar;
pub mod dashboard;
pub mod detail;
pub mod token;

use reqwest::StatusCode;
use thiserror::Error;

pub use api::ApiClient;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the token; the caller should log in again.
    #[error("session expired or invalid, please log in again")]
    Unauthorized,
    #[error("request failed with {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}
