//! HTTP transport
//!
//! Abstracts the network for testability:
//! - [`HttpClient`]: interface used by feeds, tier lookups and downloads
//! - [`ReqwestClient`]: blocking reqwest client for production
//! - [`MockHttp`]: in-process URL table for tests

mod client;
mod mock;

pub use client::{HttpSettings, ReqwestClient};
pub use mock::{MockHttp, MockResponse};

use std::io::Write;
use url::Url;

use crate::retry::Retryable;

/// HTTP errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("{url}: not found (HTTP 404)")]
    NotFound { url: String },

    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: connection failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("{url}: request timed out")]
    Timeout { url: String },

    #[error("{url}: failed to write response body: {reason}")]
    Write { url: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl HttpError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::NotFound { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            HttpError::NotFound { url }
            | HttpError::Status { url, .. }
            | HttpError::Connection { url, .. }
            | HttpError::Timeout { url }
            | HttpError::Write { url, .. } => Some(url),
            HttpError::Setup(_) => None,
        }
    }
}

impl Retryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self {
            HttpError::Connection { .. } | HttpError::Timeout { .. } => true,
            HttpError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            HttpError::NotFound { .. } | HttpError::Write { .. } | HttpError::Setup(_) => false,
        }
    }
}

/// Blocking HTTP GET
pub trait HttpClient: Send + Sync {
    /// Stream the body of `url` into `sink`, returning the number of bytes
    /// written. Non-2xx statuses are errors.
    fn download(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError>;

    /// Fetch a (small) document into memory.
    fn get(&self, url: &Url) -> Result<Vec<u8>, HttpError> {
        let mut body = Vec::new();
        self.download(url, &mut body)?;
        Ok(body)
    }
}
