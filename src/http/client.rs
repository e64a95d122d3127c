//! reqwest-backed client

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;
use url::Url;

use super::{HttpClient, HttpError};

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Whole-request timeout, including the body
    pub timeout_seconds: u64,

    pub connect_timeout_seconds: u64,

    pub user_agent: String,

    /// Bearer token sent to api.github.com only
    #[serde(default, skip_serializing)]
    pub github_token: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            connect_timeout_seconds: 15,
            user_agent: format!("toolpin/{}", env!("CARGO_PKG_VERSION")),
            github_token: None,
        }
    }
}

/// Production client
pub struct ReqwestClient {
    client: Client,
    github_auth: Option<HeaderValue>,
}

impl ReqwestClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Setup(e.to_string()))?;

        let github_auth = match &settings.github_token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| HttpError::Setup(format!("invalid GitHub token: {}", e)))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            client,
            github_auth,
        })
    }

    fn headers_for(&self, url: &Url) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &self.github_auth {
            if url.host_str() == Some("api.github.com") {
                headers.insert(AUTHORIZATION, auth.clone());
            }
        }
        headers
    }
}

fn map_error(url: &Url, e: reqwest::Error) -> HttpError {
    let url = url.to_string();
    if e.is_timeout() {
        HttpError::Timeout { url }
    } else if let Some(status) = e.status() {
        HttpError::Status {
            url,
            status: status.as_u16(),
        }
    } else {
        HttpError::Connection {
            url,
            reason: e.to_string(),
        }
    }
}

impl HttpClient for ReqwestClient {
    fn download(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError> {
        tracing::debug!(url = %url, "GET");

        let mut response = self
            .client
            .get(url.clone())
            .headers(self.headers_for(url))
            .send()
            .map_err(|e| map_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HttpError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(HttpError::Timeout {
                        url: url.to_string(),
                    })
                }
                Err(e) => {
                    return Err(HttpError::Connection {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            };
            sink.write_all(&buf[..n]).map_err(|e| HttpError::Write {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            written += n as u64;
        }

        tracing::debug!(url = %url, bytes = written, "GET complete");
        Ok(written)
    }
}
