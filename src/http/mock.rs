//! In-process HTTP mock
//!
//! A URL → response table with failure injection. Failures are consumed
//! before the configured body is served, so `fail_times(url, 2, ..)` makes
//! the third request succeed. Unknown URLs answer 404. Every request is
//! logged for call counting.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use url::Url;

use super::{HttpClient, HttpError};

/// Canned answer for one URL
#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(Vec<u8>),
    Error(HttpError),
}

#[derive(Debug, Default)]
struct Route {
    response: Option<MockResponse>,
    /// Error served before `response`, and how many more times (None = always)
    failure: Option<(HttpError, Option<u32>)>,
}

/// Mock transport for tests
#[derive(Debug, Default)]
pub struct MockHttp {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_route<F: FnOnce(&mut Route)>(&self, url: &str, f: F) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        f(routes.entry(normalize(url)).or_default());
        self
    }

    /// Serve `body` for `url`.
    pub fn respond(&self, url: &str, body: impl Into<Vec<u8>>) -> &Self {
        let body = body.into();
        self.with_route(url, |route| route.response = Some(MockResponse::Body(body)))
    }

    pub fn respond_json(&self, url: &str, value: &serde_json::Value) -> &Self {
        self.respond(url, value.to_string())
    }

    /// Always answer `url` with `error`.
    pub fn fail(&self, url: &str, error: HttpError) -> &Self {
        self.with_route(url, |route| route.response = Some(MockResponse::Error(error)))
    }

    /// Answer `url` with `error` for the next `count` requests, then fall back
    /// to the configured response.
    pub fn fail_times(&self, url: &str, count: u32, error: HttpError) -> &Self {
        self.with_route(url, |route| route.failure = Some((error, Some(count))))
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of requests made to `url`
    pub fn requests_to(&self, url: &str) -> usize {
        let url = normalize(url);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| **r == url)
            .count()
    }

    fn answer(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(route) = routes.get_mut(url) else {
            return Err(HttpError::NotFound {
                url: url.to_string(),
            });
        };

        if let Some((error, remaining)) = route.failure.as_mut() {
            match remaining {
                None => return Err(error.clone()),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return Err(error.clone());
                }
            }
        }

        match &route.response {
            Some(MockResponse::Body(body)) => Ok(body.clone()),
            Some(MockResponse::Error(error)) => Err(error.clone()),
            None => Err(HttpError::NotFound {
                url: url.to_string(),
            }),
        }
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl HttpClient for MockHttp {
    fn download(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError> {
        let key = url.to_string();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.clone());

        let body = self.answer(&key)?;
        sink.write_all(&body).map_err(|e| HttpError::Write {
            url: key,
            reason: e.to_string(),
        })?;
        Ok(body.len() as u64)
    }
}
