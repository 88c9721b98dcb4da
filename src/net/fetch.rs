use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use url::Url;

/// Result of fetching a URL
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub body: String,
    pub url: String,
    pub status: u16,
    pub content_type: String,
}

/// Error during fetch
#[derive(Clone, Debug, PartialEq)]
pub struct FetchError {
    pub message: String,
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Something that can answer a GET request.
///
/// The dashboard only ever reads from the server, so a single blocking
/// `get` is the whole contract. Implementations must be shareable across
/// the fetch threads.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<FetchResult, FetchError>;
}

/// reqwest-backed transport used by the desktop client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("dashboard-browser/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::new(format!("Client error: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url_str: &str) -> Result<FetchResult, FetchError> {
        let parsed =
            Url::parse(url_str).map_err(|e| FetchError::new(format!("Invalid URL: {}", e)))?;

        let response = self
            .client
            .get(parsed.as_str())
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .map_err(|e| FetchError::new(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let final_url = response.url().to_string();

        if !response.status().is_success() {
            return Err(FetchError {
                message: format!("Unexpected status for {}", final_url),
                status: Some(status),
            });
        }

        let body = response
            .text()
            .map_err(|e| FetchError::new(format!("Failed to read body: {}", e)))?;

        Ok(FetchResult {
            body,
            url: final_url,
            status,
            content_type,
        })
    }
}

/// Canned-response transport for tests and offline demos.
///
/// Unknown URLs answer with a 404 error. Every request is counted so tests
/// can assert how often a URL was fetched.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Result<String, u16>>>,
    requests: Mutex<Vec<String>>,
    total: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with a 200 and `body`.
    pub fn respond(&self, url: &str, body: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), Ok(body.into()));
        }
    }

    /// Answer `url` with an error status.
    pub fn fail(&self, url: &str, status: u16) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), Err(status));
        }
    }

    /// How many times `url` was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|u| u.as_str() == url).count())
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// URLs in the order they were requested.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        let answer = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(url).cloned())
            .unwrap_or(Err(404));
        match answer {
            Ok(body) => Ok(FetchResult {
                body,
                url: url.to_string(),
                status: 200,
                content_type: "text/html".into(),
            }),
            Err(status) => Err(FetchError {
                message: format!("Unexpected status for {}", url),
                status: Some(status),
            }),
        }
    }
}
