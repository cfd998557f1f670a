//! HTTP seam between provider adapters and the network.
//!
//! Adapters build [`HttpRequest`]s and read [`HttpResponse`]s; tests swap the
//! [`HttpClient`] for a canned one. Status codes are folded into a
//! [`ResponseClass`] so adapters match on meaning instead of numbers.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// GET request issued against a provider host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Sends an explicit session cookie instead of relying on the jar.
    pub fn with_cookie(self, cookie: Option<&str>) -> Self {
        match cookie {
            Some(cookie) => self.with_header("cookie", cookie),
            None => self,
        }
    }
}

/// What a status code means to a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// 401: the session cookie or crumb went stale.
    SessionExpired,
    /// 429.
    RateLimited,
    /// 404: the provider has nothing under this path.
    NotFound,
    /// Any other 4xx.
    Rejected,
    /// 5xx and anything unexpected.
    ServerError,
}

impl ResponseClass {
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            401 => Self::SessionExpired,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            400..=499 => Self::Rejected,
            _ => Self::ServerError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn class(&self) -> ResponseClass {
        ResponseClass::from_status(self.status)
    }
}

/// Failure before any status code was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl HttpError {
    /// Whether the same request may succeed later.
    pub const fn retryable(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(error: reqwest::Error) -> Self {
        let message = error.to_string();
        if error.is_timeout() {
            Self::Timeout(message)
        } else if error.is_connect() {
            Self::Connect(message)
        } else if error.is_builder() {
            Self::InvalidRequest(message)
        } else if error.is_body() || error.is_decode() {
            Self::Body(message)
        } else {
            Self::Other(message)
        }
    }
}

pub type HttpFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// reqwest transport. The cookie jar replays the session cookie Yahoo sets
/// during the crumb handshake on every later data call.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fundscreen/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::Body(error.to_string()))?;
            Ok(HttpResponse::new(status, body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_fold_into_provider_meanings() {
        assert_eq!(ResponseClass::from_status(204), ResponseClass::Success);
        assert_eq!(ResponseClass::from_status(401), ResponseClass::SessionExpired);
        assert_eq!(ResponseClass::from_status(404), ResponseClass::NotFound);
        assert_eq!(ResponseClass::from_status(429), ResponseClass::RateLimited);
        assert_eq!(ResponseClass::from_status(400), ResponseClass::Rejected);
        assert_eq!(ResponseClass::from_status(503), ResponseClass::ServerError);
        assert_eq!(ResponseClass::from_status(302), ResponseClass::ServerError);
    }

    #[test]
    fn cookie_override_is_optional() {
        let with = HttpRequest::get("https://example.test/chart").with_cookie(Some("A3=session"));
        let without = HttpRequest::get("https://example.test/chart").with_cookie(None);

        assert_eq!(with.headers.get("cookie").map(String::as_str), Some("A3=session"));
        assert!(without.headers.is_empty());
    }

    #[test]
    fn header_names_are_lowercased() {
        let request = HttpRequest::get("https://example.test/").with_header("Referer", "x");
        assert_eq!(request.headers.get("referer").map(String::as_str), Some("x"));
    }

    #[test]
    fn only_unbuildable_requests_are_final() {
        assert!(HttpError::Timeout(String::from("slow")).retryable());
        assert!(HttpError::Connect(String::from("refused")).retryable());
        assert!(!HttpError::InvalidRequest(String::from("bad url")).retryable());
    }
}
