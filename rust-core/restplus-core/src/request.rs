//! # HTTP Request
//!
//! Owned request handed to resources: verb, path, headers and the
//! collected body.

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH};
use hyper::{HeaderMap, Method};
use serde::Serialize;
use serde_json::Value;

/// HTTP request as seen by resources
///
/// The body is collected up front so that payload validation and the
/// handler can both read it.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method, kept raw so unknown verbs reach the resource
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request manually (for testing/internal use)
    ///
    /// A query string in `path` is split off.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };
        Self {
            method,
            path,
            query_string,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builder-style header setter; invalid names or values are ignored
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Builder-style raw body setter
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builder-style JSON body setter
    #[must_use]
    pub fn with_json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Create from a hyper request, refusing bodies above `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual body
    /// size exceeds the limit, `Error::Http` if the body stream fails.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|len| *len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual,
            });
        }

        let (parts, body) = req.into_parts();
        let bytes = body.collect().await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_string: parts.uri.query().map(String::from),
            headers: parts.headers,
            body: Some(bytes),
        })
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// All request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Accept` header, if the client sent one
    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.headers.get(ACCEPT).and_then(|v| v.to_str().ok())
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Decode the body as JSON
    ///
    /// An absent or empty body decodes to `null`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if the body is not valid JSON.
    pub fn json(&self) -> Result<Value> {
        match self.body_bytes() {
            Some(bytes) if !bytes.is_empty() => {
                let mut buffer = bytes.to_vec();
                parse_json_bytes(&mut buffer)
            }
            _ => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_splits_query_string() {
        let req = Request::new(Method::GET, "/todos?page=2");
        assert_eq!(req.path, "/todos");
        assert_eq!(req.query_string(), Some("page=2"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = Request::new(Method::GET, "/").with_header("Accept", "text/plain");
        assert_eq!(req.header("accept"), Some("text/plain"));
        assert_eq!(req.accept(), Some("text/plain"));
    }

    #[test]
    fn test_json_body() {
        let req = Request::new(Method::POST, "/").with_json(&json!({"task": "x"}));
        assert_eq!(req.json().unwrap(), json!({"task": "x"}));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_missing_body_is_null() {
        let req = Request::new(Method::POST, "/");
        assert_eq!(req.json().unwrap(), Value::Null);
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let req = Request::new(Method::POST, "/").with_body("{\"task\":");
        assert!(matches!(req.json(), Err(Error::BadRequest { .. })));
    }
}
