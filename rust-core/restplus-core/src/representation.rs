//! # Representations
//!
//! Registry of renderers keyed by media type. The API owns one registry;
//! a resource may carry its own override.

use crate::error::Result;
use crate::json::to_json_bytes;
use crate::response::Response;
use hyper::{HeaderMap, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Media type of the built-in JSON representation
pub const APPLICATION_JSON: &str = "application/json";

/// Media type of the built-in plain text fallback
pub const TEXT_PLAIN: &str = "text/plain";

/// Renders handler data into a response
pub type Renderer =
    Arc<dyn Fn(&Value, StatusCode, Option<&HeaderMap>) -> Result<Response> + Send + Sync>;

/// Render `data` as JSON
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be encoded.
pub fn output_json(data: &Value, status: StatusCode, headers: Option<&HeaderMap>) -> Result<Response> {
    let mut response = Response::json(to_json_bytes(data)?).with_status(status);
    if let Some(headers) = headers {
        response.extend_headers(headers);
    }
    Ok(response)
}

/// Render `data` as plain text; strings are written without quotes
///
/// # Errors
///
/// Never fails; the signature matches [`Renderer`].
pub fn output_text(data: &Value, status: StatusCode, headers: Option<&HeaderMap>) -> Result<Response> {
    let body = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut response = Response::text(body).with_status(status);
    if let Some(headers) = headers {
        response.extend_headers(headers);
    }
    Ok(response)
}

/// Ordered media type → renderer map
///
/// Registration order is kept: it breaks ties when the client accepts
/// several registered types equally.
#[derive(Clone)]
pub struct Representations {
    entries: Vec<(String, Renderer)>,
}

impl Default for Representations {
    /// A registry holding only the JSON representation
    fn default() -> Self {
        let mut representations = Self::new();
        representations.insert(APPLICATION_JSON, Arc::new(output_json));
        representations
    }
}

impl fmt::Debug for Representations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.mediatypes()).finish()
    }
}

impl Representations {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `renderer` for `mediatype`, replacing an earlier one in place
    pub fn insert(&mut self, mediatype: impl Into<String>, renderer: Renderer) {
        let mediatype = mediatype.into();
        match self.entries.iter_mut().find(|(m, _)| *m == mediatype) {
            Some(entry) => entry.1 = renderer,
            None => self.entries.push((mediatype, renderer)),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with<F>(mut self, mediatype: impl Into<String>, renderer: F) -> Self
    where
        F: Fn(&Value, StatusCode, Option<&HeaderMap>) -> Result<Response> + Send + Sync + 'static,
    {
        self.insert(mediatype, Arc::new(renderer));
        self
    }

    /// Renderer registered for `mediatype`
    #[must_use]
    pub fn get(&self, mediatype: &str) -> Option<&Renderer> {
        self.entries
            .iter()
            .find(|(m, _)| m == mediatype)
            .map(|(_, r)| r)
    }

    /// Whether `mediatype` has a renderer
    #[must_use]
    pub fn contains(&self, mediatype: &str) -> bool {
        self.get(mediatype).is_some()
    }

    /// Registered media types in registration order
    pub fn mediatypes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(m, _)| m.as_str())
    }

    /// First registered media type
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.mediatypes().next()
    }

    /// Number of registered representations
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render with the renderer for `mediatype` and force its `Content-Type`
    ///
    /// Returns `None` when `mediatype` is not registered.
    pub fn render(
        &self,
        mediatype: &str,
        data: &Value,
        status: StatusCode,
        headers: Option<&HeaderMap>,
    ) -> Option<Result<Response>> {
        let renderer = self.get(mediatype)?;
        Some(renderer(data, status, headers).map(|mut response| {
            response.set_header("content-type", mediatype);
            response
        }))
    }
}
