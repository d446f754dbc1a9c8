//! # Router
//!
//! Radix-trie path matching using `matchit`, plus the HTTP verb enum that
//! resources key their handlers by.
//!
//! The router only maps a path to a resource. Picking the handler for the
//! verb is the resource's job, so a path that exists but lacks the verb
//! yields 405 rather than 404.

use crate::error::{Error, Result};
use matchit::Router as MatchitRouter;
use std::fmt;
use std::str::FromStr;

/// HTTP methods a resource can implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// All verbs, in canonical order
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Case-insensitive lookup of a verb name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::MethodNotImplemented {
            method: s.to_string(),
            allowed: Vec::new(),
        })
    }
}

/// Route identifier handed out by [`Router::add_route`]
pub type RouteId = usize;

/// Arguments captured from the matched URL rule
///
/// Keeps capture order so handlers can read them positionally as well as
/// by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlArgs {
    args: Vec<(String, String)>,
}

impl UrlArgs {
    /// Create an empty argument set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named argument
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// Raw value of a named argument
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Named argument parsed into `T`; `None` when absent or unparsable
    #[must_use]
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Value of the `index`-th captured argument
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|(_, v)| v.as_str())
    }

    /// Iterate `(name, value)` pairs in capture order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of captured arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Path router mapping URL rules to route identifiers
#[derive(Clone)]
pub struct Router {
    inner: MatchitRouter<RouteId>,
    patterns: Vec<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MatchitRouter::new(),
            patterns: Vec::new(),
        }
    }

    /// Register a URL rule such as `/todos/{id}`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed or
    /// conflicts with an existing rule.
    pub fn add_route(&mut self, pattern: &str) -> Result<RouteId> {
        let id = self.patterns.len();
        self.inner
            .insert(pattern, id)
            .map_err(|e| Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        self.patterns.push(pattern.to_string());
        Ok(id)
    }

    /// Match a request path, returning the route and its captured arguments
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` if no rule matches.
    pub fn match_route(&self, path: &str) -> Result<(RouteId, UrlArgs)> {
        let matched = self.inner.at(path).map_err(|_| Error::RouteNotFound {
            path: path.to_string(),
        })?;
        let args = matched
            .params
            .iter()
            .fold(UrlArgs::new(), |args, (name, value)| args.with(name, value));
        Ok((*matched.value, args))
    }

    /// The URL rule registered under `id`
    #[must_use]
    pub fn pattern(&self, id: RouteId) -> Option<&str> {
        self.patterns.get(id).map(String::as_str)
    }
}
