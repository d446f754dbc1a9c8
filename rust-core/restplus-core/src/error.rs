//! # Error Handling
//!
//! Centralized error types for RestPlus core.
//! Uses `thiserror` for ergonomic error definitions.

use crate::schemas::{SchemaValidationError, SpecsError};
use crate::validation::ValidationErrors;
use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for RestPlus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the RestPlus runtime
#[derive(Error, Debug)]
pub enum Error {
    /// The resource has no handler for the requested HTTP verb
    #[error("Unimplemented method {method:?}")]
    MethodNotImplemented {
        /// The verb that was requested
        method: String,
        /// Verbs the resource does implement
        allowed: Vec<String>,
    },

    /// Router failed to match the requested path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The request body could not be decoded
    #[error("Bad request: {reason}")]
    BadRequest {
        /// Why the body was rejected
        reason: String,
    },

    /// The request payload does not conform to an expected model
    #[error("Input payload validation failed")]
    PayloadValidation(ValidationErrors),

    /// A handler aborted with an explicit HTTP status
    #[error("{message}")]
    Abort {
        /// Status to answer with
        status: StatusCode,
        /// Human-readable message
        message: String,
    },

    /// None of the registered representations is acceptable to the client
    #[error("No acceptable representation for the requested media types")]
    NotAcceptable,

    /// The configured default media type has no registered representation
    #[error("Default media type {mediatype:?} has no registered representation")]
    DefaultMediaTypeUnregistered {
        /// The configured default
        mediatype: String,
    },

    /// Specification type or version could not be resolved
    #[error(transparent)]
    Specs(#[from] SpecsError),

    /// Specification document failed schema validation
    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Abort the current request with the given status and message
    pub fn abort(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Abort {
            status,
            message: message.into(),
        }
    }

    /// HTTP status the framework answers with for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotImplemented { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::PayloadValidation(_) => StatusCode::BAD_REQUEST,
            Self::Abort { status, .. } => *status,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidRoutePattern { .. }
            | Self::DefaultMediaTypeUnregistered { .. }
            | Self::Specs(_)
            | Self::SchemaValidation(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
