//! # RestPlus Core
//!
//! Resource dispatch, content negotiation and JSON Schema validation for
//! REST APIs served with Hyper and Tokio.
//!
//! ## Request flow
//!
//! The [`Server`] hands every request to an [`Api`], which routes it to a
//! [`Resource`]. The resource picks the handler for the verb, validates
//! the JSON payload against the handler's expected [`Model`]s, awaits the
//! handler and renders its data with the representation the client's
//! `Accept` header prefers.
//!
//! ## Modules
//!
//! - `api` - Resource registration and the response policy
//! - `resource` - Handler resolution, payload validation, dispatch
//! - `negotiation` - `Accept` header parsing and media type selection
//! - `representation` - Renderers keyed by media type
//! - `model` - Payload models backed by JSON Schema
//! - `schemas` - Lazily loaded specification schemas (Swagger 2.0)
//! - `server` - HTTP server built on Hyper
//! - `router` - URL rule matching using matchit (radix trie)
//! - `request` / `response` - Owned HTTP messages
//! - `json` - JSON parsing with simd-json
//! - `validation` - Structured validation errors
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod error;
pub mod json;
pub mod model;
pub mod negotiation;
pub mod representation;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;
pub mod schemas;
pub mod server;
pub mod validation;

pub use api::{Api, ApiBuilder, ApiConfig};
pub use error::{Error, Result};
pub use json::{parse_json_bytes, to_json_bytes};
pub use model::{ExpectedPayload, FormatChecker, Model, ModelRef, RefResolver, SchemaModel};
pub use negotiation::{AcceptHeader, MediaRange};
pub use representation::{Renderer, Representations, APPLICATION_JSON, TEXT_PLAIN};
pub use request::Request;
pub use resource::{
    handler, DispatchContext, Handler, HandlerDescriptor, MethodDecorator, Reply, Resource,
    ResourceBuilder,
};
pub use response::Response;
pub use router::{Method, Router, UrlArgs};
pub use schemas::{LazySchema, SchemaRegistry, SchemaValidationError, SpecsError, OAS_20};
pub use server::{init_tracing, Server, ServerConfig};
pub use validation::{FieldError, ValidationCode, ValidationErrors, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
