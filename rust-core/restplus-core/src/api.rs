//! # API
//!
//! Ties resources, representations, models and specification schemas
//! together, and turns every request into a response.
//!
//! The [`Api`] owns the response policy the resources leave open: the
//! default media type when the client's `Accept` header selects nothing,
//! error bodies, the `Allow` header of 405 answers and body-less `HEAD`
//! responses.

use crate::error::{Error, Result};
use crate::model::{FormatChecker, FormatFn, Model, RefResolver, SchemaModel};
use crate::negotiation::AcceptHeader;
use crate::representation::{output_text, Representations, APPLICATION_JSON, TEXT_PLAIN};
use crate::request::Request;
use crate::resource::{DispatchContext, Reply, Resource};
use crate::response::Response;
use crate::router::Router;
use crate::schemas::SchemaRegistry;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW};
use hyper::{HeaderMap, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// API-wide settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Validate payloads of handlers that do not decide for themselves
    pub validate: bool,
    /// Media type used when negotiation selects nothing
    pub default_mediatype: Option<String>,
    /// Enforce the `format` keyword during payload validation
    pub format_checking: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            validate: false,
            default_mediatype: Some(APPLICATION_JSON.to_string()),
            format_checking: true,
        }
    }
}

impl ApiConfig {
    /// Set the payload validation default
    #[must_use]
    pub const fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the default media type
    #[must_use]
    pub fn with_default_mediatype(mut self, mediatype: impl Into<String>) -> Self {
        self.default_mediatype = Some(mediatype.into());
        self
    }

    /// Answer 406 instead of falling back to a default media type
    #[must_use]
    pub fn without_default_mediatype(mut self) -> Self {
        self.default_mediatype = None;
        self
    }

    /// Turn `format` enforcement on or off
    #[must_use]
    pub const fn with_format_checking(mut self, enabled: bool) -> Self {
        self.format_checking = enabled;
        self
    }
}

/// Builder for [`Api`]
pub struct ApiBuilder {
    config: ApiConfig,
    representations: Representations,
    resolver: RefResolver,
    formats: Vec<(String, FormatFn)>,
    resources: Vec<(String, Resource)>,
    schemas: SchemaRegistry,
}

impl ApiBuilder {
    /// Register a renderer for `mediatype`
    #[must_use]
    pub fn representation<F>(mut self, mediatype: impl Into<String>, renderer: F) -> Self
    where
        F: Fn(&Value, StatusCode, Option<&HeaderMap>) -> Result<Response> + Send + Sync + 'static,
    {
        self.representations.insert(mediatype, Arc::new(renderer));
        self
    }

    /// Replace the whole representation registry
    #[must_use]
    pub fn representations(mut self, representations: Representations) -> Self {
        self.representations = representations;
        self
    }

    /// Register a model so other models can `$ref` it
    #[must_use]
    pub fn model(mut self, model: &SchemaModel) -> Self {
        self.resolver.insert(model.name(), model.schema().clone());
        self
    }

    /// Register a custom `format` checker
    #[must_use]
    pub fn format(mut self, name: impl Into<String>, check: FormatFn) -> Self {
        self.formats.push((name.into(), check));
        self
    }

    /// Mount `resource` on the URL rule `pattern`, e.g. `/todos/{todo_id}`
    #[must_use]
    pub fn resource(mut self, pattern: impl Into<String>, resource: Resource) -> Self {
        self.resources.push((pattern.into(), resource));
        self
    }

    /// Use `schemas` to validate specifications
    #[must_use]
    pub fn schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Finish the API
    ///
    /// # Errors
    ///
    /// - `Error::DefaultMediaTypeUnregistered` if the default media type
    ///   has no renderer and is not `text/plain`.
    /// - `Error::InvalidRoutePattern` if a URL rule is rejected.
    pub fn build(self) -> Result<Api> {
        if let Some(mediatype) = &self.config.default_mediatype {
            if mediatype != TEXT_PLAIN && !self.representations.contains(mediatype) {
                return Err(Error::DefaultMediaTypeUnregistered {
                    mediatype: mediatype.clone(),
                });
            }
        }

        let mut router = Router::new();
        let mut resources = Vec::with_capacity(self.resources.len());
        for (pattern, resource) in self.resources {
            router.add_route(&pattern)?;
            debug!(resource = %resource.name(), pattern = %pattern, "Registered resource");
            resources.push(resource);
        }

        let format_checker = self.formats.into_iter().fold(
            if self.config.format_checking {
                FormatChecker::new()
            } else {
                FormatChecker::disabled()
            },
            |checker, (name, check)| checker.with_format(name, check),
        );

        Ok(Api {
            ctx: DispatchContext {
                validate: self.config.validate,
                representations: self.representations,
                resolver: self.resolver,
                format_checker,
            },
            config: self.config,
            router,
            resources,
            schemas: self.schemas,
        })
    }
}

/// A REST API: routed resources plus the response policy
#[derive(Debug)]
pub struct Api {
    config: ApiConfig,
    ctx: DispatchContext,
    router: Router,
    resources: Vec<Resource>,
    schemas: SchemaRegistry,
}

impl Api {
    /// Start building an API
    #[must_use]
    pub fn builder(config: ApiConfig) -> ApiBuilder {
        ApiBuilder {
            config,
            representations: Representations::default(),
            resolver: RefResolver::new(),
            formats: Vec::new(),
            resources: Vec::new(),
            schemas: SchemaRegistry::specifications(),
        }
    }

    /// API settings
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// API-wide representations
    #[must_use]
    pub const fn representations(&self) -> &Representations {
        &self.ctx.representations
    }

    /// Specification schemas
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Answer `request`
    ///
    /// Never fails: errors are rendered as error responses.
    pub async fn handle(&self, request: Request) -> Response {
        let strip_body = request.method == hyper::Method::HEAD;
        let request = Arc::new(request);
        debug!(method = %request.method, path = %request.path, "Dispatching request");

        let mut response = self
            .dispatch(Arc::clone(&request))
            .await
            .and_then(|reply| self.make_response(&request, reply))
            .unwrap_or_else(|err| self.handle_error(&request, &err));

        if strip_body {
            response.body = Bytes::new();
        }
        response
    }

    async fn dispatch(&self, request: Arc<Request>) -> Result<Reply> {
        let (id, args) = self.router.match_route(&request.path)?;
        let resource = self
            .resources
            .get(id)
            .ok_or_else(|| Error::RouteNotFound {
                path: request.path.clone(),
            })?;
        resource.dispatch(&self.ctx, request, args).await
    }

    /// Turn a handler reply into a response
    ///
    /// # Errors
    ///
    /// - `Error::NotAcceptable` when no representation suits the client.
    /// - `Error::Abort` with 500 when the selected media type cannot be
    ///   rendered.
    pub fn make_response(&self, request: &Request, reply: Reply) -> Result<Response> {
        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Data {
                data,
                status,
                headers,
            } => self.render(
                request,
                &data,
                status.unwrap_or(StatusCode::OK),
                headers.as_ref(),
                None,
            ),
        }
    }

    /// Media type to answer `request` with, `fallback` overriding the
    /// configured default
    fn negotiate(&self, request: &Request, fallback: Option<&str>) -> Result<String> {
        let default = fallback.or(self.config.default_mediatype.as_deref());
        let accept = request.accept().map(AcceptHeader::parse).unwrap_or_default();
        if accept.is_empty() {
            return default
                .or_else(|| self.ctx.representations.first())
                .map(str::to_string)
                .ok_or(Error::NotAcceptable);
        }
        accept
            .best_match(self.ctx.representations.mediatypes())
            .or(default)
            .map(str::to_string)
            .ok_or(Error::NotAcceptable)
    }

    fn render(
        &self,
        request: &Request,
        data: &Value,
        status: StatusCode,
        headers: Option<&HeaderMap>,
        fallback: Option<&str>,
    ) -> Result<Response> {
        let mediatype = self.negotiate(request, fallback)?;
        if let Some(rendered) = self.ctx.representations.render(&mediatype, data, status, headers) {
            return rendered;
        }
        if mediatype == TEXT_PLAIN {
            return output_text(data, status, headers);
        }
        error!(mediatype = %mediatype, "Selected media type has no representation");
        Err(Error::abort(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("No representation registered for {mediatype}"),
        ))
    }

    /// Render `err` for `request`
    ///
    /// The body is `{"message": ...}`, plus `"errors"` mapping each
    /// offending field to its first violation for payload validation
    /// failures. Without a default media type, errors the client's `Accept`
    /// header cannot match are rendered with the first registered
    /// representation, or `text/plain`.
    pub fn handle_error(&self, request: &Request, err: &Error) -> Response {
        let status = err.status();
        if status.is_server_error() {
            error!(method = %request.method, path = %request.path, error = %err, "Request failed");
        } else {
            info!(method = %request.method, path = %request.path, status = status.as_u16(), "Request rejected");
        }

        let message = match err {
            Error::Abort { message, .. } => message.clone(),
            _ if status.is_server_error() => status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            _ => err.to_string(),
        };
        let mut data = json!({ "message": message });
        if let Error::PayloadValidation(errors) = err {
            data["errors"] = Value::Object(errors.to_json_map());
        }

        let mut headers = HeaderMap::new();
        if let Error::MethodNotImplemented { allowed, .. } = err {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                headers.insert(ALLOW, value);
            }
        }

        // without a default, an unmatched Accept must not turn the error into a 500
        let fallback = self
            .config
            .default_mediatype
            .is_none()
            .then(|| self.ctx.representations.first().unwrap_or(TEXT_PLAIN));

        self.render(request, &data, status, Some(&headers), fallback)
            .unwrap_or_else(|render_err| {
                error!(error = %render_err, "Failed to render error response");
                Response::text("Internal Server Error").with_status(StatusCode::INTERNAL_SERVER_ERROR)
            })
    }

    /// Validate a specification document against its schema
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::validate`].
    pub fn validate_spec(&self, document: &Value) -> Result<bool> {
        self.schemas.validate(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExpectedPayload;
    use crate::representation::output_json;
    use crate::resource::HandlerDescriptor;
    use crate::router::Method;
    use tokio_test::{assert_err, assert_ok};

    fn hello() -> Resource {
        Resource::builder("hello")
            .get(|_, _| async { Ok(json!({"hello": "world"}).into()) })
            .build()
    }

    fn api(config: ApiConfig) -> Api {
        assert_ok!(Api::builder(config).resource("/hello", hello()).build())
    }

    fn get(path: &str) -> Request {
        Request::new(hyper::Method::GET, path)
    }

    fn body_json(response: &Response) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ApiConfig::default();
        assert!(!config.validate);
        assert!(config.format_checking);
        assert_eq!(config.default_mediatype.as_deref(), Some(APPLICATION_JSON));
    }

    #[test]
    fn test_unregistered_default_mediatype_is_rejected() {
        let err = assert_err!(Api::builder(
            ApiConfig::default().with_default_mediatype("application/xml")
        )
        .build());
        assert!(matches!(err, Error::DefaultMediaTypeUnregistered { ref mediatype } if mediatype == "application/xml"));

        assert_ok!(Api::builder(ApiConfig::default().with_default_mediatype(TEXT_PLAIN)).build());
        assert_ok!(Api::builder(ApiConfig::default().with_default_mediatype("application/xml"))
            .representation("application/xml", output_json)
            .build());
    }

    #[tokio::test]
    async fn test_get_without_accept_uses_default() {
        let response = api(ApiConfig::default()).handle(get("/hello")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));
        assert_eq!(body_json(&response), json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn test_unmatched_accept_falls_back_to_default() {
        let response = api(ApiConfig::default())
            .handle(get("/hello").with_header("accept", "text/html"))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));
    }

    #[tokio::test]
    async fn test_no_default_and_no_match_is_406() {
        let api = api(ApiConfig::default().without_default_mediatype());
        let response = api
            .handle(get("/hello").with_header("accept", "text/html"))
            .await;
        assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));
        assert!(body_json(&response)["message"].is_string());
    }

    #[tokio::test]
    async fn test_q0_refuses_only_representation() {
        let api = api(ApiConfig::default().without_default_mediatype());
        let response = api
            .handle(get("/hello").with_header("accept", "application/json; q=0"))
            .await;
        assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_no_accept_and_no_default_uses_first_representation() {
        let api = Api::builder(ApiConfig::default().without_default_mediatype())
            .representations(Representations::new().with(TEXT_PLAIN, output_text))
            .resource("/hello", hello())
            .build()
            .unwrap();
        let response = api.handle(get("/hello")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some(TEXT_PLAIN));
    }

    #[tokio::test]
    async fn test_text_plain_default_renders_without_registration() {
        let api = Api::builder(ApiConfig::default().with_default_mediatype(TEXT_PLAIN))
            .representations(Representations::new())
            .resource(
                "/greeting",
                Resource::builder("greeting")
                    .get(|_, _| async { Ok(json!("hi there").into()) })
                    .build(),
            )
            .build()
            .unwrap();
        let response = api.handle(get("/greeting")).await;
        assert_eq!(response.content_type(), Some(TEXT_PLAIN));
        assert_eq!(&response.body[..], b"hi there");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = api(ApiConfig::default()).handle(get("/nowhere")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(body_json(&response)["message"]
            .as_str()
            .unwrap()
            .contains("/nowhere"));
    }

    #[tokio::test]
    async fn test_unimplemented_method_is_405_with_allow() {
        let response = api(ApiConfig::default())
            .handle(Request::new(hyper::Method::POST, "/hello"))
            .await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn test_errors_without_default_keep_their_status() {
        let api = api(ApiConfig::default().without_default_mediatype());

        let response = api
            .handle(Request::new(hyper::Method::POST, "/hello").with_header("accept", "text/html"))
            .await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("GET, HEAD"));
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));

        let response = api
            .handle(get("/nowhere").with_header("accept", "text/html"))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(body_json(&response)["message"].is_string());
    }

    #[tokio::test]
    async fn test_payload_errors_without_default_or_representations() {
        let todo = SchemaModel::new("Todo", json!({"type": "object", "required": ["task"]}));
        let api = Api::builder(ApiConfig::default().without_default_mediatype().with_validate(true))
            .representations(Representations::new())
            .resource(
                "/todos",
                Resource::builder("todos")
                    .route_with(
                        Method::Post,
                        HandlerDescriptor::new().with_expect(ExpectedPayload::Object(Arc::new(todo))),
                        |_, _| async { Ok(json!(null).into()) },
                    )
                    .build(),
            )
            .build()
            .unwrap();

        let response = api
            .handle(
                Request::new(hyper::Method::POST, "/todos")
                    .with_header("accept", "application/xml")
                    .with_json(&json!({})),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type(), Some(TEXT_PLAIN));
    }

    #[tokio::test]
    async fn test_head_strips_body() {
        let response = api(ApiConfig::default())
            .handle(Request::new(hyper::Method::HEAD, "/hello"))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_abort_keeps_status_and_message() {
        let api = Api::builder(ApiConfig::default())
            .resource(
                "/todos/{todo_id}",
                Resource::builder("todo")
                    .get(|_, args: crate::router::UrlArgs| async move {
                        let id = args.get("todo_id").unwrap_or_default().to_string();
                        Err(Error::abort(
                            StatusCode::NOT_FOUND,
                            format!("Todo {id} doesn't exist"),
                        ))
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let response = api.handle(get("/todos/7")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(body_json(&response), json!({"message": "Todo 7 doesn't exist"}));
    }

    #[tokio::test]
    async fn test_payload_validation_lists_errors() {
        let todo = SchemaModel::new(
            "Todo",
            json!({
                "type": "object",
                "required": ["task"],
                "properties": {"task": {"type": "string"}}
            }),
        );
        let api = Api::builder(ApiConfig::default().with_validate(true))
            .model(&todo)
            .resource(
                "/todos",
                Resource::builder("todos")
                    .route_with(
                        Method::Post,
                        HandlerDescriptor::new().with_expect(ExpectedPayload::Object(Arc::new(todo))),
                        |_, _| async { Ok((json!({"id": 1}), StatusCode::CREATED).into()) },
                    )
                    .build(),
            )
            .build()
            .unwrap();

        let ok = api
            .handle(Request::new(hyper::Method::POST, "/todos").with_json(&json!({"task": "write"})))
            .await;
        assert_eq!(ok.status, StatusCode::CREATED);

        let rejected = api
            .handle(Request::new(hyper::Method::POST, "/todos").with_json(&json!({"task": 1})))
            .await;
        assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
        let body = body_json(&rejected);
        assert_eq!(body["message"], json!("Input payload validation failed"));
        assert!(body["errors"]["task"].is_string());
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let api = Api::builder(ApiConfig::default())
            .resource(
                "/broken",
                Resource::builder("broken")
                    .get(|_, _| async {
                        Err(Error::Io(std::io::Error::other("disk on fire")))
                    })
                    .build(),
            )
            .build()
            .unwrap();
        let response = api.handle(get("/broken")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response), json!({"message": "Internal Server Error"}));
    }

    #[test]
    fn test_validate_spec() {
        let api = api(ApiConfig::default());
        let valid = assert_ok!(api.validate_spec(&json!({
            "swagger": "2.0",
            "info": {"title": "Todo API", "version": "1.0"},
            "paths": {}
        })));
        assert!(valid);
        assert_err!(api.validate_spec(&json!({"openapi": "3.0.0"})));
    }
}
