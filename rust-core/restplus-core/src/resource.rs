//! # Resources
//!
//! A resource is a set of handlers keyed by HTTP verb, mounted on one URL
//! rule. Dispatching a request to it:
//!
//! 1. resolves the handler for the verb (`HEAD` falls back to `GET`),
//! 2. wraps it with the resource's method decorators, in order,
//! 3. validates the JSON payload against the models the handler expects,
//! 4. awaits the handler,
//! 5. returns a ready-made [`Response`] untouched, or renders data with
//!    the representation the client's `Accept` header prefers.
//!
//! When nothing matches the data reply is returned as is; the [`Api`]
//! applies its default media type policy.
//!
//! [`Api`]: crate::api::Api

use crate::error::{Error, Result};
use crate::model::{ExpectedPayload, FormatChecker, RefResolver};
use crate::negotiation::AcceptHeader;
use crate::representation::Representations;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Method, UrlArgs};
use crate::validation::ValidationErrors;
use hyper::{HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// What a handler produces
#[derive(Debug, Clone)]
pub enum Reply {
    /// A fully formed response, sent without negotiation
    Response(Response),
    /// Data to render, with optional status (default 200) and headers
    Data {
        /// Payload
        data: Value,
        /// Status code
        status: Option<StatusCode>,
        /// Extra headers
        headers: Option<HeaderMap>,
    },
}

impl Reply {
    /// A data reply with default status and no headers
    #[must_use]
    pub const fn data(data: Value) -> Self {
        Self::Data {
            data,
            status: None,
            headers: None,
        }
    }
}

impl From<Value> for Reply {
    fn from(data: Value) -> Self {
        Self::data(data)
    }
}

impl From<(Value, StatusCode)> for Reply {
    fn from((data, status): (Value, StatusCode)) -> Self {
        Self::Data {
            data,
            status: Some(status),
            headers: None,
        }
    }
}

impl From<(Value, StatusCode, HeaderMap)> for Reply {
    fn from((data, status, headers): (Value, StatusCode, HeaderMap)) -> Self {
        Self::Data {
            data,
            status: Some(status),
            headers: Some(headers),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Future returned by a handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply>> + Send>>;

/// Request handler: the request plus the captured URL arguments
pub type Handler = Arc<dyn Fn(Arc<Request>, UrlArgs) -> HandlerFuture + Send + Sync>;

/// Wraps a handler into another handler
pub type MethodDecorator = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Box an async function into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    Arc::new(move |request, args| Box::pin(f(request, args)))
}

/// Documentation attached to a handler: the payloads it expects and
/// whether to validate them
#[derive(Debug, Clone, Default)]
pub struct HandlerDescriptor {
    /// Expected payloads, checked in order
    pub expect: Vec<ExpectedPayload>,
    /// Per-handler override of the API-wide validation flag
    pub validate: Option<bool>,
}

impl HandlerDescriptor {
    /// An empty descriptor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected payload
    #[must_use]
    pub fn with_expect(mut self, expect: ExpectedPayload) -> Self {
        self.expect.push(expect);
        self
    }

    /// Force validation on or off for this handler
    #[must_use]
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = Some(validate);
        self
    }
}

/// API-wide state the dispatcher reads
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Default for payload validation
    pub validate: bool,
    /// Registered representations
    pub representations: Representations,
    /// Model definitions for `$ref` resolution
    pub resolver: RefResolver,
    /// `format` keyword policy
    pub format_checker: FormatChecker,
}

#[derive(Clone)]
struct MethodHandler {
    handler: Handler,
    descriptor: Option<HandlerDescriptor>,
}

/// Handlers for one URL rule
#[derive(Clone)]
pub struct Resource {
    name: String,
    handlers: BTreeMap<Method, MethodHandler>,
    decorators: Vec<MethodDecorator>,
    representations: Option<Representations>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .field("decorators", &self.decorators.len())
            .field("representations", &self.representations)
            .finish()
    }
}

impl Resource {
    /// Start building a resource called `name`
    pub fn builder(name: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder {
            resource: Self {
                name: name.into(),
                handlers: BTreeMap::new(),
                decorators: Vec::new(),
                representations: None,
            },
        }
    }

    /// Resource name, used as its endpoint
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Verbs this resource answers, `HEAD` included when `GET` is present
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().copied().collect();
        if self.handlers.contains_key(&Method::Get) && !self.handlers.contains_key(&Method::Head) {
            methods.push(Method::Head);
            methods.sort_unstable();
        }
        methods
    }

    /// The representation override of this resource
    #[must_use]
    pub const fn representations(&self) -> Option<&Representations> {
        self.representations.as_ref()
    }

    fn resolve(&self, method: &hyper::Method) -> Result<&MethodHandler> {
        let verb = Method::parse(method.as_str());
        let found = verb.and_then(|verb| {
            self.handlers.get(&verb).or_else(|| {
                (verb == Method::Head)
                    .then(|| self.handlers.get(&Method::Get))
                    .flatten()
            })
        });
        found.ok_or_else(|| Error::MethodNotImplemented {
            method: method.as_str().to_string(),
            allowed: self
                .allowed_methods()
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
    }

    fn decorate(&self, handler: &Handler) -> Handler {
        self.decorators
            .iter()
            .fold(Arc::clone(handler), |handler, decorator| decorator(handler))
    }

    /// Check the request body against every payload `descriptor` expects
    fn validate_payload(
        ctx: &DispatchContext,
        descriptor: &HandlerDescriptor,
        request: &Request,
    ) -> Result<()> {
        if !descriptor.validate.unwrap_or(ctx.validate) || descriptor.expect.is_empty() {
            return Ok(());
        }

        let data = request.json()?;
        let mut errors = ValidationErrors::new();
        for expected in &descriptor.expect {
            let model = expected.model();
            let result = match (expected, &data) {
                (ExpectedPayload::Collection(_), Value::Array(items)) => {
                    model.validate_each(items, &ctx.resolver, &ctx.format_checker)
                }
                _ => model.validate(&data, &ctx.resolver, &ctx.format_checker),
            };
            if let Err(payload_errors) = result {
                errors.extend(payload_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(
                path = %request.path,
                violations = errors.len(),
                "Payload validation failed"
            );
            Err(Error::PayloadValidation(errors))
        }
    }

    /// Run the handler for `request` and negotiate its representation
    ///
    /// # Errors
    ///
    /// - `Error::MethodNotImplemented` when no handler serves the verb.
    /// - `Error::BadRequest` / `Error::PayloadValidation` when the payload
    ///   is malformed or does not match the expected models.
    /// - Any error the handler or renderer returns.
    pub async fn dispatch(
        &self,
        ctx: &DispatchContext,
        request: Arc<Request>,
        args: UrlArgs,
    ) -> Result<Reply> {
        let method_handler = self.resolve(&request.method)?;
        let handler = self.decorate(&method_handler.handler);

        if let Some(descriptor) = &method_handler.descriptor {
            Self::validate_payload(ctx, descriptor, &request)?;
        }

        let reply = handler(Arc::clone(&request), args).await?;

        let (data, status, headers) = match reply {
            Reply::Response(response) => return Ok(Reply::Response(response)),
            Reply::Data {
                data,
                status,
                headers,
            } => (data, status.unwrap_or(StatusCode::OK), headers),
        };

        let representations = self.representations.as_ref().unwrap_or(&ctx.representations);
        let accept = request.accept().map(AcceptHeader::parse).unwrap_or_default();
        if let Some(mediatype) = accept.best_match(representations.mediatypes()) {
            if let Some(rendered) = representations.render(mediatype, &data, status, headers.as_ref()) {
                debug!(resource = %self.name, mediatype, "Negotiated representation");
                return rendered.map(Reply::Response);
            }
        }

        Ok(Reply::Data {
            data,
            status: Some(status),
            headers,
        })
    }
}

/// Builder for [`Resource`]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Register `f` for `method`
    #[must_use]
    pub fn route<F, Fut>(self, method: Method, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route_handler(method, handler(f), None)
    }

    /// Register `f` for `method` together with its descriptor
    #[must_use]
    pub fn route_with<F, Fut>(self, method: Method, descriptor: HandlerDescriptor, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route_handler(method, handler(f), Some(descriptor))
    }

    /// Register an already boxed handler, replacing any for `method`
    #[must_use]
    pub fn route_handler(
        mut self,
        method: Method,
        handler: Handler,
        descriptor: Option<HandlerDescriptor>,
    ) -> Self {
        self.resource.handlers.insert(
            method,
            MethodHandler {
                handler,
                descriptor,
            },
        );
        self
    }

    /// Register a `GET` handler
    #[must_use]
    pub fn get<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route(Method::Get, f)
    }

    /// Register a `POST` handler
    #[must_use]
    pub fn post<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route(Method::Post, f)
    }

    /// Register a `PUT` handler
    #[must_use]
    pub fn put<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route(Method::Put, f)
    }

    /// Register a `DELETE` handler
    #[must_use]
    pub fn delete<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Request>, UrlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        self.route(Method::Delete, f)
    }

    /// Add a decorator; decorators wrap the handler in registration order
    #[must_use]
    pub fn method_decorator<F>(mut self, decorator: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        self.resource.decorators.push(Arc::new(decorator));
        self
    }

    /// Use `representations` instead of the API-wide registry
    #[must_use]
    pub fn representations(mut self, representations: Representations) -> Self {
        self.resource.representations = Some(representations);
        self
    }

    /// Finish the resource
    #[must_use]
    pub fn build(self) -> Resource {
        self.resource
    }
}
