//! # HTTP Server
//!
//! Serves an [`Api`] over HTTP/1 with Hyper and Tokio.
//!
//! ## Key Features
//!
//! - One task per connection
//! - `x-request-id` generated when the client sends none, echoed back
//! - Request bodies above the configured limit answered with 413
//! - Graceful shutdown on Ctrl-C, draining in-flight connections

use crate::api::Api;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Install a JSON `tracing` subscriber
///
/// `RUST_LOG` overrides the default `restplus_core=info` filter. Does
/// nothing when a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("restplus_core=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP server for one [`Api`]
pub struct Server {
    config: ServerConfig,
    api: Arc<Api>,
}

impl Server {
    /// Serve `api` with the default configuration
    pub fn new(api: Api) -> Self {
        Self::with_config(api, ServerConfig::default())
    }

    /// Serve `api` with `config`
    pub fn with_config(api: Api, config: ServerConfig) -> Self {
        Self {
            config,
            api: Arc::new(api),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// The served API
    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Accept connections until Ctrl-C, then drain
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the socket cannot be bound or accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true)?;
        }
        socket.bind(addr)?;

        let listener = socket.listen(1024)?;

        info!("Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let api = Arc::clone(&self.api);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service_fn(move |req| {
                                let api = Arc::clone(&api);
                                async move {
                                    let method = req.method().clone();
                                    let path = req.uri().path().to_string();
                                    let version = format!("{:?}", req.version());

                                    let response = handle_request(req, &api, remote_addr, max_body_size).await;
                                    info!(
                                        "    {} - \"{} {} {}\" {}",
                                        remote_addr,
                                        method,
                                        path,
                                        version,
                                        response.status()
                                    );
                                    Ok::<_, hyper::Error>(response)
                                }
                            }))
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout;
        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            info!(
                remaining = active.load(Ordering::Relaxed),
                "Shutdown timeout elapsed with connections still open"
            );
        }
        Ok(())
    }

    /// Run `request` through the full pipeline without a socket
    pub async fn test_request(&self, mut request: Request) -> Response {
        if let Some(actual) = request
            .body_bytes()
            .map(<[u8]>::len)
            .filter(|len| *len > self.config.max_body_size)
        {
            let err = Error::PayloadTooLarge {
                limit: self.config.max_body_size,
                actual,
            };
            return self.api.handle_error(&request, &err);
        }
        request.set_header("x-client-ip", "test");
        process_request(request, &self.api).await
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", err);
        std::future::pending::<()>().await;
    }
}

/// Core request processing logic (network agnostic)
async fn process_request(mut request: Request, api: &Api) -> Response {
    let request_id = match request.header("x-request-id") {
        Some(id) => id.to_string(),
        None => {
            let id = generate_request_id();
            request.set_header("x-request-id", &id);
            id
        }
    };

    let mut response = api.handle(request).await;
    response.set_header("x-request-id", &request_id);
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    api: &Api,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let mut summary = Request::new(req.method().clone(), req.uri().path());
    if let Some(accept) = req.headers().get(hyper::header::ACCEPT).and_then(|v| v.to_str().ok()) {
        summary.set_header("accept", accept);
    }

    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(e) => {
            if !matches!(e, Error::PayloadTooLarge { .. }) {
                error!("Failed to read request: {}", e);
            }
            return api.handle_error(&summary, &e).into_hyper();
        }
    };

    request.set_header("x-client-ip", &remote_addr.ip().to_string());
    process_request(request, api).await.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiConfig;
    use crate::resource::{Reply, Resource};
    use hyper::StatusCode;
    use serde_json::json;

    fn server() -> Server {
        let api = Api::builder(ApiConfig::default())
            .resource(
                "/todos",
                Resource::builder("todos")
                    .get(|_, _| async { Ok(json!([]).into()) })
                    .post(|req, _| async move {
                        req.json()
                            .map(|todo| Reply::from((todo, StatusCode::CREATED)))
                    })
                    .build(),
            )
            .build()
            .unwrap();
        Server::new(api)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert_eq!(config.max_body_size, 1024 * 1024);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let response = server()
            .test_request(Request::new(hyper::Method::GET, "/todos"))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let response = server()
            .test_request(Request::new(hyper::Method::GET, "/todos").with_header("x-request-id", "abc-1"))
            .await;
        assert_eq!(response.header("x-request-id"), Some("abc-1"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut server = server();
        server.set_max_body_size(8);
        let response = server
            .test_request(
                Request::new(hyper::Method::POST, "/todos")
                    .with_json(&json!({"task": "far too long for the limit"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);

        let response = server
            .test_request(Request::new(hyper::Method::POST, "/todos").with_json(&json!(1)))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
