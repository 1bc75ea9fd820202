//! Admin HTTP server.
//!
//! Serves Prometheus metrics, a liveness endpoint and a plain-text dump of
//! the live topology.

use crate::registry::ServiceRegistry;
use crate::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Admin HTTP server.
pub struct MetricsServer {
    address: SocketAddr,
    /// Path of the metrics endpoint
    path: String,
    state: AppState,
}

impl MetricsServer {
    pub fn new(address: SocketAddr, path: String, state: AppState) -> Self {
        Self {
            address,
            path,
            state,
        }
    }

    /// Run the server until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(self.address).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, address = %self.address, "failed to bind metrics server");
                return;
            }
        };

        info!(address = %self.address, path = %self.path, "metrics server started");

        let state = self.state;
        let path: Arc<str> = Arc::from(self.path);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let state = state.clone();
                            let path = Arc::clone(&path);

                            tokio::spawn(async move {
                                let service = service_fn(move |req: Request<Incoming>| {
                                    let response = handle_request(&req, &state, &path);
                                    async move { Ok::<_, Infallible>(response) }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

fn handle_request<B>(req: &Request<B>, state: &AppState, metrics_path: &str) -> Response<Full<Bytes>> {
    let path = req.uri().path();
    debug!(path = %path, method = %req.method(), "metrics request");

    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, TEXT_CONTENT_TYPE, "Method not allowed\n");
    }

    if path == metrics_path {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, state.metrics().registry()) {
            error!(error = %e, "failed to encode metrics");
            return text(
                StatusCode::INTERNAL_SERVER_ERROR,
                TEXT_CONTENT_TYPE,
                "Failed to encode metrics\n",
            );
        }
        return text(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, buffer);
    }

    match path {
        "/health" | "/healthz" => text(StatusCode::OK, TEXT_CONTENT_TYPE, "OK\n"),
        "/topology" => text(StatusCode::OK, TEXT_CONTENT_TYPE, topology(&state.registry())),
        "/" => {
            let body = format!(
                "dice admin server\n\nEndpoints:\n  {} - Prometheus metrics\n  /healthz - Liveness\n  /topology - Services, routes and deployments\n",
                metrics_path
            );
            text(StatusCode::OK, TEXT_CONTENT_TYPE, body)
        }
        _ => text(StatusCode::NOT_FOUND, TEXT_CONTENT_TYPE, "Not found\n"),
    }
}

fn text(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// One block per service, sorted by name.
fn topology(registry: &ServiceRegistry) -> String {
    let mut blocks: Vec<(String, String)> = registry
        .services()
        .iter()
        .map(|entry| {
            let service = entry.read();
            let entity = service.entity();

            let mut block = format!(
                "service {} [{}] {}\n",
                entity.name,
                if entity.is_enabled { "enabled" } else { "disabled" },
                entity.balancing_method
            );
            if !entity.target_version.is_empty() {
                block.push_str(&format!("  target version: {}\n", entity.target_version));
            }
            for route in &entity.routes {
                block.push_str(&format!("  route {}\n", route));
            }
            for d in service.deployments() {
                block.push_str(&format!(
                    "  instance {} {} on {} weight={} {} {}\n",
                    d.instance.name,
                    d.instance.address,
                    d.node.name,
                    d.node.weight,
                    if d.instance.is_attached && d.node.is_attached {
                        "attached"
                    } else {
                        "detached"
                    },
                    if d.instance.is_alive { "alive" } else { "dead" },
                ));
            }
            (entity.name.clone(), block)
        })
        .collect();

    blocks.sort_by(|a, b| a.0.cmp(&b.0));
    blocks.into_iter().map(|(_, block)| block).collect()
}
