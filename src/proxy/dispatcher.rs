//! Route resolution and request forwarding.

use super::{error_page, ChunkedBody, ProxyBody};
use crate::entity::Instance;
use crate::error::ErrorKind;
use crate::metrics::{RequestTimer, UNROUTED};
use crate::registry::ServiceRegistry;
use crate::scheduler::SchedulerError;
use crate::state::AppState;
use crate::util::{dial, DialError, RequestId};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::HOST;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn, Span};

/// Reasons a request could not be forwarded.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request has no host to route on")]
    MissingHost,

    #[error("no service is registered for route '{0}'")]
    UnknownRoute(String),

    #[error("service '{0}' is disabled")]
    ServiceDisabled(String),

    #[error("service '{0}' has no scheduler")]
    NoScheduler(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error("handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: hyper::Error,
    },

    #[error("forwarding to {address} failed: {source}")]
    Send {
        address: String,
        #[source]
        source: hyper::Error,
    },

    #[error("no response from {address} within {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("reading the response from {address} failed: {source}")]
    FirstFrame {
        address: String,
        #[source]
        source: hyper::Error,
    },
}

impl DispatchError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::MissingHost
            | DispatchError::UnknownRoute(_)
            | DispatchError::ServiceDisabled(_) => ErrorKind::NotFound,
            DispatchError::NoScheduler(_) => ErrorKind::UnsupportedBalancingMethod,
            DispatchError::Scheduler(e) => e.kind(),
            DispatchError::Dial(_)
            | DispatchError::Handshake { .. }
            | DispatchError::Send { .. }
            | DispatchError::Timeout { .. } => ErrorKind::UpstreamDialFailure,
            DispatchError::FirstFrame { .. } => ErrorKind::UpstreamStreamFailure,
        }
    }

    /// Status code of the error page sent to the client.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::UpstreamDialFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::UpstreamStreamFailure => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// The instance picked for one request.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Name of the service the route resolved to
    pub service: String,
    pub instance: Instance,
}

/// Resolve `route` and ask the service's scheduler for an instance.
///
/// The service lock is released before this returns, so nothing is held
/// while the instance is dialed.
pub fn select_instance(registry: &ServiceRegistry, route: &str) -> Result<Selection, DispatchError> {
    let entry = registry
        .lookup_service(route)
        .ok_or_else(|| DispatchError::UnknownRoute(route.to_string()))?;
    let service = entry.read();

    let name = service.entity().name.clone();
    if !service.entity().is_enabled {
        return Err(DispatchError::ServiceDisabled(name));
    }

    let scheduler = service
        .scheduler()
        .ok_or_else(|| DispatchError::NoScheduler(name.clone()))?;
    let instance = scheduler.next()?;

    Ok(Selection {
        service: name,
        instance,
    })
}

/// Forwards client requests to the instances of the matching service.
#[derive(Clone)]
pub struct Dispatcher {
    state: AppState,
}

impl Dispatcher {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Handle one client request.
    ///
    /// Never fails: every error becomes an HTML error page. The `Host` header
    /// and the rest of the request are forwarded unchanged apart from the URI,
    /// which is reduced to origin form.
    #[instrument(skip_all, fields(
        method = %req.method(),
        uri = %req.uri(),
        client = %client,
        request_id = tracing::field::Empty,
        service = tracing::field::Empty,
        instance = tracing::field::Empty,
    ))]
    pub async fn dispatch<B>(&self, req: Request<B>, client: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let timer = self.state.metrics().start_request_timer();
        let method = req.method().clone();
        let span = Span::current();
        span.record("request_id", RequestId::from_headers(req.headers()).as_str());

        let registry = self.state.registry();
        let selection = match route_of(&req)
            .ok_or(DispatchError::MissingHost)
            .and_then(|route| select_instance(&registry, &route))
        {
            Ok(selection) => selection,
            Err(e) => return fail(timer, UNROUTED, &method, e),
        };
        span.record("service", selection.service.as_str());
        span.record("instance", selection.instance.name.as_str());

        match self.forward(req, &selection.instance.address).await {
            Ok(response) => {
                let status = response.status();
                debug!(status = status.as_u16(), "response head received");
                timer.record(&selection.service, method.as_str(), status.as_u16());
                response
            }
            Err(e) => fail(timer, &selection.service, &method, e),
        }
    }

    /// Send the request to `address` and return once the first body frame
    /// of the response has arrived.
    ///
    /// The response head and first frame must arrive within the configured
    /// `response_timeout`.
    async fn forward<B>(
        &self,
        mut req: Request<B>,
        address: &str,
    ) -> Result<Response<ProxyBody>, DispatchError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (connect_timeout, response_timeout, chunk_size) = {
            let config = self.state.config();
            (
                config.proxy.connect_timeout,
                config.proxy.response_timeout,
                config.proxy.chunk_size,
            )
        };

        let stream = dial(address, connect_timeout).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|source| DispatchError::Handshake {
                address: address.to_string(),
                source,
            })?;

        // Drives the upstream connection until the response body is done.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "upstream connection closed with error");
            }
        });

        *req.uri_mut() = origin_form(req.uri());

        let exchange = async {
            let response = sender
                .send_request(req)
                .await
                .map_err(|source| DispatchError::Send {
                    address: address.to_string(),
                    source,
                })?;

            let (parts, mut body) = response.into_parts();
            let first = match body.frame().await {
                Some(Ok(frame)) => Some(frame),
                Some(Err(source)) => {
                    return Err(DispatchError::FirstFrame {
                        address: address.to_string(),
                        source,
                    });
                }
                None => None,
            };
            Ok::<_, DispatchError>((parts, body, first))
        };

        let (parts, body, first) = tokio::time::timeout(response_timeout, exchange)
            .await
            .map_err(|_| DispatchError::Timeout {
                address: address.to_string(),
                timeout: response_timeout,
            })??;

        let body = ChunkedBody::with_prefix(body, first, chunk_size).boxed();
        Ok(Response::from_parts(parts, body))
    }
}

fn fail(timer: RequestTimer, service: &str, method: &Method, error: DispatchError) -> Response<ProxyBody> {
    let status = error.status();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        warn!(error = %error, kind = %error.kind(), "request not routed");
    } else {
        error!(error = %error, kind = %error.kind(), "upstream request failed");
    }

    timer.record(service, method.as_str(), status.as_u16());
    error_page(status, &error.to_string())
}

/// The `Host` header, or the URI authority when the header is absent.
fn route_of<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty());

    match host {
        Some(host) => Some(host.to_string()),
        None => req.uri().authority().map(|a| a.as_str().to_string()),
    }
}

fn origin_form(uri: &Uri) -> Uri {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Uri::builder().path_and_query(path).build().unwrap_or_default()
}
