//! Proxy listener implementation.

use crate::metrics::MetricsCollector;
use crate::proxy::Dispatcher;
use crate::state::AppState;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Pending connection queue length.
const BACKLOG: i32 = 1024;

/// Listener accepting client connections.
pub struct ProxyListener {
    listener: TcpListener,
    dispatcher: Dispatcher,
    metrics: MetricsCollector,
}

impl ProxyListener {
    /// Bind the listening socket with `SO_REUSEADDR` set.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(address: SocketAddr, state: AppState) -> io::Result<Self> {
        let listener = TcpListener::from_std(bind_socket(address)?)?;
        info!(listen = %listener.local_addr()?, "proxy listener bound");

        Ok(Self {
            listener,
            metrics: state.metrics().clone(),
            dispatcher: Dispatcher::new(state),
        })
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    ///
    /// Connections already accepted are served to completion.
    #[instrument(skip_all, fields(listen = ?self.listener.local_addr().ok()))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("proxy listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }

                _ = shutdown.recv() => {
                    info!("proxy listener shutting down");
                    break;
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        metrics.connection_opened();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let service = service_fn(move |req: Request<Incoming>| {
                let dispatcher = dispatcher.clone();
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req, client_addr).await) }
            });

            let result = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(TokioIo::new(stream), service)
                .await;

            metrics.connection_closed();

            let duration = start_time.elapsed();
            match result {
                Ok(()) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                ),
                Err(e) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection closed with error"
                ),
            }
        });
    }
}

fn bind_socket(address: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&address.into())?;
    socket.listen(BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
