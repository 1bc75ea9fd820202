//! Outbound TCP connections to instances.

use crate::error::ErrorKind;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Errors from `dial`.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to connect to {0}: {1}")]
    Connect(String, #[source] io::Error),

    #[error("connection to {0} timed out")]
    Timeout(String),
}

impl DialError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamDialFailure
    }
}

/// Open a TCP connection with a deadline.
///
/// The returned stream has `TCP_NODELAY` set.
pub async fn dial(address: &str, deadline: Duration) -> Result<TcpStream, DialError> {
    let stream = match timeout(deadline, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(DialError::Connect(address.to_string(), e)),
        Err(_) => return Err(DialError::Timeout(address.to_string())),
    };

    stream
        .set_nodelay(true)
        .map_err(|e| DialError::Connect(address.to_string(), e))?;
    Ok(stream)
}
