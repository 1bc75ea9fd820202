//! HTTP request dispatching.
//!
//! A request is matched to a service by its host, an instance is picked by
//! the service's scheduler, and the request is forwarded over a fresh
//! connection. The response is streamed back in bounded chunks.

mod body;
mod dispatcher;
mod error_page;

pub use body::ChunkedBody;
pub use dispatcher::{select_instance, DispatchError, Dispatcher, Selection};
pub use error_page::error_page;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;

/// Body type of every response the dispatcher produces.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;
