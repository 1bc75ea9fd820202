//! Client-facing listener.
//!
//! Accepts client connections and serves HTTP/1.1 on them, handing every
//! request to the dispatcher.

mod listener;

pub use listener::ProxyListener;
