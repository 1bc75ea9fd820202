//! Utility functions and helpers.

mod logging;
mod net;
mod request_id;
mod shutdown;

pub use logging::init_logging;
pub use net::{dial, DialError};
pub use request_id::{RequestId, REQUEST_ID_HEADER};
pub use shutdown::ShutdownSignal;
