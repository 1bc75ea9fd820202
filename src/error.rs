//! Error classification shared by every layer of the balancer.
//!
//! Each module owns its own `thiserror` enum. `ErrorKind` is the coarse
//! category callers match on without caring which layer failed.

use std::fmt;

/// Coarse category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A node, service, instance, deployment or route lookup failed.
    NotFound,
    /// A uniqueness constraint was violated on create or register.
    AlreadyExists,
    /// Live references block the removal; force or detach first.
    NotRemovable,
    /// Malformed identifiers or options, rejected before any mutation.
    InvalidArgument,
    /// The requested balancing method has no scheduler.
    UnsupportedBalancingMethod,
    /// The scheduler found nothing eligible.
    NoHealthyInstance,
    /// Connecting or sending to the upstream instance failed.
    UpstreamDialFailure,
    /// Reading the upstream response failed.
    UpstreamStreamFailure,
    /// Storage backend or other unexpected failure.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotRemovable => "not removable",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::UnsupportedBalancingMethod => "unsupported balancing method",
            ErrorKind::NoHealthyInstance => "no healthy instance",
            ErrorKind::UpstreamDialFailure => "upstream dial failure",
            ErrorKind::UpstreamStreamFailure => "upstream stream failure",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}
