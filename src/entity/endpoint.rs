//! Network endpoint parsing for node URLs and instance addresses.

use super::EntityError;
use hyper::http::uri::Authority;
use std::fmt;

/// A host with an optional port, extracted from a URL or `host:port` string.
///
/// Instance addresses may also be given as a bare port (`8080` or `:8080`),
/// in which case the host is empty until filled in from the hosting node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    /// Parse an endpoint.
    ///
    /// Accepts `host`, `host:port`, `:port`, `port` and URLs such as
    /// `http://host:port/path`. A URL scheme of `http` or `https` supplies
    /// the default port when none is given.
    pub fn parse(raw: &str) -> Result<Self, EntityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "address is empty"));
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, trimmed),
        };

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let authority = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);

        let default_port = match scheme.as_deref() {
            Some("http") => Some(80),
            Some("https") => Some(443),
            _ => None,
        };

        // Bare port forms leave the host to be filled in by the caller.
        let bare_port = authority
            .strip_prefix(':')
            .or_else(|| scheme.is_none().then_some(authority))
            .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

        if let Some(port) = bare_port {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid(raw, "port is out of range"))?;
            return Ok(Self {
                host: String::new(),
                port: Some(port),
            });
        }

        let parsed: Authority = authority
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| invalid(raw, &e.to_string()))?;

        if parsed.host().is_empty() {
            return Err(invalid(raw, "host is empty"));
        }

        Ok(Self {
            host: parsed.host().to_string(),
            port: parsed.port_u16().or(default_port),
        })
    }

    /// The host part, empty for bare ports.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, if one was given or implied by the scheme.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Fill in the host if this endpoint was a bare port.
    pub fn or_host(mut self, host: &str) -> Self {
        if self.host.is_empty() {
            self.host = host.to_string();
        }
        self
    }

    /// The `host:port` form used for dialing, if both parts are known.
    pub fn authority(&self) -> Option<String> {
        match self.port {
            Some(port) if !self.host.is_empty() => Some(format!("{}:{}", self.host, port)),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

fn invalid(address: &str, reason: &str) -> EntityError {
    EntityError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
