//! STUN server endpoint parsing and resolution.

use crate::error::{Result, StunError};
use crate::stun::DEFAULT_PORT;
use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs};

/// A configured STUN server, `host` or `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    host: String,
    port: u16,
}

impl ServerEndpoint {
    /// Parse `host` (port 3478) or `host:port`
    ///
    /// # Errors
    ///
    /// Returns [`StunError::InvalidServer`] for an empty host, a port that is
    /// not a number, or port 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use natscout_discovery::ServerEndpoint;
    ///
    /// let server = ServerEndpoint::parse("stun.example.org").unwrap();
    /// assert_eq!(server.port(), 3478);
    ///
    /// let server = ServerEndpoint::parse("198.51.100.1:3479").unwrap();
    /// assert_eq!(server.host(), "198.51.100.1");
    /// assert_eq!(server.port(), 3479);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || StunError::InvalidServer(input.to_string());

        let (host, port) = match input.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (input, DEFAULT_PORT),
        };

        if host.is_empty() || port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host name or address literal
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// UDP port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to the first IPv4 address
    ///
    /// # Errors
    ///
    /// Returns [`StunError::Resolve`] when the lookup fails or yields no
    /// IPv4 address.
    pub fn resolve(&self) -> Result<SocketAddrV4> {
        let resolve_err = |reason: String| StunError::Resolve {
            host: self.host.clone(),
            reason,
        };

        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| resolve_err(e.to_string()))?;

        let resolved = addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| resolve_err("no IPv4 address".to_string()))?;

        tracing::debug!("Resolved STUN server {} to {}", self, resolved);
        Ok(resolved)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
