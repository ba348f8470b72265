//! Transport error types.

use std::io;
use std::net::Ipv4Addr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No port in the range could be bound
    #[error("failed to bind {addr} in port range {base}-{max}")]
    BindFailed {
        /// Interface address
        addr: Ipv4Addr,
        /// First port of the range
        base: u16,
        /// Last port of the range
        max: u16,
    },

    /// Port range bounds are inconsistent
    #[error("invalid port range {base}-{max}")]
    InvalidPortRange {
        /// First port of the range
        base: u16,
        /// Last port of the range
        max: u16,
    },

    /// Interface enumeration failed
    #[error("interface enumeration failed: {0}")]
    InterfaceEnumeration(io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
