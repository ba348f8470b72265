//! STUN client error types.
//!
//! Lower layers (codec, poller) report failures through [`StunError`]; the
//! classifier never surfaces them and instead maps every failure to a
//! terminal [`NatType`](crate::nat::NatType).

use crate::nat::NatType;
use natscout_transport::TransportError;
use thiserror::Error;

/// Errors produced by the STUN client
#[derive(Debug, Error)]
pub enum StunError {
    // ============ Codec Errors ============
    /// Datagram shorter than the 20-byte header
    #[error("STUN message too short: {0} bytes")]
    MessageTooShort(usize),

    /// Unknown message type code
    #[error("invalid STUN message type 0x{0:04x}")]
    InvalidMessageType(u16),

    /// Attribute header or value runs past the end of the datagram
    #[error("STUN attribute overruns message at offset {offset}")]
    AttributeOverrun {
        /// Byte offset of the offending attribute header
        offset: usize,
    },

    /// Attribute value is malformed for its type
    #[error("invalid STUN attribute 0x{0:04x}")]
    InvalidAttribute(u16),

    /// Encoded message would exceed the maximum datagram size
    #[error("STUN message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// ERROR-CODE value does not fit the 3-bit class field
    #[error("invalid STUN error code {0}")]
    InvalidErrorCode(u16),

    /// Unknown comprehension-required attribute type
    #[error("unknown comprehension-required STUN attribute 0x{0:04x}")]
    UnknownRequiredAttribute(u16),

    // ============ Exchange Errors ============
    /// Every attempt timed out or was answered with garbage
    #[error("no STUN response after {attempts} attempts")]
    NoResponse {
        /// Number of requests transmitted
        attempts: u32,
    },

    /// Server answered with a Binding Error Response
    #[error("STUN error response {code}: {reason}")]
    ErrorResponse {
        /// Error code (class * 100 + number)
        code: u16,
        /// Reason phrase
        reason: String,
    },

    /// Response lacks a required attribute
    #[error("STUN response missing {0}")]
    MissingAttribute(&'static str),

    // ============ Configuration Errors ============
    /// Server string is empty or has an invalid port
    #[error("invalid STUN server '{0}'")]
    InvalidServer(String),

    /// No server has been configured
    #[error("no STUN server configured")]
    ServerNotConfigured,

    /// Server host name did not resolve to an IPv4 address
    #[error("failed to resolve STUN server '{host}': {reason}")]
    Resolve {
        /// Host name
        host: String,
        /// Resolver message
        reason: String,
    },

    /// Symmetric NAT needs a configured local port range
    #[error("a local port range is required for {0}")]
    PortRangeRequired(NatType),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ============ Socket Factory Errors ============
    /// NAT type offers no traversal strategy
    #[error("socket creation unsupported behind {0}")]
    Unsupported(NatType),

    /// No candidate pair had adjacent even/odd external ports
    #[error("no adjacent even/odd external port pair among {candidates} candidates")]
    NoAdjacentPair {
        /// Number of candidates that produced a mapping
        candidates: usize,
    },

    // ============ Resource Errors ============
    /// Transport layer failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StunError {
    /// Whether the peer never produced a usable answer
    #[must_use]
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse { .. })
    }

    /// Whether the failure is a configuration problem that retrying will not fix
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidServer(_)
                | Self::ServerNotConfigured
                | Self::Resolve { .. }
                | Self::PortRangeRequired(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Result type for STUN operations
pub type Result<T> = std::result::Result<T, StunError>;
