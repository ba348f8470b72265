//! NAT type classification results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NAT type classification
///
/// Outcome of one classification pass. Only the UDP-capable outcomes allow
/// mapped sockets to be created:
/// - Open: no translation, inbound traffic from anywhere
/// - Cone: one mapping, any external host can send to it
/// - Restricted: only previously contacted IPs can send
/// - PortRestricted: only previously contacted IP:port pairs can send
/// - Symmetric: a different mapping per destination
/// - PartiallyBlocked: the secondary server address is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    /// Classification failed or has not run
    #[default]
    Unknown,
    /// Public address, no NAT or firewall
    Open,
    /// Full cone NAT
    Cone,
    /// Restricted cone NAT
    Restricted,
    /// Port restricted cone NAT
    PortRestricted,
    /// Symmetric NAT
    Symmetric,
    /// Public address behind a firewall that blocks unsolicited traffic
    SymmetricFirewall,
    /// UDP is blocked
    Blocked,
    /// Primary server reachable, secondary address not
    PartiallyBlocked,
}

impl NatType {
    /// Whether mapped UDP sockets can be created behind this NAT
    #[must_use]
    pub fn supports_socket_creation(self) -> bool {
        !matches!(self, Self::Unknown | Self::SymmetricFirewall | Self::Blocked)
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Open => write!(f, "Open Internet"),
            Self::Cone => write!(f, "Full Cone NAT"),
            Self::Restricted => write!(f, "Restricted Cone NAT"),
            Self::PortRestricted => write!(f, "Port Restricted Cone NAT"),
            Self::Symmetric => write!(f, "Symmetric NAT"),
            Self::SymmetricFirewall => write!(f, "Symmetric UDP Firewall"),
            Self::Blocked => write!(f, "Blocked"),
            Self::PartiallyBlocked => write!(f, "Partially Blocked"),
        }
    }
}
