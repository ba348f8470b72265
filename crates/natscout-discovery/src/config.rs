//! STUN client configuration.

use crate::error::{Result, StunError};
use crate::stun::Poller;
use natscout_transport::PortRange;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Inclusive local port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRangeConfig {
    /// First port
    pub base: u16,
    /// Last port
    pub max: u16,
}

impl PortRangeConfig {
    fn build(range: Option<Self>) -> Result<PortRange> {
        match range {
            Some(Self { base, max }) => PortRange::new(base, max)
                .map_err(|e| StunError::InvalidConfig(e.to_string())),
            None => Ok(PortRange::any()),
        }
    }
}

/// STUN client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StunConfig {
    /// STUN server, `host` or `host:port`
    pub server: Option<String>,
    /// Attempts per request
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Local port range for single sockets and probes
    pub port_range: Option<PortRangeConfig>,
    /// Local port range for RTP/RTCP socket pairs
    pub pair_port_range: Option<PortRangeConfig>,
    /// Sockets opened when searching for an adjacent pair
    pub pair_candidates: usize,
    /// Pinned probe interfaces; empty means ask the OS
    pub interfaces: Vec<Ipv4Addr>,
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            server: None,
            max_retries: 3,
            timeout_ms: 500,
            port_range: None,
            pair_port_range: None,
            pair_candidates: 4,
            interfaces: Vec::new(),
        }
    }
}

impl StunConfig {
    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poller for this configuration
    #[must_use]
    pub fn poller(&self) -> Poller {
        Poller::new(self.max_retries, self.timeout())
    }

    /// Check values that cannot be used as given
    ///
    /// # Errors
    ///
    /// Returns [`StunError::InvalidConfig`] for a zero timeout, fewer than
    /// two pair candidates, or an invalid port range.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(StunError::InvalidConfig("timeout_ms must be positive".into()));
        }
        if self.pair_candidates < 2 {
            return Err(StunError::InvalidConfig("pair_candidates must be at least 2".into()));
        }
        self.port_ranges().map(|_| ())
    }

    /// Build `(port_range, pair_port_range)` cursors
    ///
    /// # Errors
    ///
    /// Returns [`StunError::InvalidConfig`] for an inverted or half-open range.
    pub fn port_ranges(&self) -> Result<(PortRange, PortRange)> {
        Ok((
            PortRangeConfig::build(self.port_range)?,
            PortRangeConfig::build(self.pair_port_range)?,
        ))
    }
}
