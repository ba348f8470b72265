//! Local network interface enumeration.
//!
//! The NAT classifier probes from every usable IPv4 interface at once. The
//! [`InterfaceProvider`] trait is the seam between the classifier and the
//! host: [`SystemInterfaces`] asks the OS, [`StaticInterfaces`] returns a
//! pinned list (useful for multi-homed hosts that must use one uplink, and
//! for tests).

use crate::error::{TransportError, TransportResult};
use std::net::{IpAddr, Ipv4Addr};

/// One local IPv4 interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    /// Interface name (`eth0`, `en1`, ...)
    pub name: String,
    /// IPv4 address bound to the interface
    pub addr: Ipv4Addr,
    /// Whether this is a loopback interface
    pub is_loopback: bool,
}

impl LocalInterface {
    /// Create an interface record
    #[must_use]
    pub fn new(name: impl Into<String>, addr: Ipv4Addr, is_loopback: bool) -> Self {
        Self {
            name: name.into(),
            addr,
            is_loopback,
        }
    }
}

/// Source of local IPv4 interfaces
pub trait InterfaceProvider: Send + Sync {
    /// List the host's IPv4 interfaces
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InterfaceEnumeration`] when the platform
    /// cannot enumerate interfaces.
    fn interfaces(&self) -> TransportResult<Vec<LocalInterface>>;

    /// Interfaces suitable for STUN probing (non-loopback, specified address)
    ///
    /// # Errors
    ///
    /// Propagates enumeration failures from [`InterfaceProvider::interfaces`].
    fn usable_interfaces(&self) -> TransportResult<Vec<LocalInterface>> {
        Ok(self
            .interfaces()?
            .into_iter()
            .filter(|iface| !iface.is_loopback && !iface.addr.is_unspecified())
            .collect())
    }
}

/// Interfaces reported by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceProvider for SystemInterfaces {
    fn interfaces(&self) -> TransportResult<Vec<LocalInterface>> {
        let found = if_addrs::get_if_addrs().map_err(TransportError::InterfaceEnumeration)?;

        let interfaces: Vec<LocalInterface> = found
            .into_iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(addr) => Some(LocalInterface::new(
                    iface.name.clone(),
                    addr,
                    iface.is_loopback(),
                )),
                IpAddr::V6(_) => None,
            })
            .collect();

        tracing::debug!("Enumerated {} IPv4 interfaces", interfaces.len());
        Ok(interfaces)
    }
}

/// A fixed interface list
///
/// Addresses are reported as non-loopback so that a pinned `127.0.0.1` is
/// still probed.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    interfaces: Vec<LocalInterface>,
}

impl StaticInterfaces {
    /// Pin probing to the given addresses
    #[must_use]
    pub fn new(addrs: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            interfaces: addrs
                .into_iter()
                .enumerate()
                .map(|(i, addr)| LocalInterface::new(format!("static{i}"), addr, false))
                .collect(),
        }
    }
}

impl InterfaceProvider for StaticInterfaces {
    fn interfaces(&self) -> TransportResult<Vec<LocalInterface>> {
        Ok(self.interfaces.clone())
    }
}
