//! RFC 3489 NAT classification.
//!
//! ```text
//!              Test I
//!                |
//!   no answer ---+--- answer
//!   Blocked      |
//!          mapped == local?
//!        yes /          \ no
//!       Test II         Test II
//!    ok /     \ fail    ok /   \ fail
//!   Open   SymFirewall  Cone   Test I (CHANGED-ADDRESS)
//!                              none /   |new mapping  \ same mapping
//!                      PartiallyBlocked  Symmetric    Test III
//!                                                   ok /     \ fail
//!                                            Restricted   PortRestricted
//! ```
//!
//! Every failure maps to a terminal [`NatType`]; classification never
//! returns an error.

use super::types::NatType;
use crate::stun::{Poller, StunMessage};
use natscout_transport::{InterfaceProvider, PortRange, bind_in_range, local_addr_v4};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Result of one classification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Detected NAT type
    pub nat_type: NatType,
    /// Mapped address reported by Test I, when it succeeded
    pub mapped: Option<SocketAddrV4>,
    /// Local interface address of the socket that answered Test I
    pub interface: Option<Ipv4Addr>,
}

impl Classification {
    fn terminal(nat_type: NatType) -> Self {
        Self {
            nat_type,
            mapped: None,
            interface: None,
        }
    }
}

/// Runs the discovery procedure against one resolved server
pub struct Classifier<'a> {
    poller: Poller,
    interfaces: &'a dyn InterfaceProvider,
    port_range: &'a PortRange,
}

impl<'a> Classifier<'a> {
    /// Create a classifier probing from `interfaces`, binding in `port_range`
    #[must_use]
    pub fn new(poller: Poller, interfaces: &'a dyn InterfaceProvider, port_range: &'a PortRange) -> Self {
        Self {
            poller,
            interfaces,
            port_range,
        }
    }

    /// Classify the NAT between this host and `server`
    pub fn classify(&self, server: SocketAddrV4) -> Classification {
        let result = self.run(server);
        tracing::info!("NAT classification against {}: {}", server, result.nat_type);
        result
    }

    fn probe_addresses(&self) -> Vec<Ipv4Addr> {
        match self.interfaces.usable_interfaces() {
            Ok(interfaces) => interfaces.into_iter().map(|iface| iface.addr).collect(),
            Err(e) => {
                tracing::debug!("Interface enumeration unsupported ({}), probing from any address", e);
                vec![Ipv4Addr::UNSPECIFIED]
            }
        }
    }

    fn run(&self, server: SocketAddrV4) -> Classification {
        let addrs = self.probe_addresses();
        if addrs.is_empty() {
            tracing::warn!("No usable IPv4 interface for NAT classification");
            return Classification::terminal(NatType::Unknown);
        }

        let sockets: Vec<UdpSocket> = addrs
            .iter()
            .filter_map(|&ip| match bind_in_range(ip, self.port_range) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    tracing::warn!("Cannot bind probe socket on {}: {}", ip, e);
                    None
                }
            })
            .collect();
        if sockets.is_empty() {
            return Classification::terminal(NatType::Unknown);
        }

        // Test I from every interface at once
        let refs: Vec<&UdpSocket> = sockets.iter().collect();
        let requests: Vec<StunMessage> = sockets
            .iter()
            .map(|_| StunMessage::binding_request(false, false))
            .collect();

        let (index, first) = match self.poller.exchange_any(&refs, server, &requests) {
            Ok(answer) => answer,
            Err(e) if e.is_no_response() => return Classification::terminal(NatType::Blocked),
            Err(e) => {
                tracing::warn!("Test I failed: {}", e);
                return Classification::terminal(NatType::Unknown);
            }
        };

        let socket = &sockets[index];
        let (Some(mapped), Ok(local)) = (first.message.mapped_address(), local_addr_v4(socket)) else {
            tracing::warn!("Test I response lacks MAPPED-ADDRESS");
            return Classification::terminal(NatType::Unknown);
        };
        tracing::debug!("Test I: local {} mapped to {}", local, mapped);

        let interface = (!local.ip().is_unspecified()).then_some(*local.ip());
        let with = |nat_type| Classification {
            nat_type,
            mapped: Some(mapped),
            interface,
        };

        if mapped == local {
            return with(if self.change_test(socket, server, true, true) {
                NatType::Open
            } else {
                NatType::SymmetricFirewall
            });
        }

        if self.change_test(socket, server, true, true) {
            return with(NatType::Cone);
        }

        let Some(changed) = first.message.changed_address() else {
            tracing::warn!("Test I response lacks CHANGED-ADDRESS");
            return with(NatType::Unknown);
        };

        let request = StunMessage::binding_request(false, false);
        let second = match self.poller.exchange(socket, changed, &request) {
            Ok(response) => response,
            Err(e) if e.is_no_response() => return with(NatType::PartiallyBlocked),
            Err(e) => {
                tracing::warn!("Test I against {} failed: {}", changed, e);
                return with(NatType::Unknown);
            }
        };

        match second.message.mapped_address() {
            None => with(NatType::Unknown),
            Some(remapped) if remapped != mapped => {
                tracing::debug!("Mapping changed to {} for {}", remapped, changed);
                with(NatType::Symmetric)
            }
            Some(_) if self.change_test(socket, server, false, true) => with(NatType::Restricted),
            Some(_) => with(NatType::PortRestricted),
        }
    }

    /// Test II (`change_ip`) or Test III (port only)
    ///
    /// A response from the address the request was sent to, or from the same
    /// IP when the IP was asked to change, means the server did not honour
    /// the change flags and is not counted.
    fn change_test(&self, socket: &UdpSocket, server: SocketAddrV4, change_ip: bool, change_port: bool) -> bool {
        let request = StunMessage::binding_request(change_ip, change_port);
        match self.poller.exchange(socket, server, &request) {
            Ok(response) if response.source == server || (change_ip && response.source.ip() == server.ip()) => {
                tracing::warn!(
                    "Change request ({}, {}) answered from {}; server ignored CHANGE-REQUEST",
                    change_ip,
                    change_port,
                    response.source
                );
                false
            }
            Ok(response) => {
                tracing::debug!("Change request ({}, {}) answered from {}", change_ip, change_port, response.source);
                true
            }
            Err(e) => {
                tracing::debug!("Change request ({}, {}) unanswered: {}", change_ip, change_port, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natscout_transport::{LocalInterface, StaticInterfaces, TransportError, TransportResult, bind_udp};
    use std::io;
    use std::time::Duration;

    struct NoInterfaces;

    impl InterfaceProvider for NoInterfaces {
        fn interfaces(&self) -> TransportResult<Vec<LocalInterface>> {
            Ok(vec![LocalInterface::new("lo", Ipv4Addr::LOCALHOST, true)])
        }
    }

    struct Unsupported;

    impl InterfaceProvider for Unsupported {
        fn interfaces(&self) -> TransportResult<Vec<LocalInterface>> {
            Err(TransportError::InterfaceEnumeration(io::Error::new(
                io::ErrorKind::Unsupported,
                "no getifaddrs",
            )))
        }
    }

    fn poller() -> Poller {
        Poller::new(2, Duration::from_millis(40))
    }

    fn silent_server() -> (UdpSocket, SocketAddrV4) {
        let socket = bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = local_addr_v4(&socket).unwrap();
        (socket, addr)
    }

    #[test]
    fn test_no_usable_interface_is_unknown() {
        let (_server, addr) = silent_server();
        let range = PortRange::any();
        let result = Classifier::new(poller(), &NoInterfaces, &range).classify(addr);
        assert_eq!(result.nat_type, NatType::Unknown);
        assert_eq!(result.mapped, None);
    }

    #[test]
    fn test_unsupported_enumeration_falls_back_to_any() {
        let range = PortRange::any();
        let classifier = Classifier::new(poller(), &Unsupported, &range);
        assert_eq!(classifier.probe_addresses(), vec![Ipv4Addr::UNSPECIFIED]);
    }

    #[test]
    fn test_silent_server_is_blocked() {
        let (_server, addr) = silent_server();
        let range = PortRange::any();
        let interfaces = StaticInterfaces::new([Ipv4Addr::LOCALHOST]);
        let result = Classifier::new(poller(), &interfaces, &range).classify(addr);
        assert_eq!(result.nat_type, NatType::Blocked);
        assert_eq!(result.interface, None);
    }
}
