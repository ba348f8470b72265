//! Mapped UDP socket creation.
//!
//! A [`MappedSocket`] is a bound UDP socket annotated with the external
//! address the NAT assigned to it, learned through one Test I exchange.
//! Socket pairs for RTP/RTCP need adjacent external ports with the lower one
//! even, which most NATs only produce by chance; several candidates are
//! opened and the first adjacent pair wins.

use crate::error::{Result, StunError};
use crate::nat::NatType;
use crate::stun::{Poller, StunMessage};
use natscout_transport::{PortRange, bind_in_range, bind_udp, local_addr_v4, set_read_timeout};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// A UDP socket with its NAT mapping
#[derive(Debug)]
pub struct MappedSocket {
    socket: UdpSocket,
    local: SocketAddrV4,
    external: SocketAddrV4,
}

impl MappedSocket {
    /// Underlying socket (blocking, no read timeout)
    #[must_use]
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    /// Take ownership of the socket
    #[must_use]
    pub fn into_socket(self) -> UdpSocket {
        self.socket
    }

    /// Local bound address
    #[must_use]
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local
    }

    /// External address as seen by the STUN server
    #[must_use]
    pub fn external_addr(&self) -> SocketAddrV4 {
        self.external
    }
}

/// Find two mappings with adjacent ports, lower one even, same IP
///
/// Returns indices `(even, odd)` into `mappings`.
#[must_use]
pub fn find_adjacent_pair(mappings: &[SocketAddrV4]) -> Option<(usize, usize)> {
    mappings.iter().enumerate().find_map(|(i, low)| {
        if low.port() % 2 != 0 {
            return None;
        }
        mappings
            .iter()
            .position(|high| high.ip() == low.ip() && high.port() == low.port() + 1)
            .map(|j| (i, j))
    })
}

/// Everything socket creation needs from the client, captured without locks
pub(crate) struct SocketFactory<'a> {
    pub poller: Poller,
    pub server: SocketAddrV4,
    pub nat_type: NatType,
    pub port_range: &'a PortRange,
    pub pair_port_range: &'a PortRange,
    pub pair_candidates: usize,
    pub cached_external: Option<Ipv4Addr>,
}

impl SocketFactory<'_> {
    fn ensure_supported(&self) -> Result<()> {
        if self.nat_type.supports_socket_creation() {
            Ok(())
        } else {
            Err(StunError::Unsupported(self.nat_type))
        }
    }

    /// The cached external address cannot be bound locally; use any
    fn bind_ip(&self, binding: Ipv4Addr) -> Ipv4Addr {
        if binding.is_unspecified() || Some(binding) == self.cached_external {
            Ipv4Addr::UNSPECIFIED
        } else {
            binding
        }
    }

    /// Learn the external mapping of `socket` and hand it out
    fn map(&self, socket: UdpSocket) -> Result<MappedSocket> {
        let local = local_addr_v4(&socket)?;
        let request = StunMessage::binding_request(false, false);
        let response = self.poller.exchange(&socket, self.server, &request)?;
        let external = response
            .message
            .mapped_address()
            .ok_or(StunError::MissingAttribute("MAPPED-ADDRESS"))?;

        set_read_timeout(&socket, None)?;
        tracing::debug!("Socket {} mapped to {}", local, external);

        Ok(MappedSocket {
            socket,
            local,
            external,
        })
    }

    pub fn create_socket(&self, binding: Ipv4Addr, local_port: Option<u16>) -> Result<MappedSocket> {
        self.ensure_supported()?;
        let ip = self.bind_ip(binding);

        // Port 0 asks for an ephemeral port, which is no explicit choice
        let socket = match local_port.filter(|&port| port != 0) {
            Some(port) => bind_udp(SocketAddrV4::new(ip, port))?,
            None => {
                if self.nat_type == NatType::Symmetric && !self.port_range.is_configured() {
                    return Err(StunError::PortRangeRequired(self.nat_type));
                }
                bind_in_range(ip, self.port_range)?
            }
        };

        self.map(socket)
    }

    pub fn create_socket_pair(&self, binding: Ipv4Addr) -> Result<(MappedSocket, MappedSocket)> {
        self.ensure_supported()?;
        let ip = self.bind_ip(binding);

        let mut candidates = Vec::with_capacity(self.pair_candidates);
        for _ in 0..self.pair_candidates {
            let socket = bind_in_range(ip, self.pair_port_range)?;
            match self.map(socket) {
                Ok(mapped) => candidates.push(mapped),
                Err(e) => tracing::debug!("Pair candidate dropped: {}", e),
            }
        }

        let mappings: Vec<SocketAddrV4> = candidates.iter().map(MappedSocket::external_addr).collect();
        let Some((even, odd)) = find_adjacent_pair(&mappings) else {
            tracing::debug!("No adjacent pair among {:?}", mappings);
            return Err(StunError::NoAdjacentPair {
                candidates: candidates.len(),
            });
        };

        // Take the higher index first so the lower one stays valid
        let (first, second) = if even > odd { (even, odd) } else { (odd, even) };
        let a = candidates.swap_remove(first);
        let b = candidates.swap_remove(second);
        let pair = if even > odd { (a, b) } else { (b, a) };

        tracing::info!(
            "Socket pair mapped to {} / {}",
            pair.0.external_addr(),
            pair.1.external_addr()
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn addr(s: &str) -> SocketAddrV4 {
        s.parse().unwrap()
    }

    fn factory<'a>(nat_type: NatType, range: &'a PortRange) -> SocketFactory<'a> {
        SocketFactory {
            poller: Poller::new(1, Duration::from_millis(20)),
            server: addr("127.0.0.1:9"),
            nat_type,
            port_range: range,
            pair_port_range: range,
            pair_candidates: 4,
            cached_external: Some(Ipv4Addr::new(203, 0, 113, 7)),
        }
    }

    #[test]
    fn test_find_adjacent_pair() {
        let mappings = [
            addr("1.2.3.4:5001"),
            addr("1.2.3.4:6000"),
            addr("1.2.3.4:5003"),
            addr("1.2.3.4:6001"),
        ];
        assert_eq!(find_adjacent_pair(&mappings), Some((1, 3)));
    }

    #[test]
    fn test_find_adjacent_pair_odd_low_rejected() {
        let mappings = [addr("1.2.3.4:5001"), addr("1.2.3.4:5002")];
        assert_eq!(find_adjacent_pair(&mappings), None);
    }

    #[test]
    fn test_find_adjacent_pair_requires_same_ip() {
        let mappings = [addr("1.2.3.4:5000"), addr("1.2.3.5:5001")];
        assert_eq!(find_adjacent_pair(&mappings), None);
    }

    #[test]
    fn test_unsupported_nat_types() {
        let range = PortRange::any();
        for nat_type in [NatType::Unknown, NatType::SymmetricFirewall, NatType::Blocked] {
            let factory = factory(nat_type, &range);
            assert!(matches!(
                factory.create_socket(Ipv4Addr::UNSPECIFIED, None),
                Err(StunError::Unsupported(t)) if t == nat_type
            ));
            assert!(matches!(
                factory.create_socket_pair(Ipv4Addr::UNSPECIFIED),
                Err(StunError::Unsupported(_))
            ));
        }
    }

    #[test]
    fn test_symmetric_requires_port_range() {
        let range = PortRange::any();
        let factory = factory(NatType::Symmetric, &range);
        assert!(matches!(
            factory.create_socket(Ipv4Addr::UNSPECIFIED, None),
            Err(StunError::PortRangeRequired(NatType::Symmetric))
        ));
    }

    #[test]
    fn test_symmetric_rejects_ephemeral_port() {
        let range = PortRange::any();
        let factory = factory(NatType::Symmetric, &range);
        assert!(matches!(
            factory.create_socket(Ipv4Addr::LOCALHOST, Some(0)),
            Err(StunError::PortRangeRequired(NatType::Symmetric))
        ));
    }

    #[test]
    fn test_bind_ip_rewrites_external() {
        let range = PortRange::any();
        let factory = factory(NatType::Cone, &range);
        assert_eq!(factory.bind_ip(Ipv4Addr::new(203, 0, 113, 7)), Ipv4Addr::UNSPECIFIED);
        assert_eq!(factory.bind_ip(Ipv4Addr::LOCALHOST), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_unanswered_mapping_fails() {
        let range = PortRange::any();
        let factory = factory(NatType::Cone, &range);
        let err = factory.create_socket(Ipv4Addr::LOCALHOST, None).unwrap_err();
        assert!(err.is_no_response());
    }

    proptest! {
        #[test]
        fn prop_adjacent_pair_is_valid(ports in proptest::collection::vec(1u16..u16::MAX, 0..8)) {
            let ip = Ipv4Addr::new(198, 51, 100, 1);
            let mappings: Vec<SocketAddrV4> = ports.iter().map(|&p| SocketAddrV4::new(ip, p)).collect();

            match find_adjacent_pair(&mappings) {
                Some((even, odd)) => {
                    prop_assert_eq!(mappings[even].port() % 2, 0);
                    prop_assert_eq!(mappings[odd].port(), mappings[even].port() + 1);
                }
                None => {
                    for m in &mappings {
                        let has_next = m.port() % 2 == 0
                            && mappings.iter().any(|n| n.port() == m.port().wrapping_add(1));
                        prop_assert!(!has_next);
                    }
                }
            }
        }
    }
}
