//! Blocking UDP socket helpers.
//!
//! Sockets are created through `socket2` and handed out as plain
//! [`std::net::UdpSocket`]s in blocking mode. The STUN client drives them with
//! read timeouts rather than non-blocking I/O.

use crate::error::{TransportError, TransportResult};
use crate::port::PortRange;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Shortest read timeout handed to the OS (zero means "block forever" on some platforms)
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Bind a blocking UDP socket to `addr`
///
/// Port 0 lets the OS choose an ephemeral port.
///
/// # Examples
/// ```no_run
/// use natscout_transport::bind_udp;
/// use std::net::{Ipv4Addr, SocketAddrV4};
///
/// let socket = bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
/// println!("Bound to {}", socket.local_addr().unwrap());
/// ```
pub fn bind_udp(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(false)?;
    socket.bind(&SocketAddr::V4(addr).into())?;
    Ok(socket.into())
}

/// Bind a UDP socket on `ip`, walking `range` until a free port is found
///
/// An unconfigured range binds port 0. A configured range is tried at most
/// once per port, starting from the shared cursor, so concurrent callers do
/// not contend for the same port.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] when every port of the range is
/// taken, or [`TransportError::Io`] when an unconfigured bind fails.
pub fn bind_in_range(ip: Ipv4Addr, range: &PortRange) -> TransportResult<UdpSocket> {
    let Some((base, max)) = range.bounds() else {
        return Ok(bind_udp(SocketAddrV4::new(ip, 0))?);
    };

    for _ in 0..range.len() {
        let port = range.next_port();
        match bind_udp(SocketAddrV4::new(ip, port)) {
            Ok(socket) => {
                tracing::trace!("Bound UDP socket on {}:{}", ip, port);
                return Ok(socket);
            }
            Err(e) => {
                tracing::trace!("Port {}:{} unavailable: {}", ip, port, e);
            }
        }
    }

    Err(TransportError::BindFailed { addr: ip, base, max })
}

/// Set the read timeout, `None` meaning "wait indefinitely"
///
/// Zero durations are raised to one millisecond.
pub fn set_read_timeout(socket: &UdpSocket, timeout: Option<Duration>) -> io::Result<()> {
    socket.set_read_timeout(timeout.map(|t| t.max(MIN_READ_TIMEOUT)))
}

/// IPv4 local address of a bound socket
pub fn local_addr_v4(socket: &UdpSocket) -> io::Result<SocketAddrV4> {
    match socket.local_addr()? {
        SocketAddr::V4(addr) => Ok(addr),
        SocketAddr::V6(addr) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected an IPv4 socket, got {addr}"),
        )),
    }
}
