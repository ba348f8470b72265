//! Request/retry exchange over blocking UDP sockets.
//!
//! UDP may drop either direction, so a request is re-sent up to
//! `max_retries` times. The identical message (same transaction ID) is sent
//! on every attempt; a late answer to an earlier attempt therefore still
//! validates.

use super::message::{MAX_MESSAGE_SIZE, StunMessage};
use crate::error::{Result, StunError};
use natscout_transport::{set_read_timeout, wait_readable};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

/// A validated response and the address it came from
#[derive(Debug, Clone)]
pub struct Response {
    /// Decoded message (already validated against the request)
    pub message: StunMessage,
    /// Source of the datagram
    pub source: SocketAddrV4,
}

/// Retrying STUN exchanger
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    max_retries: u32,
    timeout: Duration,
}

impl Poller {
    /// Create a poller; `max_retries` is raised to at least one attempt
    #[must_use]
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            timeout,
        }
    }

    /// Attempts per exchange
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to `destination` and wait for a validated answer
    ///
    /// Modifies the socket's read timeout.
    ///
    /// # Errors
    ///
    /// - [`StunError::ErrorResponse`] as soon as a validated error response arrives
    /// - [`StunError::NoResponse`] when every attempt timed out or received garbage
    /// - [`StunError::MessageTooLarge`] when the request cannot be encoded
    /// - [`StunError::Io`] when the request cannot be sent
    pub fn exchange(
        &self,
        socket: &UdpSocket,
        destination: SocketAddrV4,
        request: &StunMessage,
    ) -> Result<Response> {
        let bytes = request.encode()?;

        for attempt in 1..=self.max_retries {
            socket.send_to(&bytes, destination)?;
            tracing::debug!(
                "STUN request to {} (attempt {}/{}): {}",
                destination,
                attempt,
                self.max_retries,
                request
            );

            if let Some(response) = receive(socket, request, self.timeout)? {
                return into_result(response);
            }
        }

        tracing::debug!("No STUN response from {} after {} attempts", destination, self.max_retries);
        Err(StunError::NoResponse {
            attempts: self.max_retries,
        })
    }

    /// Send one request per socket and wait for the first validated answer
    ///
    /// `requests[i]` is sent from `sockets[i]`. Each round re-sends every
    /// request and then waits up to the timeout on all sockets at once.
    /// Returns the index of the answering socket with its response.
    ///
    /// # Errors
    ///
    /// Same as [`Poller::exchange`]. A send failure on one socket is logged
    /// and that socket simply stays silent for the round.
    pub fn exchange_any(
        &self,
        sockets: &[&UdpSocket],
        destination: SocketAddrV4,
        requests: &[StunMessage],
    ) -> Result<(usize, Response)> {
        let encoded: Vec<Vec<u8>> = requests.iter().map(StunMessage::encode).collect::<Result<_>>()?;

        for attempt in 1..=self.max_retries {
            for (index, (socket, bytes)) in sockets.iter().zip(&encoded).enumerate() {
                if let Err(e) = socket.send_to(bytes, destination) {
                    tracing::warn!("Probe send from socket {} failed: {}", index, e);
                }
            }
            tracing::debug!(
                "STUN probe round {}/{} to {} from {} sockets",
                attempt,
                self.max_retries,
                destination,
                sockets.len()
            );

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let Some(index) = wait_readable(sockets, remaining)? else {
                    break;
                };
                // The datagram is already queued; keep the read short
                if let Some(response) = receive(sockets[index], &requests[index], self.timeout)? {
                    return into_result(response).map(|r| (index, r));
                }
            }
        }

        Err(StunError::NoResponse {
            attempts: self.max_retries,
        })
    }
}

fn into_result(response: Response) -> Result<Response> {
    if response.message.message_type().is_error() {
        let (code, reason) = response
            .message
            .error_code()
            .map_or((0, String::new()), |(code, reason)| (code, reason.to_string()));
        return Err(StunError::ErrorResponse { code, reason });
    }
    Ok(response)
}

/// Read one datagram and validate it against `request`
///
/// `Ok(None)` means the attempt is over: timeout, transient socket error, or
/// a datagram that failed to decode or validate.
fn receive(socket: &UdpSocket, request: &StunMessage, timeout: Duration) -> Result<Option<Response>> {
    set_read_timeout(socket, Some(timeout))?;

    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let (len, from) = match socket.recv_from(&mut buf) {
        Ok(received) => received,
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            return Ok(None);
        }
        Err(e) => {
            // ICMP unreachable surfaces as ConnectionReset/Refused on some platforms
            tracing::debug!("STUN receive failed: {}", e);
            return Ok(None);
        }
    };

    let SocketAddr::V4(source) = from else {
        tracing::warn!("Dropping datagram from non-IPv4 source {}", from);
        return Ok(None);
    };

    let message = match StunMessage::decode(&buf[..len]) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Dropping undecodable datagram from {}: {}", source, e);
            return Ok(None);
        }
    };

    if !message.validate(request) {
        tracing::warn!("Dropping invalid STUN response from {}: {}", source, message);
        return Ok(None);
    }

    tracing::debug!("STUN response from {}: {}", source, message);
    Ok(Some(Response { message, source }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::StunAttribute;
    use natscout_transport::{bind_udp, local_addr_v4};
    use std::net::Ipv4Addr;
    use std::thread;

    fn loopback() -> UdpSocket {
        bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap()
    }

    fn fast_poller(retries: u32) -> Poller {
        Poller::new(retries, Duration::from_millis(50))
    }

    /// Answers `count` requests via `reply`, then returns
    fn responder<F>(server: UdpSocket, count: usize, reply: F) -> thread::JoinHandle<()>
    where
        F: Fn(&StunMessage, SocketAddrV4) -> Vec<u8> + Send + 'static,
    {
        thread::spawn(move || {
            server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut buf = [0u8; MAX_MESSAGE_SIZE];
            for _ in 0..count {
                let Ok((len, SocketAddr::V4(from))) = server.recv_from(&mut buf) else {
                    return;
                };
                let request = StunMessage::decode(&buf[..len]).unwrap();
                let bytes = reply(&request, from);
                if !bytes.is_empty() {
                    server.send_to(&bytes, from).unwrap();
                }
            }
        })
    }

    fn mapped_reply(request: &StunMessage, from: SocketAddrV4) -> Vec<u8> {
        let mut response = StunMessage::response_to(request);
        response.add_attribute(StunAttribute::MappedAddress(from));
        response.encode().unwrap()
    }

    #[test]
    fn test_new_clamps_retries() {
        assert_eq!(Poller::new(0, Duration::from_millis(1)).max_retries(), 1);
        assert_eq!(Poller::new(5, Duration::from_millis(1)).max_retries(), 5);
    }

    #[test]
    fn test_exchange_success() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let handle = responder(server, 1, mapped_reply);

        let client = loopback();
        let request = StunMessage::binding_request(false, false);
        let response = fast_poller(3).exchange(&client, server_addr, &request).unwrap();

        assert_eq!(response.source, server_addr);
        assert_eq!(response.message.mapped_address(), Some(local_addr_v4(&client).unwrap()));
        handle.join().unwrap();
    }

    #[test]
    fn test_retry_bound_against_silent_server() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let client = loopback();
        let request = StunMessage::binding_request(false, false);

        let err = fast_poller(3).exchange(&client, server_addr, &request).unwrap_err();
        assert!(matches!(err, StunError::NoResponse { attempts: 3 }));

        // Exactly three copies of the same request were sent
        server.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let mut seen = 0;
        while let Ok((len, _)) = server.recv_from(&mut buf) {
            let received = StunMessage::decode(&buf[..len]).unwrap();
            assert_eq!(received.transaction_id(), request.transaction_id());
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_garbage_ends_attempt_then_retries() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let handle = thread::spawn(move || {
            server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut buf = [0u8; MAX_MESSAGE_SIZE];

            let (_, from) = server.recv_from(&mut buf).unwrap();
            server.send_to(b"not a stun message", from).unwrap();

            let (len, from) = server.recv_from(&mut buf).unwrap();
            let SocketAddr::V4(from) = from else { unreachable!() };
            let request = StunMessage::decode(&buf[..len]).unwrap();
            server.send_to(&mapped_reply(&request, from), from).unwrap();
        });

        let client = loopback();
        let request = StunMessage::binding_request(false, false);
        let response = Poller::new(3, Duration::from_millis(500))
            .exchange(&client, server_addr, &request)
            .unwrap();
        assert!(response.message.mapped_address().is_some());
        handle.join().unwrap();
    }

    #[test]
    fn test_mismatched_transaction_is_ignored() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let handle = responder(server, 2, |_, from| {
            let stranger = StunMessage::binding_request(false, false);
            mapped_reply(&stranger, from)
        });

        let client = loopback();
        let request = StunMessage::binding_request(false, false);
        let err = fast_poller(2).exchange(&client, server_addr, &request).unwrap_err();
        assert!(err.is_no_response());
        handle.join().unwrap();
    }

    #[test]
    fn test_error_response_is_distinct() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let handle = responder(server, 1, |request, _| {
            StunMessage::error_response_to(request, 420, "Unknown Attribute").encode().unwrap()
        });

        let client = loopback();
        let request = StunMessage::binding_request(false, false);
        let err = fast_poller(3).exchange(&client, server_addr, &request).unwrap_err();
        match err {
            StunError::ErrorResponse { code, reason } => {
                assert_eq!(code, 420);
                assert_eq!(reason, "Unknown Attribute");
            }
            other => panic!("unexpected error: {other}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_exchange_any_picks_answering_socket() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let first = loopback();
        let second = loopback();
        let second_addr = local_addr_v4(&second).unwrap();

        // Only the second socket's requests are answered
        let handle = responder(server, 2, move |request, from| {
            if from == second_addr {
                mapped_reply(request, from)
            } else {
                Vec::new()
            }
        });

        let requests = vec![
            StunMessage::binding_request(false, false),
            StunMessage::binding_request(false, false),
        ];
        let (index, response) = Poller::new(2, Duration::from_millis(500))
            .exchange_any(&[&first, &second], server_addr, &requests)
            .unwrap();

        assert_eq!(index, 1);
        assert_eq!(response.message.mapped_address(), Some(second_addr));
        handle.join().unwrap();
    }

    #[test]
    fn test_exchange_any_silent() {
        let server = loopback();
        let server_addr = local_addr_v4(&server).unwrap();
        let a = loopback();
        let b = loopback();
        let requests = vec![
            StunMessage::binding_request(false, false),
            StunMessage::binding_request(false, false),
        ];

        let err = fast_poller(2)
            .exchange_any(&[&a, &b], server_addr, &requests)
            .unwrap_err();
        assert!(matches!(err, StunError::NoResponse { attempts: 2 }));
    }
}
