//! Scripted loopback STUN server
//!
//! Simulates the network path between a client and an RFC 3489 server so
//! that every NAT classification outcome can be produced on `127.0.0.1`.
//!
//! The server listens on three loopback sockets:
//! - **primary**: the address the client is configured with
//! - **port-changed**: answers requests carrying only the change-port flag
//! - **alternate**: answers change-IP requests and is advertised as
//!   CHANGED-ADDRESS; it listens on `127.0.0.2`, which Linux routes over
//!   loopback, so it really is another IP
//!
//! A scenario closure sees every request as a [`Probe`] and decides the
//! [`Reply`], which lets a test play the NAT (rewrite the mapped address) and
//! the firewall (drop traffic) at once.
//!
//! # Example
//!
//! ```no_run
//! use natscout_integration_tests::fixtures::{Reply, ScriptedStunServer};
//!
//! // A full cone NAT mapping everything to one public address
//! let server = ScriptedStunServer::start(|_| Reply::Mapped("203.0.113.5:40000".parse().unwrap())).unwrap();
//! println!("STUN server at {}", server.address());
//! ```

use natscout_discovery::{StunAttribute, StunMessage};
use natscout_discovery::stun::MAX_MESSAGE_SIZE;
use natscout_transport::{bind_udp, local_addr_v4};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Server socket a request arrived on or is answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Configured server address
    Primary,
    /// Same IP, other port
    PortChanged,
    /// "Other IP" (advertised as CHANGED-ADDRESS)
    Alternate,
}

impl Endpoint {
    const ALL: [Self; 3] = [Self::Primary, Self::PortChanged, Self::Alternate];

    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::PortChanged => 1,
            Self::Alternate => 2,
        }
    }
}

/// One request as seen by the scenario
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    /// Socket the request arrived on
    pub endpoint: Endpoint,
    /// Client source address
    pub from: SocketAddrV4,
    /// CHANGE-REQUEST change-IP flag
    pub change_ip: bool,
    /// CHANGE-REQUEST change-port flag
    pub change_port: bool,
    /// Zero-based arrival order across all endpoints
    pub sequence: usize,
}

impl Probe {
    /// Whether any change flag is set
    pub fn is_change_request(&self) -> bool {
        self.change_ip || self.change_port
    }
}

/// Second loopback IP standing in for the server's other address
const ALTERNATE_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

/// Scenario decision for one request
#[derive(Debug, Clone)]
pub enum Reply {
    /// Lose the request
    Drop,
    /// Answer with this mapped address, honouring the change flags
    Mapped(SocketAddrV4),
    /// Like [`Reply::Mapped`] but without CHANGED-ADDRESS
    WithoutChangedAddress(SocketAddrV4),
    /// Answer from the receiving socket, ignoring the change flags
    IgnoreChange(SocketAddrV4),
    /// Single-IP server: any change request is answered from the
    /// port-changed socket
    PortChangeOnly(SocketAddrV4),
    /// Binding Error Response
    Error(u16, &'static str),
}

type Scenario = dyn Fn(&Probe) -> Reply + Send + Sync;

/// Loopback STUN server driven by a scenario closure
pub struct ScriptedStunServer {
    addrs: [SocketAddrV4; 3],
    requests: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ScriptedStunServer {
    /// Bind the three sockets and start answering
    ///
    /// # Errors
    ///
    /// Returns an error if a loopback socket cannot be bound.
    pub fn start<F>(scenario: F) -> io::Result<Self>
    where
        F: Fn(&Probe) -> Reply + Send + Sync + 'static,
    {
        let sockets = [
            bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?,
            bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?,
            bind_udp(SocketAddrV4::new(ALTERNATE_IP, 0))?,
        ];
        let addrs = [
            local_addr_v4(&sockets[0])?,
            local_addr_v4(&sockets[1])?,
            local_addr_v4(&sockets[2])?,
        ];
        for socket in &sockets {
            socket.set_read_timeout(Some(Duration::from_millis(20)))?;
        }

        let sockets = Arc::new(sockets);
        let scenario: Arc<Scenario> = Arc::new(scenario);
        let requests = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let workers = Endpoint::ALL
            .into_iter()
            .map(|endpoint| {
                let worker = Worker {
                    endpoint,
                    sockets: Arc::clone(&sockets),
                    addrs,
                    scenario: Arc::clone(&scenario),
                    requests: Arc::clone(&requests),
                    stop: Arc::clone(&stop),
                };
                thread::spawn(move || worker.run())
            })
            .collect();

        Ok(Self {
            addrs,
            requests,
            stop,
            workers,
        })
    }

    /// Primary address, the one to configure the client with
    pub fn address(&self) -> SocketAddrV4 {
        self.addrs[Endpoint::Primary.index()]
    }

    /// Address of any endpoint
    pub fn endpoint(&self, endpoint: Endpoint) -> SocketAddrV4 {
        self.addrs[endpoint.index()]
    }

    /// Requests received so far (answered or dropped)
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for ScriptedStunServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

struct Worker {
    endpoint: Endpoint,
    sockets: Arc<[UdpSocket; 3]>,
    addrs: [SocketAddrV4; 3],
    scenario: Arc<Scenario>,
    requests: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        let socket = &self.sockets[self.endpoint.index()];
        let mut buf = [0u8; MAX_MESSAGE_SIZE];

        while !self.stop.load(Ordering::SeqCst) {
            let Ok((len, SocketAddr::V4(from))) = socket.recv_from(&mut buf) else {
                continue;
            };
            let Ok(request) = StunMessage::decode(&buf[..len]) else {
                continue;
            };

            let (change_ip, change_port) = request.change_request().unwrap_or((false, false));
            let probe = Probe {
                endpoint: self.endpoint,
                from,
                change_ip,
                change_port,
                sequence: self.requests.fetch_add(1, Ordering::SeqCst),
            };

            let reply = (self.scenario)(&probe);
            tracing::trace!("{:?} -> {:?}", probe, reply);
            self.answer(&request, &probe, reply);
        }
    }

    fn answer(&self, request: &StunMessage, probe: &Probe, reply: Reply) {
        let honoured = if probe.change_ip {
            Endpoint::Alternate
        } else if probe.change_port {
            Endpoint::PortChanged
        } else {
            probe.endpoint
        };

        let (response, source) = match reply {
            Reply::Drop => return,
            Reply::Mapped(mapped) => (self.binding_response(request, mapped, honoured, true), honoured),
            Reply::WithoutChangedAddress(mapped) => {
                (self.binding_response(request, mapped, honoured, false), honoured)
            }
            Reply::PortChangeOnly(mapped) => {
                let source = if probe.is_change_request() {
                    Endpoint::PortChanged
                } else {
                    probe.endpoint
                };
                (self.binding_response(request, mapped, source, true), source)
            }
            Reply::IgnoreChange(mapped) => (
                self.binding_response(request, mapped, probe.endpoint, true),
                probe.endpoint,
            ),
            Reply::Error(code, reason) => (StunMessage::error_response_to(request, code, reason), probe.endpoint),
        };

        match response.encode() {
            Ok(bytes) => {
                let _ = self.sockets[source.index()].send_to(&bytes, probe.from);
            }
            Err(e) => tracing::warn!("Scripted reply not encodable: {}", e),
        }
    }

    fn binding_response(
        &self,
        request: &StunMessage,
        mapped: SocketAddrV4,
        source: Endpoint,
        with_changed: bool,
    ) -> StunMessage {
        let mut response = StunMessage::response_to(request);
        response.add_attribute(StunAttribute::MappedAddress(mapped));
        response.add_attribute(StunAttribute::SourceAddress(self.addrs[source.index()]));
        if with_changed {
            response.add_attribute(StunAttribute::ChangedAddress(
                self.addrs[Endpoint::Alternate.index()],
            ));
        }
        response
    }
}
