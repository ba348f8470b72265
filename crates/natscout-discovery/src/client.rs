//! STUN client facade.
//!
//! [`StunClient`] owns the per-instance state: configured server, cached
//! classification, external address, discovered interface and port cursors.
//! All methods take `&self`; state is guarded by a mutex that is never held
//! across network I/O. A generation counter is bumped whenever the server
//! changes or the cache is invalidated, and results from a pass that started
//! under an older generation are discarded instead of stored.

use crate::cache::ExternalAddressCache;
use crate::config::StunConfig;
use crate::error::{Result, StunError};
use crate::factory::{MappedSocket, SocketFactory};
use crate::nat::{Classifier, NatType};
use crate::server::ServerEndpoint;
use crate::stun::{Poller, StunMessage};
use natscout_transport::{InterfaceProvider, PortRange, StaticInterfaces, SystemInterfaces, bind_in_range};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct ClientState {
    server: Option<ServerEndpoint>,
    resolved: Option<SocketAddrV4>,
    nat_type: Option<NatType>,
    external: ExternalAddressCache,
    interface: Option<Ipv4Addr>,
    generation: u64,
}

impl ClientState {
    fn reset(&mut self) {
        self.resolved = None;
        self.nat_type = None;
        self.external.clear();
        self.interface = None;
        self.generation += 1;
    }
}

/// RFC 3489 STUN client
///
/// # Example
///
/// ```rust,no_run
/// use natscout_discovery::{StunClient, StunConfig};
/// use std::net::Ipv4Addr;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = StunClient::new(StunConfig::default())?;
/// client.set_server("stun.example.org")?;
///
/// println!("NAT type: {}", client.nat_type(false));
/// if client.is_available(Ipv4Addr::UNSPECIFIED) {
///     let (rtp, rtcp) = client.create_socket_pair(Ipv4Addr::UNSPECIFIED)?;
///     println!("RTP {} RTCP {}", rtp.external_addr(), rtcp.external_addr());
/// }
/// # Ok(())
/// # }
/// ```
pub struct StunClient {
    poller: Poller,
    pair_candidates: usize,
    interfaces: Box<dyn InterfaceProvider>,
    port_range: PortRange,
    pair_port_range: PortRange,
    state: Mutex<ClientState>,
}

impl StunClient {
    /// Create a client from `config`
    ///
    /// Probing uses the pinned `interfaces` list when one is configured,
    /// otherwise the OS interface list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid values or an unparsable server.
    pub fn new(config: StunConfig) -> Result<Self> {
        config.validate()?;
        let (port_range, pair_port_range) = config.port_ranges()?;

        let interfaces: Box<dyn InterfaceProvider> = if config.interfaces.is_empty() {
            Box::new(SystemInterfaces)
        } else {
            Box::new(StaticInterfaces::new(config.interfaces.iter().copied()))
        };

        let server = config.server.as_deref().map(ServerEndpoint::parse).transpose()?;

        Ok(Self {
            poller: config.poller(),
            pair_candidates: config.pair_candidates,
            interfaces,
            port_range,
            pair_port_range,
            state: Mutex::new(ClientState {
                server,
                ..ClientState::default()
            }),
        })
    }

    /// Replace the interface provider
    #[must_use]
    pub fn with_interface_provider(mut self, provider: impl InterfaceProvider + 'static) -> Self {
        self.interfaces = Box::new(provider);
        self.invalidate_cache();
        self
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the server, `host` or `host:port` (default port 3478)
    ///
    /// Invalidates every cached result.
    ///
    /// # Errors
    ///
    /// Returns [`StunError::InvalidServer`]; the previous server is kept.
    pub fn set_server(&self, server: &str) -> Result<()> {
        let endpoint = ServerEndpoint::parse(server)?;
        tracing::debug!("STUN server set to {}", endpoint);

        let mut state = self.state();
        state.server = Some(endpoint);
        state.reset();
        Ok(())
    }

    /// Configured server
    #[must_use]
    pub fn server(&self) -> Option<ServerEndpoint> {
        self.state().server.clone()
    }

    /// Resolved server address with the generation it belongs to
    fn resolve_server(&self) -> Result<(SocketAddrV4, u64)> {
        let (endpoint, generation) = {
            let state = self.state();
            if let Some(resolved) = state.resolved {
                return Ok((resolved, state.generation));
            }
            let endpoint = state.server.clone().ok_or(StunError::ServerNotConfigured)?;
            (endpoint, state.generation)
        };

        let resolved = endpoint.resolve()?;

        let mut state = self.state();
        if state.generation == generation {
            state.resolved = Some(resolved);
        }
        Ok((resolved, generation))
    }

    /// NAT type, classifying on first use or when `force` is set
    ///
    /// Blocks for the whole classification pass. Never fails; problems are
    /// reported as [`NatType::Unknown`] or [`NatType::Blocked`]. An Unknown
    /// caused by an unresolvable server is not cached.
    pub fn nat_type(&self, force: bool) -> NatType {
        let cached = if force { None } else { self.state().nat_type };
        if let Some(nat_type) = cached {
            return nat_type;
        }

        let (server, generation) = match self.resolve_server() {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Cannot classify NAT: {}", e);
                return NatType::Unknown;
            }
        };

        let result = Classifier::new(self.poller, self.interfaces.as_ref(), &self.port_range).classify(server);

        let mut state = self.state();
        if state.generation == generation {
            state.nat_type = Some(result.nat_type);
            if let Some(mapped) = result.mapped {
                state.external.store(*mapped.ip());
                state.interface = result.interface;
            }
        } else {
            tracing::debug!("Discarding classification from a superseded server");
        }
        result.nat_type
    }

    /// Public IPv4 address, refreshed when the cached one is older than `max_age`
    ///
    /// # Errors
    ///
    /// Returns the exchange error when a refresh is needed and fails.
    pub fn external_address(&self, max_age: Duration) -> Result<Ipv4Addr> {
        let interface = {
            let state = self.state();
            if let Some(addr) = state.external.get(max_age) {
                return Ok(addr);
            }
            state.interface
        };

        let (server, generation) = self.resolve_server()?;
        let socket = bind_in_range(interface.unwrap_or(Ipv4Addr::UNSPECIFIED), &self.port_range)?;
        let request = StunMessage::binding_request(false, false);
        let response = self.poller.exchange(&socket, server, &request)?;
        let mapped = response
            .message
            .mapped_address()
            .ok_or(StunError::MissingAttribute("MAPPED-ADDRESS"))?;

        let mut state = self.state();
        if state.generation == generation {
            state.external.store(*mapped.ip());
        }
        tracing::debug!("External address refreshed: {}", mapped.ip());
        Ok(*mapped.ip())
    }

    /// Interface address that answered the last successful Test I
    #[must_use]
    pub fn interface_address(&self) -> Option<Ipv4Addr> {
        self.state().interface
    }

    fn factory(&self) -> Result<SocketFactory<'_>> {
        let nat_type = self.nat_type(false);
        let (server, _) = self.resolve_server()?;
        let cached_external = self.state().external.peek();

        Ok(SocketFactory {
            poller: self.poller,
            server,
            nat_type,
            port_range: &self.port_range,
            pair_port_range: &self.pair_port_range,
            pair_candidates: self.pair_candidates,
            cached_external,
        })
    }

    /// Open a UDP socket on `binding` and learn its external mapping
    ///
    /// `binding` may be unspecified, a local interface address, or the cached
    /// external address (which binds to any). `local_port` pins the local
    /// port; otherwise the configured range (or the OS) picks one.
    ///
    /// # Errors
    ///
    /// - [`StunError::Unsupported`] for Unknown, SymmetricFirewall and Blocked
    /// - [`StunError::PortRangeRequired`] behind a symmetric NAT without a port range
    /// - exchange and bind errors
    pub fn create_socket(&self, binding: Ipv4Addr, local_port: Option<u16>) -> Result<MappedSocket> {
        self.factory()?.create_socket(binding, local_port)
    }

    /// Open an RTP/RTCP pair: external ports `n` and `n + 1`, `n` even
    ///
    /// # Errors
    ///
    /// Returns [`StunError::NoAdjacentPair`] when none of the candidates line
    /// up; the candidate sockets are closed.
    pub fn create_socket_pair(&self, binding: Ipv4Addr) -> Result<(MappedSocket, MappedSocket)> {
        self.factory()?.create_socket_pair(binding)
    }

    /// Whether sockets can be created on `binding`
    ///
    /// May run a classification pass.
    pub fn is_available(&self, binding: Ipv4Addr) -> bool {
        if !self.nat_type(false).supports_socket_creation() {
            return false;
        }
        let state = self.state();
        binding.is_unspecified() || Some(binding) == state.interface || Some(binding) == state.external.peek()
    }

    /// Drop the cached NAT type, external address, interface and resolution
    pub fn invalidate_cache(&self) {
        self.state().reset();
    }
}
