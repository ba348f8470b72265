//! # natscout Discovery
//!
//! RFC 3489 STUN client: NAT classification, external address discovery and
//! NAT-traversing UDP socket creation.
//!
//! This crate provides:
//! - STUN message and attribute codec with response validation
//! - Request/retry exchange over blocking UDP sockets
//! - The RFC 3489 NAT classification procedure (Tests I, II, III)
//! - Mapped sockets and RTP/RTCP socket pairs with adjacent external ports
//! - A short-lived external address cache
//!
//! ## NAT Types
//!
//! | Result | Socket creation |
//! |--------|-----------------|
//! | Open, Cone, Restricted, PortRestricted | yes |
//! | Symmetric | yes, needs a local port range |
//! | PartiallyBlocked | yes |
//! | Unknown, SymmetricFirewall, Blocked | no |
//!
//! ## Example
//!
//! ```rust,no_run
//! use natscout_discovery::{StunClient, StunConfig};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StunConfig {
//!     server: Some("stun.example.org:3478".to_string()),
//!     ..Default::default()
//! };
//! let client = StunClient::new(config)?;
//!
//! println!("NAT: {}", client.nat_type(false));
//! println!("External: {}", client.external_address(Duration::from_secs(30))?);
//!
//! let socket = client.create_socket(Ipv4Addr::UNSPECIFIED, None)?;
//! println!("{} -> {}", socket.local_addr(), socket.external_addr());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod nat;
pub mod server;
pub mod stun;

pub use cache::ExternalAddressCache;
pub use client::StunClient;
pub use config::{PortRangeConfig, StunConfig};
pub use error::{Result, StunError};
pub use factory::{MappedSocket, find_adjacent_pair};
pub use nat::{Classification, Classifier, NatType};
pub use server::ServerEndpoint;
pub use stun::{AttributeType, MessageType, Poller, Response, StunAttribute, StunMessage};
