//! STUN Protocol (RFC 3489)
//!
//! # Components
//!
//! - **Attributes**: TLV attribute encoding and decoding
//! - **Messages**: header handling, transaction IDs, response validation
//! - **Poller**: request/retry exchange over blocking UDP sockets
//!
//! RFC 3489 predates the RFC 5389 magic cookie; attributes are not padded and
//! addresses are never XOR-mapped.
//!
//! # Example
//!
//! ```rust,no_run
//! use natscout_discovery::stun::{Poller, StunMessage};
//! use natscout_transport::bind_udp;
//! use std::net::{Ipv4Addr, SocketAddrV4};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = bind_udp(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
//! let server: SocketAddrV4 = "198.51.100.1:3478".parse()?;
//! let request = StunMessage::binding_request(false, false);
//!
//! let poller = Poller::new(3, Duration::from_millis(500));
//! let response = poller.exchange(&socket, server, &request)?;
//! println!("Mapped address: {:?}", response.message.mapped_address());
//! # Ok(())
//! # }
//! ```

pub mod attribute;
pub mod message;
pub mod poll;

pub use attribute::{AttributeType, StunAttribute};
pub use message::{HEADER_SIZE, MAX_MESSAGE_SIZE, MessageType, StunMessage, TransactionId};
pub use poll::{Poller, Response};

/// Default STUN server port
pub const DEFAULT_PORT: u16 = 3478;
