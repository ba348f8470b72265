//! # natscout Transport
//!
//! UDP transport primitives used by the natscout STUN client.
//!
//! This crate provides:
//! - UDP socket binding with retry across a configured local port range
//! - The mutex-guarded port allocation cursor shared by concurrent socket opens
//! - Local IPv4 interface enumeration
//! - A synchronous "wait until any socket is readable" primitive

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod interfaces;
pub mod port;
pub mod readiness;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use interfaces::{InterfaceProvider, LocalInterface, StaticInterfaces, SystemInterfaces};
pub use port::PortRange;
pub use readiness::wait_readable;
pub use udp::{bind_in_range, bind_udp, local_addr_v4, set_read_timeout};
