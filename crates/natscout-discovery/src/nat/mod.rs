//! NAT Detection Module
//!
//! Classifies the host's NAT behaviour with the RFC 3489 Section 10.1
//! discovery procedure:
//!
//! - **Test I**: plain Binding Request, reveals the mapped address
//! - **Test II**: request with change-IP and change-port set
//! - **Test III**: request with change-port set
//!
//! Test I is repeated against the server's CHANGED-ADDRESS to tell symmetric
//! NATs (new mapping per destination) from cone NATs.

pub mod classifier;
pub mod types;

pub use classifier::{Classification, Classifier};
pub use types::NatType;
