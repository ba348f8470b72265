//! Test fixtures

mod stun_server;

pub use stun_server::{Endpoint, Probe, Reply, ScriptedStunServer};
