//! Fuzz target for STUN client configuration parsing
//!
//! Arbitrary TOML must either fail to parse or yield a config whose
//! validation and port range construction return without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use natscout_discovery::{ServerEndpoint, StunConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = toml::from_str::<StunConfig>(text) {
        let _ = config.validate();
        let _ = config.port_ranges();
        if let Some(server) = &config.server {
            let _ = ServerEndpoint::parse(server);
        }
    }
});
