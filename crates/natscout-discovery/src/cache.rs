//! External address cache.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Last discovered public IPv4 address and when it was observed
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalAddressCache {
    entry: Option<(Ipv4Addr, Instant)>,
}

impl ExternalAddressCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached address if it is younger than `max_age`
    #[must_use]
    pub fn get(&self, max_age: Duration) -> Option<Ipv4Addr> {
        self.get_at(max_age, Instant::now())
    }

    /// Like [`ExternalAddressCache::get`] with an explicit clock reading
    #[must_use]
    pub fn get_at(&self, max_age: Duration, now: Instant) -> Option<Ipv4Addr> {
        let (addr, stored) = self.entry?;
        (now.saturating_duration_since(stored) < max_age).then_some(addr)
    }

    /// Last stored address regardless of age
    #[must_use]
    pub fn peek(&self) -> Option<Ipv4Addr> {
        self.entry.map(|(addr, _)| addr)
    }

    /// Record `addr` as observed now
    pub fn store(&mut self, addr: Ipv4Addr) {
        self.store_at(addr, Instant::now());
    }

    /// Record `addr` as observed at `at`
    pub fn store_at(&mut self, addr: Ipv4Addr, at: Instant) {
        self.entry = Some((addr, at));
    }

    /// Forget the cached address
    pub fn clear(&mut self) {
        self.entry = None;
    }
}
