//! DNS change detection
//!
//! Tracks the last address successfully published for this node and the
//! cooldown window that follows each publish. All methods take an explicit
//! `now` so the state can be driven without a clock.

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;

/// Per-process DNS publish gate
#[derive(Debug, Clone)]
pub struct DnsSyncState {
    last_published: Option<Ipv4Addr>,
    cooldown_until: Option<Instant>,
    cooldown: Duration,
}

impl DnsSyncState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_published: None,
            cooldown_until: None,
            cooldown,
        }
    }

    /// Whether `observed` must be published.
    ///
    /// An expired cooldown forgets the last published address first, so an
    /// unchanged address is confirmed once per window.
    pub fn needs_publish(&mut self, observed: Ipv4Addr, now: Instant) -> bool {
        if self.cooldown_until.is_some_and(|deadline| now >= deadline) {
            self.last_published = None;
            self.cooldown_until = None;
        }
        self.last_published != Some(observed)
    }

    /// Record a successful publish and arm the cooldown.
    ///
    /// A cooldown past the clock's range never expires.
    pub fn record_success(&mut self, published: Ipv4Addr, now: Instant) {
        self.last_published = Some(published);
        self.cooldown_until = now.checked_add(self.cooldown);
    }

    /// Forget the last published address so the next cycle retries
    pub fn record_failure(&mut self) {
        self.last_published = None;
        self.cooldown_until = None;
    }

    pub fn cooldown_active(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(deadline) => now < deadline,
            None => self.last_published.is_some(),
        }
    }

    pub fn last_published(&self) -> Option<Ipv4Addr> {
        self.last_published
    }
}
