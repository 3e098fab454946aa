//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that record how the engine
//! drives its collaborators without doing any real I/O.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use trunkreg_core::error::Result;
use trunkreg_core::{
    AgentConfig, DnsPublisher, EngineEvent, Error, IdentityProbe, MemoryRegistryStore,
    PublicIpSource, ReconcileEngine, RegistryStore, StaticIdentity,
};

pub const PUBLIC_A: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);
pub const PUBLIC_B: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 10);
pub const PRIVATE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

/// An IP source that plays back a script of answers
///
/// `None` entries fail the lookup. Once the script runs out the last entry
/// repeats.
pub struct ScriptedIpSource {
    script: Arc<Mutex<VecDeque<Option<Ipv4Addr>>>>,
    last: Arc<Mutex<Option<Ipv4Addr>>>,
    lookup_count: Arc<AtomicUsize>,
}

impl ScriptedIpSource {
    pub fn new(script: impl IntoIterator<Item = Option<Ipv4Addr>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            lookup_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer with `ip`
    pub fn fixed(ip: Ipv4Addr) -> Self {
        Self::new([Some(ip)])
    }

    /// Always fail
    pub fn failing() -> Self {
        Self::new([None])
    }

    /// Get the number of times lookup() was called
    pub fn lookup_count(&self) -> usize {
        self.lookup_count.load(Ordering::SeqCst)
    }

    /// Create a new ScriptedIpSource that shares its script and counters
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            script: Arc::clone(&other.script),
            last: Arc::clone(&other.last),
            lookup_count: Arc::clone(&other.lookup_count),
        }
    }
}

#[async_trait::async_trait]
impl PublicIpSource for ScriptedIpSource {
    async fn lookup(&self) -> Result<Ipv4Addr> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let answer = match next {
            Some(answer) => {
                *self.last.lock().unwrap() = answer;
                answer
            }
            None => *self.last.lock().unwrap(),
        };

        answer.ok_or_else(|| Error::identity_lookup("scripted lookup failure"))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// An IP source whose lookups block until released
pub struct GatedIpSource {
    ip: Ipv4Addr,
    gate: Arc<Notify>,
    entered: Arc<Notify>,
    lookup_count: Arc<AtomicUsize>,
}

impl GatedIpSource {
    /// Returns the source, the gate to open, and a signal fired when a
    /// lookup starts waiting
    pub fn new(ip: Ipv4Addr) -> (Self, Arc<Notify>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let source = Self {
            ip,
            gate: Arc::clone(&gate),
            entered: Arc::clone(&entered),
            lookup_count: Arc::new(AtomicUsize::new(0)),
        };
        (source, gate, entered)
    }

    /// Shared count of lookups started, readable after the source is moved
    pub fn lookup_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.lookup_count)
    }
}

#[async_trait::async_trait]
impl PublicIpSource for GatedIpSource {
    async fn lookup(&self) -> Result<Ipv4Addr> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(self.ip)
    }

    fn source_name(&self) -> &'static str {
        "gated"
    }
}

/// A DnsPublisher that records every call
pub struct RecordingPublisher {
    calls: Arc<Mutex<Vec<(String, Ipv4Addr)>>>,
    publish_count: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            publish_count: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the number of times publish() was called
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }

    /// Every (fqdn, ip) passed to publish(), in order
    pub fn calls(&self) -> Vec<(String, Ipv4Addr)> {
        self.calls.lock().unwrap().clone()
    }

    /// Make later publish() calls fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Create a new RecordingPublisher that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            publish_count: Arc::clone(&other.publish_count),
            fail: Arc::clone(&other.fail),
        }
    }
}

#[async_trait::async_trait]
impl DnsPublisher for RecordingPublisher {
    async fn publish(&self, fqdn: &str, ip: Ipv4Addr) -> Result<()> {
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((fqdn.to_string(), ip));

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::dns_publisher("recording publisher told to fail"));
        }
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a minimal AgentConfig for testing
pub fn minimal_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.dns.hosted_zone_id = "/hostedzone/ZTEST".to_string();
    config.engine.update_interval_secs = 60;
    config.engine.event_channel_capacity = 100;
    config
}

/// Build an engine for `hostname` over the given doubles
pub fn build_engine(
    hostname: &str,
    ip_source: impl PublicIpSource + 'static,
    store: &MemoryRegistryStore,
    publisher: &RecordingPublisher,
    config: &AgentConfig,
) -> (ReconcileEngine, mpsc::Receiver<EngineEvent>) {
    let probe = IdentityProbe::new(
        Box::new(StaticIdentity::new(hostname, PRIVATE)),
        Box::new(ip_source),
        config.engine.lookup_timeout(),
    );
    let store: Arc<dyn RegistryStore> = Arc::new(store.clone());

    ReconcileEngine::new(
        probe,
        store,
        Box::new(RecordingPublisher::sharing_counters_with(publisher)),
        config,
    )
    .expect("engine construction succeeds")
}

/// Drain every event currently buffered in `rx`
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
