//! Registration reconcile engine
//!
//! The ReconcileEngine is responsible for:
//! - Resolving the node identity via IdentityProbe
//! - Upserting the node's registry row via RegistryStore
//! - Deciding whether DNS must be re-published (DnsSyncState)
//! - Publishing via DnsPublisher
//!
//! ## Architecture
//!
//! ```text
//!   interval tick
//!        │
//!        ▼
//! ┌───────────────┐  no public IP   ┌──────┐
//! │ IdentityProbe │────────────────▶│ Idle │
//! └───────────────┘                 └──────┘
//!        │ resolved                     ▲
//!        ▼                              │ find/upsert failed
//! ┌───────────────┐─────────────────────┤
//! │ RegistryStore │                     │ address unchanged
//! │ find + upsert │─────────────────────┤
//! └───────────────┘                     │
//!        │ address changed              │ success or failure
//!        ▼                              │
//! ┌───────────────┐─────────────────────┘
//! │ DnsPublisher  │
//! └───────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Probe hostname, private and public address (skip cycle on lookup failure)
//! 2. Find the node's existing row
//! 3. Build the candidate record and upsert it in one transaction
//! 4. If the public address differs from the last published one, publish
//! 5. Emit events for monitoring/logging

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, DnsConfig, PeerProfile};
use crate::dns_sync::DnsSyncState;
use crate::error::Result;
use crate::identity::IdentityProbe;
use crate::record::RegistrationRecord;
use crate::traits::{DnsPublisher, RegistryStore, UpsertKind};

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        hostname: String,
        interval_secs: u64,
    },

    /// Public address could not be resolved, cycle skipped
    IdentityUnavailable {
        hostname: String,
    },

    /// First row written for this node
    RegistrationInserted {
        name: String,
        public_address: Ipv4Addr,
    },

    /// Existing row refreshed
    RegistrationUpdated {
        name: String,
        public_address: Ipv4Addr,
    },

    /// Lookup or upsert failed and was rolled back
    RegistrationFailed {
        hostname: String,
        error: String,
    },

    /// DNS record now points at the address
    DnsPublished {
        fqdn: String,
        address: Ipv4Addr,
    },

    /// Address already published, no provider call
    DnsPublishSkipped {
        fqdn: String,
        address: Ipv4Addr,
    },

    /// Provider call failed, the next cycle retries
    DnsPublishFailed {
        fqdn: String,
        address: Ipv4Addr,
        error: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// What the DNS step of a cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsAction {
    Unchanged,
    Published,
    PublishFailed,
}

/// Result of one reconcile cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing was done
    Busy,
    /// Public address lookup failed or timed out; nothing was touched
    IdentityUnavailable,
    /// The store rejected the lookup or upsert; DNS was not attempted
    PersistFailed { error: String },
    /// The row was committed
    Registered { kind: UpsertKind, dns: DnsAction },
}

/// Registration reconcile engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Start with [`ReconcileEngine::run()`] (or drive single cycles with
///    [`ReconcileEngine::run_cycle()`])
/// 3. The first cycle runs immediately, later ones every update interval
/// 4. Shutdown is observed between cycles, never mid-cycle
///
/// ## Concurrency
///
/// At most one cycle is in flight. The loop runs cycles sequentially with
/// delayed missed ticks; a concurrent direct call to `run_cycle` returns
/// [`CycleOutcome::Busy`].
pub struct ReconcileEngine {
    probe: IdentityProbe,
    store: Arc<dyn RegistryStore>,
    publisher: Box<dyn DnsPublisher>,

    /// Held for the whole cycle; doubles as the in-flight guard
    dns_state: Mutex<DnsSyncState>,

    dns: DnsConfig,
    profile: PeerProfile,
    update_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconcile engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        probe: IdentityProbe,
        store: Arc<dyn RegistryStore>,
        publisher: Box<dyn DnsPublisher>,
        config: &AgentConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        for key in config.registry.profile.unset_credentials() {
            warn!(key, "Shared credential is empty; registry rows will carry an empty value");
        }

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            probe,
            store,
            publisher,
            dns_state: Mutex::new(DnsSyncState::new(config.dns.cooldown())),
            dns: config.dns.clone(),
            profile: config.registry.profile.clone(),
            update_interval: config.engine.update_interval(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the engine until `shutdown_rx` fires (or its sender is dropped).
    ///
    /// With `None` this behaves like [`ReconcileEngine::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        match shutdown_rx {
            Some(rx) => {
                self.run_until(async {
                    let _ = rx.await;
                })
                .await
            }
            None => self.run().await,
        }
    }

    async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let hostname = self.probe.hostname();
        info!(
            %hostname,
            interval_secs = self.update_interval.as_secs(),
            publisher = self.publisher.publisher_name(),
            store = self.store.store_name(),
            "Reconcile engine started"
        );
        self.emit_event(EngineEvent::Started {
            hostname,
            interval_secs: self.update_interval.as_secs(),
        });

        let mut interval = tokio::time::interval(self.update_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    let outcome = self.run_cycle().await;
                    debug!(?outcome, "Reconcile cycle finished");
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        info!("Reconcile engine stopped");
        Ok(())
    }

    /// Run one reconcile cycle.
    ///
    /// Never returns an error: every failure is logged, reported through
    /// the outcome, and left for the next tick to recover from.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(mut dns_state) = self.dns_state.try_lock() else {
            debug!("Reconcile cycle already in flight, skipping");
            return CycleOutcome::Busy;
        };

        let identity = self.probe.probe().await;
        let hostname = identity.hostname.clone();
        let Some(identity) = identity.resolved() else {
            warn!(%hostname, "Public address unavailable, skipping cycle");
            self.emit_event(EngineEvent::IdentityUnavailable { hostname });
            return CycleOutcome::IdentityUnavailable;
        };

        let existing = match self.store.find_existing(&identity).await {
            Ok(existing) => existing,
            Err(e) => return self.persist_failed(&hostname, e),
        };

        let record = RegistrationRecord::build(
            &identity,
            existing.as_ref(),
            &self.dns,
            &self.profile,
            Utc::now(),
        );

        let upsert = match self.store.upsert(&record, existing.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => return self.persist_failed(&hostname, e),
        };

        match upsert.kind {
            UpsertKind::Inserted => {
                info!(
                    name = %record.name,
                    public = %identity.public_address,
                    private = %identity.private_address,
                    fqdn = %record.public_dns_hostname,
                    "Registered new node"
                );
                self.emit_event(EngineEvent::RegistrationInserted {
                    name: record.name.clone(),
                    public_address: identity.public_address,
                });
            }
            UpsertKind::Updated => {
                info!(
                    name = %record.name,
                    public = %identity.public_address,
                    private = %identity.private_address,
                    rows = upsert.rows_affected,
                    "Refreshed node registration"
                );
                self.emit_event(EngineEvent::RegistrationUpdated {
                    name: record.name.clone(),
                    public_address: identity.public_address,
                });
            }
        }

        let fqdn = record.public_dns_hostname;
        let address = identity.public_address;

        if !dns_state.needs_publish(address, Instant::now()) {
            debug!(%fqdn, %address, "Address already published, skipping DNS");
            self.emit_event(EngineEvent::DnsPublishSkipped { fqdn, address });
            return CycleOutcome::Registered {
                kind: upsert.kind,
                dns: DnsAction::Unchanged,
            };
        }

        let dns = match self.publisher.publish(&fqdn, address).await {
            Ok(()) => {
                dns_state.record_success(address, Instant::now());
                info!(%fqdn, %address, publisher = self.publisher.publisher_name(), "Published DNS record");
                self.emit_event(EngineEvent::DnsPublished { fqdn, address });
                DnsAction::Published
            }
            Err(e) => {
                dns_state.record_failure();
                warn!(%fqdn, %address, "DNS publish failed, will retry next cycle: {}", e);
                self.emit_event(EngineEvent::DnsPublishFailed {
                    fqdn,
                    address,
                    error: e.to_string(),
                });
                DnsAction::PublishFailed
            }
        };

        CycleOutcome::Registered {
            kind: upsert.kind,
            dns,
        }
    }

    /// Last address successfully published, if still remembered
    pub async fn last_published(&self) -> Option<Ipv4Addr> {
        self.dns_state.lock().await.last_published()
    }

    fn persist_failed(&self, hostname: &str, error: crate::Error) -> CycleOutcome {
        warn!(%hostname, store = self.store.store_name(), "Registration failed, skipping DNS: {}", error);
        self.emit_event(EngineEvent::RegistrationFailed {
            hostname: hostname.to_string(),
            error: error.to_string(),
        });
        CycleOutcome::PersistFailed {
            error: error.to_string(),
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_compare_by_value() {
        let outcome = CycleOutcome::Registered {
            kind: UpsertKind::Inserted,
            dns: DnsAction::Published,
        };
        assert_eq!(outcome.clone(), outcome);
        assert_ne!(outcome, CycleOutcome::Busy);
    }
}
