// # Memory Registry Store
//
// In-memory implementation of RegistryStore.
//
// ## Purpose
//
// Holds the registry table and the three ownership tables in process memory
// with the same observable semantics as the MySQL store. Used by tests and by
// embedders that want to drive the reconcile loop without a database.
//
// ## Transactions
//
// Every multi-step operation runs against a cloned working copy of the
// tables; the copy replaces the live tables only when every step succeeded.
// Injected faults abort at the named step, so rollback is observable.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::identity::ResolvedIdentity;
use crate::record::RegistrationRecord;
use crate::traits::{CleanupReport, ExistingRegistration, RegistryStore, UpsertKind, UpsertOutcome};

/// A step at which the store can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    FindExisting,
    Upsert,
    Ping,
    DeleteCallChannels,
    ReleaseParkingLots,
    ReleaseQueues,
    BumpRestartCounter,
}

/// A registry row as held by the memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRegistration {
    pub id: i64,
    pub record: RegistrationRecord,
    pub restart_count: u64,
}

/// One `call_channels` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallChannel {
    pub id: u64,
    pub caller_server: String,
    pub callee_server: String,
}

/// One `parkinglots` or `queues_meta` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRow {
    pub name: String,
    pub server: String,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    registrations: Vec<StoredRegistration>,
    next_id: i64,
    call_channels: Vec<CallChannel>,
    next_channel_id: u64,
    parking_lots: Vec<OwnedRow>,
    queues: Vec<OwnedRow>,
}

impl Tables {
    fn matching(&self, identity: &ResolvedIdentity) -> Option<&StoredRegistration> {
        let mut candidates = self.registrations.iter().filter(|row| {
            row.record.name == identity.hostname
                || row.record.local_address == identity.private_address
                || row.record.ip_address == identity.public_address
        });
        let first = candidates.next()?;
        if first.record.name == identity.hostname {
            return Some(first);
        }
        Some(
            candidates
                .find(|row| row.record.name == identity.hostname)
                .unwrap_or(first),
        )
    }

    fn insert(&mut self, candidate: &RegistrationRecord) {
        self.next_id += 1;
        self.registrations.push(StoredRegistration {
            id: self.next_id,
            record: candidate.clone(),
            restart_count: 0,
        });
    }
}

/// In-memory registry store
///
/// Cloning yields a handle to the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<std::sync::Mutex<HashSet<Fault>>>,
    find_calls: Arc<AtomicUsize>,
    upsert_calls: Arc<AtomicUsize>,
    ping_calls: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MemoryRegistryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call reaching `fault` fail until cleared
    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(fault);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    fn check(&self, fault: Fault) -> Result<(), Error> {
        let tripped = self
            .faults
            .lock()
            .map(|faults| faults.contains(&fault))
            .unwrap_or(false);
        if tripped {
            Err(Error::registry(format!("injected fault at {:?}", fault)))
        } else {
            Ok(())
        }
    }

    /// Snapshot of the registry table, ordered by id
    pub async fn registrations(&self) -> Vec<StoredRegistration> {
        self.tables.read().await.registrations.clone()
    }

    /// Registry row with `name`, if any
    pub async fn registration(&self, name: &str) -> Option<StoredRegistration> {
        self.tables
            .read()
            .await
            .registrations
            .iter()
            .find(|row| row.record.name == name)
            .cloned()
    }

    /// Insert a row directly, bypassing the upsert path
    pub async fn seed_registration(&self, record: RegistrationRecord) -> i64 {
        let mut tables = self.tables.write().await;
        tables.insert(&record);
        tables.next_id
    }

    /// Delete a row directly, simulating a concurrent writer
    pub async fn remove_registration(&self, id: i64) {
        self.tables
            .write()
            .await
            .registrations
            .retain(|row| row.id != id);
    }

    pub async fn add_call_channel(&self, caller_server: &str, callee_server: &str) {
        let mut tables = self.tables.write().await;
        tables.next_channel_id += 1;
        let id = tables.next_channel_id;
        tables.call_channels.push(CallChannel {
            id,
            caller_server: caller_server.to_string(),
            callee_server: callee_server.to_string(),
        });
    }

    pub async fn add_parking_lot(&self, name: &str, server: &str) {
        self.tables.write().await.parking_lots.push(OwnedRow {
            name: name.to_string(),
            server: server.to_string(),
        });
    }

    pub async fn add_queue(&self, name: &str, server: &str) {
        self.tables.write().await.queues.push(OwnedRow {
            name: name.to_string(),
            server: server.to_string(),
        });
    }

    pub async fn call_channels(&self) -> Vec<CallChannel> {
        self.tables.read().await.call_channels.clone()
    }

    pub async fn parking_lots(&self) -> Vec<OwnedRow> {
        self.tables.read().await.parking_lots.clone()
    }

    pub async fn queues(&self) -> Vec<OwnedRow> {
        self.tables.read().await.queues.clone()
    }

    /// Number of `find_existing` calls so far
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Number of `upsert` calls so far
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of `ping` calls so far
    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn find_existing(
        &self,
        identity: &ResolvedIdentity,
    ) -> Result<Option<ExistingRegistration>, Error> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Fault::FindExisting)?;

        let tables = self.tables.read().await;
        Ok(tables.matching(identity).map(|row| ExistingRegistration {
            id: row.id,
            name: row.record.name.clone(),
            public_dns_hostname: Some(row.record.public_dns_hostname.clone())
                .filter(|name| !name.is_empty()),
        }))
    }

    async fn upsert(
        &self,
        candidate: &RegistrationRecord,
        existing: Option<&ExistingRegistration>,
    ) -> Result<UpsertOutcome, Error> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut tables = self.tables.write().await;
        let mut working = tables.clone();

        let locked = existing.and_then(|existing| {
            working
                .registrations
                .iter()
                .position(|row| row.id == existing.id)
        });

        let kind = match locked {
            Some(index) => {
                let row = &mut working.registrations[index];
                let mut updated = candidate.clone();
                updated.provisioned_at = row.record.provisioned_at;
                updated.secret = row.record.secret.clone();
                row.record = updated;
                UpsertKind::Updated
            }
            None => {
                working.insert(candidate);
                UpsertKind::Inserted
            }
        };

        self.check(Fault::Upsert)?;

        *tables = working;
        Ok(UpsertOutcome {
            kind,
            rows_affected: 1,
        })
    }

    async fn ping(&self) -> Result<(), Error> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Fault::Ping)
            .map_err(|e| Error::liveness(e.to_string()))
    }

    async fn release_ownership(
        &self,
        hostname: &str,
        bump_restart_counter: bool,
    ) -> Result<CleanupReport, Error> {
        let mut tables = self.tables.write().await;
        let mut working = tables.clone();
        let mut report = CleanupReport::default();

        let before = working.call_channels.len();
        working
            .call_channels
            .retain(|c| c.caller_server != hostname && c.callee_server != hostname);
        report.channels_deleted = (before - working.call_channels.len()) as u64;
        self.check(Fault::DeleteCallChannels)?;

        report.parking_lots_released = release(&mut working.parking_lots, hostname);
        self.check(Fault::ReleaseParkingLots)?;

        report.queues_released = release(&mut working.queues, hostname);
        self.check(Fault::ReleaseQueues)?;

        if bump_restart_counter {
            for row in working
                .registrations
                .iter_mut()
                .filter(|row| row.record.name == hostname)
            {
                row.restart_count += 1;
                report.restart_counter_bumped = true;
            }
            self.check(Fault::BumpRestartCounter)?;
        }

        *tables = working;
        Ok(report)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

fn release(rows: &mut [OwnedRow], hostname: &str) -> u64 {
    let mut released = 0;
    for row in rows.iter_mut().filter(|row| row.server == hostname) {
        row.server.clear();
        released += 1;
    }
    released
}
