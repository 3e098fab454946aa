// # Registry Store Trait
//
// Defines the transactional interface over the peer-registry table and the
// ownership tables released by restart cleanup.
//
// ## Implementations
//
// - MySQL: `trunkreg-store-mysql` crate
// - In-memory: [`crate::store::MemoryRegistryStore`]

use async_trait::async_trait;

use crate::identity::ResolvedIdentity;
use crate::record::RegistrationRecord;

/// The part of an existing registry row the reconcile loop needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRegistration {
    /// Store row id
    pub id: i64,
    /// `name` column (the node's hostname when the row was last written)
    pub name: String,
    /// Stored public DNS name, if any
    pub public_dns_hostname: Option<String>,
}

/// Which branch of the upsert ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// Result of a committed upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    pub rows_affected: u64,
}

/// Result of a committed restart cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Call channels deleted (caller or callee was this node)
    pub channels_deleted: u64,
    /// Parking lots whose owner was cleared
    pub parking_lots_released: u64,
    /// Queue metadata rows whose owner was cleared
    pub queues_released: u64,
    /// Whether the node's restart counter was incremented
    pub restart_counter_bumped: bool,
}

impl CleanupReport {
    /// Total rows deleted or released
    pub fn total_rows(&self) -> u64 {
        self.channels_deleted + self.parking_lots_released + self.queues_released
    }
}

/// Trait for registry store implementations
///
/// # Transactions
///
/// `upsert` and `release_ownership` each run inside exactly one transaction:
/// every nested step commits together or nothing does. An `Err` return means
/// the store is unchanged.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Forbidden Capabilities
/// - ❌ Deciding whether DNS must be published (owned by the engine)
/// - ❌ Generating record content (the candidate arrives fully built)
/// - ❌ Spawning background tasks
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Find the row describing this node.
    ///
    /// Matches on hostname OR private address OR public address, so a node
    /// whose hostname or addresses changed still maps to its old row. When
    /// more than one row matches, the one whose name equals the hostname
    /// wins.
    async fn find_existing(
        &self,
        identity: &ResolvedIdentity,
    ) -> Result<Option<ExistingRegistration>, crate::Error>;

    /// Insert or update the node's row in one transaction.
    ///
    /// With `existing`, the matched row is updated in place and its
    /// `provisioned_at` and `secret` are left untouched. If that row is gone
    /// by the time the transaction runs, the candidate is inserted instead.
    /// Without `existing`, the candidate is inserted.
    async fn upsert(
        &self,
        candidate: &RegistrationRecord,
        existing: Option<&ExistingRegistration>,
    ) -> Result<UpsertOutcome, crate::Error>;

    /// Trivial round trip proving the store is reachable
    async fn ping(&self) -> Result<(), crate::Error>;

    /// Release every ownership row tagged with `hostname`, in one transaction.
    ///
    /// Deletes call channels where the node is caller or callee, clears the
    /// owner of its parking lots and queue metadata, and optionally
    /// increments the restart counter on its registry row.
    async fn release_ownership(
        &self,
        hostname: &str,
        bump_restart_counter: bool,
    ) -> Result<CleanupReport, crate::Error>;

    /// Release the store's connections before exit
    async fn close(&self) {}

    /// Name of the store (for logging)
    fn store_name(&self) -> &'static str;
}
