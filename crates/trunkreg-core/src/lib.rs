// # trunkreg-core
//
// Core library for the trunk self-registration and DNS-sync agent.
//
// ## Architecture Overview
//
// Each node of a VoIP trunk fleet runs one agent that keeps its own row in a
// shared peer-registry table current and points its public DNS name at its
// public address:
// - **PublicIpSource**: Trait for looking up the node's public IPv4 address
// - **RegistryStore**: Trait for the transactional registry and ownership tables
// - **DnsPublisher**: Trait for idempotent A-record upserts
// - **ReconcileEngine**: Orchestrates probe → upsert → (publish) on an interval
// - **LivenessMonitor**: Fails fast when the store connection dies
// - **RestartCleanup**: Releases rows a previous run of this node owned
//
// ## Design Principles
//
// 1. **One row per node**: later cycles update in place, never insert again
// 2. **Publish on change**: DNS is only touched when the address moved
// 3. **One cycle at a time**: overlapping cycles are dropped, not queued
// 4. **Library-First**: the daemon only wires adapters into these types

pub mod cleanup;
pub mod config;
pub mod dns_sync;
pub mod engine;
pub mod error;
pub mod identity;
pub mod liveness;
pub mod record;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use cleanup::RestartCleanup;
pub use config::{AgentConfig, DnsConfig, EngineConfig, PeerProfile};
pub use dns_sync::DnsSyncState;
pub use engine::{CycleOutcome, DnsAction, EngineEvent, ReconcileEngine};
pub use error::{Error, Result};
pub use identity::{IdentityProbe, LocalIdentity, NodeIdentity, ResolvedIdentity, StaticIdentity, SystemIdentity};
pub use liveness::LivenessMonitor;
pub use record::RegistrationRecord;
pub use store::MemoryRegistryStore;
pub use traits::{
    CleanupReport, DnsPublisher, ExistingRegistration, PublicIpSource, RegistryStore, UpsertKind,
    UpsertOutcome,
};
