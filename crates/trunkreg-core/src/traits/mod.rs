//! Core traits for the registration agent
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`PublicIpSource`]: Discover the node's public IPv4 address
//! - [`DnsPublisher`]: Upsert the node's A record in the managed zone
//! - [`RegistryStore`]: Transactional access to the peer registry and ownership tables

pub mod public_ip;
pub mod dns_publisher;
pub mod registry_store;

pub use public_ip::PublicIpSource;
pub use dns_publisher::{DnsPublisher, RECORD_TTL_SECS};
pub use registry_store::{CleanupReport, ExistingRegistration, RegistryStore, UpsertKind, UpsertOutcome};
