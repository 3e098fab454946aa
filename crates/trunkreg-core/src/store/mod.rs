// # Registry Store Implementations
//
// The production store lives in the `trunkreg-store-mysql` crate; this module
// carries the in-memory store used by tests and embedders.

pub mod memory;

pub use memory::{CallChannel, Fault, MemoryRegistryStore, OwnedRow, StoredRegistration};
