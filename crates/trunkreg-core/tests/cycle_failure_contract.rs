//! Architectural Contract Test: Cycle Failure Isolation
//!
//! This test verifies that a failing step ends the cycle cleanly and leaves
//! the next tick free to recover.
//!
//! Constraints verified:
//! - Lookup failure or timeout: no store access, no DNS
//! - Find or upsert failure: no DNS, store unchanged
//! - The cycle after a failure proceeds normally
//!
//! If this test fails, a transient error can publish DNS for a row that was
//! never committed, or wedge the loop.

mod common;

use common::*;
use trunkreg_core::store::Fault;
use trunkreg_core::{CycleOutcome, DnsAction, EngineEvent, MemoryRegistryStore, UpsertKind};

#[tokio::test]
async fn lookup_failure_touches_nothing() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, mut events) = build_engine(
        "edge-1",
        ScriptedIpSource::failing(),
        &store,
        &publisher,
        &minimal_config(),
    );

    assert_eq!(engine.run_cycle().await, CycleOutcome::IdentityUnavailable);

    assert_eq!(store.find_calls(), 0, "No store access without a public address");
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(publisher.publish_count(), 0);
    assert!(drain_events(&mut events).contains(&EngineEvent::IdentityUnavailable {
        hostname: "edge-1".to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn lookup_timeout_touches_nothing() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (source, _gate, _entered) = GatedIpSource::new(PUBLIC_A);
    let (engine, _events) = build_engine("edge-1", source, &store, &publisher, &minimal_config());

    assert_eq!(engine.run_cycle().await, CycleOutcome::IdentityUnavailable);
    assert_eq!(store.find_calls(), 0);
    assert_eq!(publisher.publish_count(), 0);
}

#[tokio::test]
async fn lookup_recovers_on_next_cycle() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::new([None, Some(PUBLIC_A)]),
        &store,
        &publisher,
        &minimal_config(),
    );

    assert_eq!(engine.run_cycle().await, CycleOutcome::IdentityUnavailable);
    assert_eq!(
        engine.run_cycle().await,
        CycleOutcome::Registered {
            kind: UpsertKind::Inserted,
            dns: DnsAction::Published,
        }
    );
}

#[tokio::test]
async fn upsert_failure_skips_dns() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, mut events) = build_engine(
        "edge-1",
        ScriptedIpSource::fixed(PUBLIC_A),
        &store,
        &publisher,
        &minimal_config(),
    );

    store.inject_fault(Fault::Upsert);
    let outcome = engine.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::PersistFailed { .. }), "got {:?}", outcome);
    assert!(store.registrations().await.is_empty(), "Failed upsert must roll back");
    assert_eq!(publisher.publish_count(), 0, "No DNS for an uncommitted row");
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, EngineEvent::RegistrationFailed { .. })));

    store.clear_faults();
    assert_eq!(
        engine.run_cycle().await,
        CycleOutcome::Registered {
            kind: UpsertKind::Inserted,
            dns: DnsAction::Published,
        }
    );
    assert_eq!(store.registrations().await.len(), 1);
}

#[tokio::test]
async fn find_failure_skips_upsert_and_dns() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::fixed(PUBLIC_A),
        &store,
        &publisher,
        &minimal_config(),
    );

    store.inject_fault(Fault::FindExisting);
    let outcome = engine.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::PersistFailed { .. }));
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(publisher.publish_count(), 0);
}

#[tokio::test]
async fn failed_update_keeps_previous_row() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::new([Some(PUBLIC_A), Some(PUBLIC_B)]),
        &store,
        &publisher,
        &minimal_config(),
    );

    engine.run_cycle().await;
    store.inject_fault(Fault::Upsert);
    engine.run_cycle().await;

    let rows = store.registrations().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.ip_address, PUBLIC_A);
    assert_eq!(publisher.publish_count(), 1, "New address must not be published");
    assert_eq!(engine.last_published().await, Some(PUBLIC_A));
}
