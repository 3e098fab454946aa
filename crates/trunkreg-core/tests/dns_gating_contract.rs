//! Architectural Contract Test: DNS Published Only On Change
//!
//! This test verifies the DNS publish gate.
//!
//! Constraints verified:
//! - An unchanged address is published once per cooldown window
//! - A changed address is published immediately
//! - A failed publish is retried on the next cycle
//! - After the cooldown the same address is confirmed once
//!
//! If this test fails, the agent is either hammering the DNS provider or
//! leaving stale records behind.

mod common;

use common::*;
use std::time::Duration;
use trunkreg_core::{CycleOutcome, DnsAction, EngineEvent, MemoryRegistryStore, UpsertKind};

fn dns_action(outcome: CycleOutcome) -> DnsAction {
    match outcome {
        CycleOutcome::Registered { dns, .. } => dns,
        other => panic!("expected a registered cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn unchanged_address_published_once() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, mut events) = build_engine(
        "edge-1",
        ScriptedIpSource::fixed(PUBLIC_A),
        &store,
        &publisher,
        &minimal_config(),
    );

    for _ in 0..5 {
        engine.run_cycle().await;
    }

    let count = publisher.publish_count();
    assert_eq!(count, 1, "Expected 1 publish for 5 identical addresses, got {}", count);
    assert_eq!(engine.last_published().await, Some(PUBLIC_A));

    let skipped = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::DnsPublishSkipped { .. }))
        .count();
    assert_eq!(skipped, 4);
}

#[tokio::test]
async fn changed_address_published_within_cooldown() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::new([Some(PUBLIC_A), Some(PUBLIC_B), Some(PUBLIC_B)]),
        &store,
        &publisher,
        &minimal_config(),
    );

    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Published);
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Published);
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Unchanged);

    let published: Vec<_> = publisher.calls().into_iter().map(|(_, ip)| ip).collect();
    assert_eq!(published, vec![PUBLIC_A, PUBLIC_B]);
}

#[tokio::test]
async fn failed_publish_is_retried_next_cycle() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::fixed(PUBLIC_A),
        &store,
        &publisher,
        &minimal_config(),
    );

    publisher.set_failing(true);
    let outcome = engine.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::Registered {
            kind: UpsertKind::Inserted,
            dns: DnsAction::PublishFailed,
        },
        "A DNS failure must not undo the committed row"
    );
    assert_eq!(engine.last_published().await, None);

    publisher.set_failing(false);
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Published);
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Unchanged);
    assert_eq!(publisher.publish_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cooldown_expiry_confirms_address_once() {
    let store = MemoryRegistryStore::new();
    let publisher = RecordingPublisher::new();
    let config = minimal_config();
    let (engine, _events) = build_engine(
        "edge-1",
        ScriptedIpSource::fixed(PUBLIC_A),
        &store,
        &publisher,
        &config,
    );

    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Published);

    tokio::time::advance(Duration::from_secs(config.dns.cooldown_secs - 1)).await;
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Unchanged);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Published);
    assert_eq!(dns_action(engine.run_cycle().await), DnsAction::Unchanged);

    assert_eq!(publisher.publish_count(), 2);
}
