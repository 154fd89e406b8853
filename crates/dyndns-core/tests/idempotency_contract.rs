//! Contract Test: Idempotent Upsert
//!
//! Constraints verified:
//! - Applying the same upsert twice leaves the zone as applying it once
//! - A repeated address results in a single upsert across many cycles
//! - The event stream reports skipped cycles

mod common;

use common::*;
use dyndns_core::engine::EngineEvent;
use dyndns_core::traits::{DnsProvider, IpAddress, RecordType, UpsertRequest};
use dyndns_core::DdnsEngine;
use tokio::sync::oneshot;

#[tokio::test]
async fn repeated_upsert_converges() {
    let ip = IpAddress::classify("203.0.113.5").unwrap();
    let request = UpsertRequest::for_address(&ip, ZONE_ID, RECORD_NAME, 300).unwrap();

    let once = RecordingProvider::new();
    once.upsert(&request).await.unwrap();

    let twice = RecordingProvider::new();
    twice.upsert(&request).await.unwrap();
    twice.upsert(&request).await.unwrap();

    assert_eq!(once.zone(), twice.zone());
    assert_eq!(
        twice.zone().get(&(RECORD_NAME.to_string(), RecordType::A)),
        Some(&("203.0.113.5".to_string(), 300))
    );
}

#[tokio::test(start_paused = true)]
async fn stable_address_upserted_once() {
    let resolver = ScriptedResolver::new([
        ResolveStep::Ip("203.0.113.5"),
        ResolveStep::Ip("203.0.113.5"),
        ResolveStep::Ip("203.0.113.5"),
    ]);
    let provider = RecordingProvider::new();
    let (engine, mut event_rx) = DdnsEngine::new(
        Box::new(resolver),
        Box::new(provider.clone()),
        minimal_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    let mut skipped = 0;
    let events = collect_until(&mut event_rx, |e| {
        if matches!(e, EngineEvent::UpdateSkipped { .. }) {
            skipped += 1;
        }
        skipped == 2
    })
    .await;

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());

    assert_eq!(provider.calls(), 1);
    let succeeded: Vec<&EngineEvent> = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::UpdateSucceeded { .. }))
        .collect();
    assert_eq!(succeeded.len(), 1);
    match succeeded[0] {
        EngineEvent::UpdateSucceeded {
            record_name,
            record_type,
            target,
            previous_ip,
            ..
        } => {
            assert_eq!(record_name, RECORD_NAME);
            assert_eq!(*record_type, RecordType::A);
            assert_eq!(target, "203.0.113.5");
            assert_eq!(*previous_ip, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
