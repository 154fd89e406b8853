//! Contract Test: Fixed-Interval Retry
//!
//! Runs the full loop on a paused clock.
//!
//! Constraints verified:
//! - A failed cycle waits exactly one interval before the next attempt
//! - Failures are retried indefinitely unless a limit is configured
//! - A configured limit ends the loop with `RetriesExhausted`
//! - A successful cycle resets the failure count
//! - Hung collaborators are cut off by the call timeout

mod common;

use common::*;
use dyndns_core::engine::EngineEvent;
use dyndns_core::error::Error;
use dyndns_core::{CycleOutcome, DdnsEngine, ReconcilerState};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn failed_resolution_retries_after_one_interval() {
    let resolver = ScriptedResolver::new([
        ResolveStep::Fail(Error::resolution("checkip timed out")),
        ResolveStep::Ip("203.0.113.5"),
    ]);
    let provider = RecordingProvider::new();
    let (engine, mut event_rx) = DdnsEngine::new(
        Box::new(resolver.clone()),
        Box::new(provider.clone()),
        minimal_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let start = Instant::now();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    let events = collect_until(&mut event_rx, |e| {
        matches!(e, EngineEvent::UpdateSucceeded { .. })
    })
    .await;

    assert!(start.elapsed() >= Duration::from_secs(300));
    assert!(events.contains(&EngineEvent::RetryScheduled {
        after: Duration::from_secs(300),
        consecutive_failures: 1,
    }));
    assert_eq!(resolver.calls(), 2);
    assert_eq!(provider.calls(), 1);

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn failed_update_retries_same_target() {
    let resolver = ScriptedResolver::new([
        ResolveStep::Ip("203.0.113.5"),
        ResolveStep::Ip("203.0.113.5"),
    ]);
    let provider = RecordingProvider::scripted([UpsertStep::Reject(Error::auth(
        "InvalidClientTokenId",
    ))]);
    let (engine, mut event_rx) = DdnsEngine::new(
        Box::new(resolver),
        Box::new(provider.clone()),
        minimal_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    let events = collect_until(&mut event_rx, |e| {
        matches!(e, EngineEvent::UpdateSucceeded { .. })
    })
    .await;

    assert!(events.iter().any(|e| matches!(e, EngineEvent::UpdateFailed { .. })));
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn failure_limit_ends_loop() {
    // Empty script: every resolve fails
    let resolver = ScriptedResolver::new(Vec::<ResolveStep>::new());
    let provider = RecordingProvider::new();

    let mut config = minimal_config();
    config.engine.max_consecutive_failures = Some(3);

    let (engine, mut event_rx) = DdnsEngine::new(
        Box::new(resolver.clone()),
        Box::new(provider.clone()),
        config,
    )
    .unwrap();

    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    let start = Instant::now();
    let result = engine.run_with_shutdown(Some(shutdown_rx)).await;

    match result {
        Err(Error::RetriesExhausted { failures, last_error }) => {
            assert_eq!(failures, 3);
            assert!(last_error.contains("script exhausted"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    // Two waits between three attempts
    assert_eq!(start.elapsed(), Duration::from_secs(600));
    assert_eq!(resolver.calls(), 3);
    assert_eq!(provider.calls(), 0);

    let mut last = None;
    while let Ok(event) = event_rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(EngineEvent::Stopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn success_resets_failure_count() {
    let resolver = ScriptedResolver::new([
        ResolveStep::Fail(Error::resolution("offline")),
        ResolveStep::Fail(Error::resolution("offline")),
        ResolveStep::Ip("203.0.113.5"),
        ResolveStep::Fail(Error::resolution("offline")),
        ResolveStep::Fail(Error::resolution("offline")),
        ResolveStep::Ip("203.0.113.5"),
    ]);

    let mut config = minimal_config();
    config.engine.max_consecutive_failures = Some(3);

    let (engine, mut event_rx) = DdnsEngine::new(
        Box::new(resolver.clone()),
        Box::new(RecordingProvider::new()),
        config,
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    let events = collect_until(&mut event_rx, |e| {
        matches!(e, EngineEvent::UpdateSkipped { .. })
    })
    .await;

    let retry_counts: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::RetryScheduled { consecutive_failures, .. } => Some(*consecutive_failures),
            _ => None,
        })
        .collect();
    assert_eq!(retry_counts, [1, 2, 1, 2]);
    assert_eq!(resolver.calls(), 6);

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn hung_resolver_times_out() {
    let resolver = ScriptedResolver::new([ResolveStep::Hang]);
    let provider = RecordingProvider::new();
    let (engine, _event_rx) = DdnsEngine::new(
        Box::new(resolver),
        Box::new(provider.clone()),
        minimal_config(),
    )
    .unwrap();

    let start = Instant::now();
    let mut state = ReconcilerState::new();
    let outcome = engine.run_cycle(&mut state).await;

    match outcome {
        CycleOutcome::ResolutionFailed(Error::Timeout { operation, after }) => {
            assert_eq!(operation, "resolve");
            assert_eq!(after, Duration::from_secs(30));
        }
        other => panic!("expected resolve timeout, got {:?}", other),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_provider_times_out() {
    let resolver = ScriptedResolver::new([ResolveStep::Ip("203.0.113.5")]);
    let provider = RecordingProvider::scripted([UpsertStep::Hang]);
    let (engine, _event_rx) = DdnsEngine::new(
        Box::new(resolver),
        Box::new(provider),
        minimal_config(),
    )
    .unwrap();

    let mut state = ReconcilerState::new();
    match engine.run_cycle(&mut state).await {
        CycleOutcome::UpdateFailed { error, .. } => {
            assert!(matches!(error, Error::Timeout { operation: "upsert", .. }));
            assert!(error.is_update());
        }
        other => panic!("expected upsert timeout, got {:?}", other),
    }
    assert_eq!(state.last_known_ip(), None);
}
