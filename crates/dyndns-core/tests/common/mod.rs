//! Test doubles and common utilities for reconciliation contract tests
//!
//! The fakes are scripted: each call to `resolve()` / `upsert()` consumes the
//! next step. Clones share their script and their call log, so a test keeps
//! one clone for assertions and hands another to the engine.

#![allow(dead_code)]

use dyndns_core::config::{DdnsConfig, EngineConfig, RecordConfig};
use dyndns_core::engine::EngineEvent;
use dyndns_core::error::{Error, Result};
use dyndns_core::traits::{ChangeReceipt, DnsProvider, IpAddress, IpResolver, RecordType, UpsertRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const ZONE_ID: &str = "Z0TESTZONE";
pub const RECORD_NAME: &str = "home.example.com";

/// One scripted answer from the resolver
pub enum ResolveStep {
    Ip(&'static str),
    Fail(Error),
    /// Never returns; only the engine's call timeout or shutdown ends it
    Hang,
}

/// IP resolver that replays a script, then fails with "script exhausted"
#[derive(Clone)]
pub struct ScriptedResolver {
    script: Arc<Mutex<VecDeque<ResolveStep>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new(steps: impl IntoIterator<Item = ResolveStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of resolve() calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpResolver for ScriptedResolver {
    async fn resolve(&self) -> Result<IpAddress> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ResolveStep::Ip(ip)) => IpAddress::classify(ip),
            Some(ResolveStep::Fail(e)) => Err(e),
            Some(ResolveStep::Hang) => std::future::pending().await,
            None => Err(Error::resolution("script exhausted")),
        }
    }

    fn resolver_name(&self) -> &'static str {
        "scripted"
    }
}

/// One scripted answer from the provider
pub enum UpsertStep {
    Accept,
    Reject(Error),
    Hang,
}

/// DNS provider that records every request and keeps a fake zone
///
/// Unscripted calls are accepted.
#[derive(Clone)]
pub struct RecordingProvider {
    script: Arc<Mutex<VecDeque<UpsertStep>>>,
    requests: Arc<Mutex<Vec<UpsertRequest>>>,
    zone: Arc<Mutex<HashMap<(String, RecordType), (String, u32)>>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(steps: impl IntoIterator<Item = UpsertStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
            zone: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Every request received, accepted or not
    pub fn requests(&self) -> Vec<UpsertRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Current fake zone contents: (name, type) -> (target, ttl)
    pub fn zone(&self) -> HashMap<(String, RecordType), (String, u32)> {
        self.zone.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingProvider {
    async fn upsert(&self, request: &UpsertRequest) -> Result<ChangeReceipt> {
        self.requests.lock().unwrap().push(request.clone());

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(UpsertStep::Reject(e)) => Err(e),
            Some(UpsertStep::Hang) => std::future::pending().await,
            Some(UpsertStep::Accept) | None => {
                self.zone.lock().unwrap().insert(
                    (request.name().to_string(), request.record_type()),
                    (request.target().to_string(), request.ttl()),
                );
                Ok(ChangeReceipt::accepted("PENDING"))
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Minimal valid configuration for the test record
pub fn minimal_config() -> DdnsConfig {
    DdnsConfig {
        record: RecordConfig::new(ZONE_ID, RECORD_NAME).with_ttl(300),
        engine: EngineConfig {
            interval_secs: 300,
            call_timeout_secs: 30,
            max_consecutive_failures: None,
            require_public_ip: false,
            event_channel_capacity: 100,
        },
        ..DdnsConfig::default()
    }
}

/// Receive events until one matches `stop`, returning all of them
///
/// Panics if the channel closes first.
pub async fn collect_until(
    rx: &mut mpsc::Receiver<EngineEvent>,
    mut stop: impl FnMut(&EngineEvent) -> bool,
) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv().await.expect("engine event channel closed");
        let done = stop(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}
