// # Reconciler State
//
// Process-lifetime memory of the last address the DNS record was
// successfully pointed at.
//
// ## Lifecycle
//
// - Empty at process start
// - Advanced only by the engine, and only after the provider accepted an
//   update
// - Never persisted: after a restart the first cycle always upserts

use chrono::{DateTime, Utc};

use crate::traits::IpAddress;

/// State threaded through the reconciliation loop
///
/// The engine owns one of these for the duration of a run; tests construct
/// their own and step cycles with [`crate::DdnsEngine::run_cycle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilerState {
    last_known_ip: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl ReconcilerState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the most recent successful update, if any
    pub fn last_known_ip(&self) -> Option<&str> {
        self.last_known_ip.as_deref()
    }

    /// When the most recent successful update happened
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether `ip` is what the record already points at
    ///
    /// An empty address compares equal to the empty initial state.
    pub fn is_current(&self, ip: &IpAddress) -> bool {
        match &self.last_known_ip {
            Some(last) => last == ip.as_str(),
            None => ip.as_str().is_empty(),
        }
    }

    /// Record a successful update, returning its timestamp
    pub(crate) fn record_success(&mut self, ip: &IpAddress) -> DateTime<Utc> {
        let now = Utc::now();
        self.last_known_ip = Some(ip.as_str().to_string());
        self.last_updated = Some(now);
        now
    }
}
