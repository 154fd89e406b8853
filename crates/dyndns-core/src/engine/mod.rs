//! Reconciliation engine
//!
//! The DdnsEngine is responsible for:
//! - Resolving the current public IP via an IpResolver
//! - Comparing it with the last successfully published address
//! - Upserting the DNS record via a DnsProvider when it changed
//! - Waiting a fixed interval, then doing it again
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!        ┌──────────▶│  DdnsEngine  │───── EngineEvent ─────▶ (monitor)
//!        │           └──────────────┘
//!        │             │          │
//!   ReconcilerState    ▼          ▼
//!   (owned by loop)  ┌──────────┐ ┌─────────────┐
//!                    │IpResolver│ │ DnsProvider │
//!                    │(resolve) │ │  (upsert)   │
//!                    └──────────┘ └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Resolve the public IP (bounded by the call timeout)
//! 2. Same as the last successful update → nothing to do
//! 3. Otherwise classify it, pick `A`/`AAAA`, upsert
//! 4. On success, advance the state; on any failure leave it alone
//! 5. Sleep the interval (after a failure this is the retry wait) and repeat
//!
//! Failures of either kind are never fatal unless a consecutive-failure
//! limit is configured.

use std::future::Future;
use std::time::Duration;

use crate::config::{DdnsConfig, RecordConfig};
use crate::error::{Error, Result};
use crate::state::ReconcilerState;
use crate::traits::{ChangeReceipt, DnsProvider, IpAddress, IpFamily, IpResolver, RecordType, UpsertRequest};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        zone_id: String,
        record_name: String,
    },

    /// The resolver returned an address
    Resolved {
        ip: String,
    },

    /// Address unchanged, no update issued
    UpdateSkipped {
        record_name: String,
        current_ip: String,
    },

    /// DNS update started
    UpdateStarted {
        record_name: String,
        record_type: RecordType,
        target: String,
    },

    /// DNS update accepted by the provider
    UpdateSucceeded {
        record_name: String,
        record_type: RecordType,
        target: String,
        previous_ip: Option<String>,
        updated_at: DateTime<Utc>,
    },

    /// The resolver failed
    ResolutionFailed {
        error: String,
    },

    /// The provider rejected the update
    UpdateFailed {
        record_name: String,
        target: String,
        error: String,
    },

    /// A failed cycle will be retried after `after`
    RetryScheduled {
        after: Duration,
        consecutive_failures: usize,
    },

    /// Next poll after a successful cycle
    PollScheduled {
        after: Duration,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// What a single cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// The record was upserted and the state advanced
    Updated {
        ip: IpAddress,
        record_type: RecordType,
        receipt: ChangeReceipt,
    },

    /// The address matched the last successful update
    Unchanged {
        ip: IpAddress,
    },

    /// No address this cycle
    ResolutionFailed(Error),

    /// Address resolved but the upsert failed; state untouched
    UpdateFailed {
        ip: IpAddress,
        error: Error,
    },
}

impl CycleOutcome {
    /// The error that failed this cycle, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            CycleOutcome::ResolutionFailed(error) => Some(error),
            CycleOutcome::UpdateFailed { error, .. } => Some(error),
            CycleOutcome::Updated { .. } | CycleOutcome::Unchanged { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Start with [`DdnsEngine::run()`] or [`DdnsEngine::run_until()`]
/// 3. Engine cycles until the shutdown future completes, or until the
///    consecutive-failure limit (if any) is reached
///
/// ## Threading
///
/// One logical worker. Each cycle is strictly sequential: resolve, compare,
/// maybe update, sleep. No locking is involved because the state is owned by
/// the running loop.
pub struct DdnsEngine {
    /// IP oracle
    resolver: Box<dyn IpResolver>,

    /// DNS zone service
    provider: Box<dyn DnsProvider>,

    /// The record to keep current
    record: RecordConfig,

    /// Poll interval, also used as the retry wait
    interval: Duration,

    /// Upper bound on each external call
    call_timeout: Duration,

    /// Stop after this many consecutive failed cycles (None = never)
    max_consecutive_failures: Option<usize>,

    /// Reject non-public resolver answers
    require_public_ip: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Box<dyn IpResolver>,
        provider: Box<dyn DnsProvider>,
        config: DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            resolver,
            provider,
            interval: config.engine.interval(),
            call_timeout: config.engine.call_timeout(),
            max_consecutive_failures: config.engine.max_consecutive_failures,
            require_public_ip: config.engine.require_public_ip,
            record: config.record,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Consecutive-failure limit reached
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run with a programmatic shutdown channel
    ///
    /// `None` falls back to [`DdnsEngine::run()`]. A dropped sender counts
    /// as a shutdown request.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        match shutdown_rx {
            Some(rx) => {
                self.run_until(async move {
                    let _ = rx.await;
                })
                .await
            }
            None => self.run().await,
        }
    }

    /// Run until `shutdown` completes
    ///
    /// Shutdown is honoured while a cycle is in flight and while sleeping.
    /// An interrupted cycle never advances the state.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.emit_event(EngineEvent::Started {
            zone_id: self.record.zone_id.clone(),
            record_name: self.record.name.clone(),
        });
        info!(
            "Keeping {} in zone {} current (provider: {}, resolver: {}, interval: {:?})",
            self.record.name,
            self.record.zone_id,
            self.provider.provider_name(),
            self.resolver.resolver_name(),
            self.interval
        );

        let mut state = ReconcilerState::new();
        let mut consecutive_failures = 0usize;

        loop {
            let outcome = tokio::select! {
                outcome = self.run_cycle(&mut state) => outcome,
                _ = &mut shutdown => {
                    self.stop("Shutdown signal during cycle");
                    return Ok(());
                }
            };

            match outcome.error() {
                Some(error) => {
                    consecutive_failures += 1;

                    if let Some(limit) = self.max_consecutive_failures
                        && consecutive_failures >= limit
                    {
                        error!(
                            "{} consecutive cycles failed, giving up",
                            consecutive_failures
                        );
                        self.stop("Consecutive failure limit reached");
                        return Err(Error::RetriesExhausted {
                            failures: consecutive_failures,
                            last_error: error.to_string(),
                        });
                    }

                    warn!("Will retry in {} seconds", self.interval.as_secs());
                    self.emit_event(EngineEvent::RetryScheduled {
                        after: self.interval,
                        consecutive_failures,
                    });
                }
                None => {
                    consecutive_failures = 0;
                    debug!("Next check in {} seconds", self.interval.as_secs());
                    self.emit_event(EngineEvent::PollScheduled {
                        after: self.interval,
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    self.stop("Shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    /// Run exactly one resolve → compare → update cycle
    ///
    /// Does not sleep. `state` is advanced only when the provider accepted
    /// the update.
    pub async fn run_cycle(&self, state: &mut ReconcilerState) -> CycleOutcome {
        let ip = match self.resolve().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Getting public IP failed: {}", e);
                self.emit_event(EngineEvent::ResolutionFailed {
                    error: e.to_string(),
                });
                return CycleOutcome::ResolutionFailed(e);
            }
        };

        info!("Obtained public IP: {}", ip);
        self.emit_event(EngineEvent::Resolved {
            ip: ip.to_string(),
        });

        if state.is_current(&ip) {
            info!("Public IP did not change, nothing to do");
            self.emit_event(EngineEvent::UpdateSkipped {
                record_name: self.record.name.clone(),
                current_ip: ip.to_string(),
            });
            return CycleOutcome::Unchanged { ip };
        }

        match ip.family() {
            IpFamily::V4 => debug!("Detected IPv4 address"),
            IpFamily::V6 => debug!("Detected IPv6 address"),
        }

        let request = match UpsertRequest::for_address(
            &ip,
            self.record.zone_id.as_str(),
            self.record.name.as_str(),
            self.record.ttl,
        ) {
            Ok(request) => request,
            Err(e) => return self.update_failed(ip, e),
        };

        info!(
            "Upserting {} record {} -> {} in zone {} (ttl {})",
            request.record_type(),
            request.name(),
            request.target(),
            request.zone_id(),
            request.ttl()
        );
        self.emit_event(EngineEvent::UpdateStarted {
            record_name: request.name().to_string(),
            record_type: request.record_type(),
            target: request.target().to_string(),
        });

        match self.upsert(&request).await {
            Ok(receipt) => {
                let previous_ip = state.last_known_ip().map(str::to_string);
                let updated_at = state.record_success(&ip);

                if receipt.dry_run {
                    info!("Dry-run: {} record not actually changed", self.provider.provider_name());
                } else {
                    info!(
                        "{} record updated at {}",
                        self.provider.provider_name(),
                        updated_at.to_rfc3339()
                    );
                }
                debug!("Change accepted: {}", receipt.detail);

                self.emit_event(EngineEvent::UpdateSucceeded {
                    record_name: request.name().to_string(),
                    record_type: request.record_type(),
                    target: request.target().to_string(),
                    previous_ip,
                    updated_at,
                });

                CycleOutcome::Updated {
                    ip,
                    record_type: request.record_type(),
                    receipt,
                }
            }
            Err(e) => self.update_failed(ip, e),
        }
    }

    /// Resolve with timeout and optional public-range gate
    async fn resolve(&self) -> Result<IpAddress> {
        let ip = tokio::time::timeout(self.call_timeout, self.resolver.resolve())
            .await
            .map_err(|_| Error::Timeout {
                operation: "resolve",
                after: self.call_timeout,
            })?
            .map_err(|e| {
                if e.is_resolution() {
                    e
                } else {
                    Error::resolution(format!("{}: {}", self.resolver.resolver_name(), e))
                }
            })?;

        if self.require_public_ip && !ip.is_public() {
            return Err(Error::resolution(format!(
                "{} is not a public address",
                ip
            )));
        }

        Ok(ip)
    }

    /// Single upsert attempt with timeout
    async fn upsert(&self, request: &UpsertRequest) -> Result<ChangeReceipt> {
        let provider_name = self.provider.provider_name();

        if !self.provider.supports_record_type(request.record_type()) {
            return Err(Error::provider(
                provider_name,
                format!("{} records are not supported", request.record_type()),
            ));
        }

        tokio::time::timeout(self.call_timeout, self.provider.upsert(request))
            .await
            .map_err(|_| Error::Timeout {
                operation: "upsert",
                after: self.call_timeout,
            })?
            .map_err(|e| {
                if e.is_update() {
                    e
                } else {
                    Error::provider(provider_name, e.to_string())
                }
            })
    }

    fn update_failed(&self, ip: IpAddress, error: Error) -> CycleOutcome {
        error!("Failed to update {}: {}", self.record.name, error);
        self.emit_event(EngineEvent::UpdateFailed {
            record_name: self.record.name.clone(),
            target: ip.to_string(),
            error: error.to_string(),
        });
        CycleOutcome::UpdateFailed { ip, error }
    }

    fn stop(&self, reason: &str) {
        info!("{}, engine stopped", reason);
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
