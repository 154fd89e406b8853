// # DNS Provider Trait
//
// Defines the interface for writing a DNS record through a zone service.
//
// ## Implementations
//
// - AWS Route 53: `dyndns-provider-route53` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::{DnsProvider, RecordType, UpsertRequest};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let request = UpsertRequest::new(RecordType::A, "Z123", "home.example.com", "203.0.113.5", 300)?;
//     provider.upsert(&request).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::traits::ip_resolver::{IpAddress, IpFamily};

/// DNS record types the updater can write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical-name alias
    Cname,
}

impl RecordType {
    /// Record type for an address family: `A` for IPv4, `AAAA` for IPv6
    pub fn for_family(family: IpFamily) -> Self {
        match family {
            IpFamily::V4 => RecordType::A,
            IpFamily::V6 => RecordType::Aaaa,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single create-or-replace request
///
/// Built fresh for every update attempt and not retained afterwards.
/// Construction enforces the updater's preconditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    record_type: RecordType,
    zone_id: String,
    name: String,
    target: String,
    ttl: u32,
}

impl UpsertRequest {
    /// Build a request
    ///
    /// Fails with `InvalidInput` if `zone_id`, `name` or `target` is empty or
    /// `ttl` is zero.
    pub fn new(
        record_type: RecordType,
        zone_id: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
        ttl: u32,
    ) -> Result<Self, crate::Error> {
        let zone_id = zone_id.into();
        let name = name.into();
        let target = target.into();

        if zone_id.is_empty() {
            return Err(crate::Error::invalid_input("zone ID cannot be empty"));
        }
        if name.is_empty() {
            return Err(crate::Error::invalid_input("record name cannot be empty"));
        }
        if target.is_empty() {
            return Err(crate::Error::invalid_input("record target cannot be empty"));
        }
        if ttl == 0 {
            return Err(crate::Error::invalid_input("TTL must be > 0"));
        }

        Ok(Self {
            record_type,
            zone_id,
            name,
            target,
            ttl,
        })
    }

    /// Address record pointing `name` at a resolved IP
    pub fn for_address(
        ip: &IpAddress,
        zone_id: impl Into<String>,
        name: impl Into<String>,
        ttl: u32,
    ) -> Result<Self, crate::Error> {
        Self::new(
            RecordType::for_family(ip.family()),
            zone_id,
            name,
            ip.as_str(),
            ttl,
        )
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }
}

/// Acknowledgement that the zone service accepted a change
///
/// Acceptance is not propagation: the change may still be pending on the
/// provider's authoritative servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReceipt {
    /// Opaque status text returned by the provider
    pub detail: String,
    /// True if the provider only logged the change (dry-run)
    pub dry_run: bool,
}

impl ChangeReceipt {
    pub fn accepted(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            dry_run: true,
        }
    }
}

/// Trait for DNS zone service implementations
///
/// # Rules
///
/// - **Single-shot**: one change request per call
/// - **No retry logic or backoff**: return the error; the reconciliation loop
///   decides when to try again
/// - **No state**: nothing cached between calls, no "is it already set?"
///   decisions (the loop's change detection owns that)
/// - **No spawned tasks**
///
/// # Idempotency
///
/// `upsert` creates the record if absent and replaces it if present. Calling
/// it twice with the same request leaves the zone in the same state as
/// calling it once.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or replace the record described by `request`
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeReceipt)`: the service accepted the change
    /// - `Err(Error)`: the service rejected it (bad zone, throttling, invalid
    ///   record, auth failure) or could not be reached
    async fn upsert(&self, request: &UpsertRequest) -> Result<ChangeReceipt, crate::Error>;

    /// Whether this provider can write the given record type
    fn supports_record_type(&self, _record_type: RecordType) -> bool {
        true
    }

    /// Provider name (for logging/debugging), e.g. "route53"
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
///
/// Creation is async because provider clients typically need to load
/// credentials and region settings first.
#[async_trait]
pub trait DnsProviderFactory: Send + Sync {
    async fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
