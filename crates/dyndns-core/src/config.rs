//! Configuration types for the dyndns system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP "what is my IP" services
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Main dyndns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// IP source configuration
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// DNS provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// The one DNS record to manage
    #[serde(default)]
    pub record: RecordConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            ip_source: IpSourceConfig::default(),
            provider: ProviderConfig::default(),
            record: RecordConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.record.validate()?;
        self.provider.validate()?;
        self.ip_source.validate()?;
        self.engine.validate()?;

        if let IpSourceConfig::Http {
            urls,
            request_timeout_ms,
            ..
        } = &self.ip_source
        {
            let worst_case = Duration::from_millis(*request_timeout_ms)
                .saturating_mul(u32::try_from(urls.len()).unwrap_or(u32::MAX));
            if worst_case >= self.engine.call_timeout() {
                return Err(crate::Error::config(format!(
                    "{} HTTP services at {}ms each can take {:?}, which does not fit in the {:?} call timeout",
                    urls.len(),
                    request_timeout_ms,
                    worst_case,
                    self.engine.call_timeout()
                )));
            }
        }

        Ok(())
    }
}

impl Default for DdnsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// HTTP "what is my IP" services
    Http {
        /// Services to query, in order
        urls: Vec<String>,
        /// How answers from several services are combined
        #[serde(default)]
        strategy: ConsensusStrategy,
        /// Minimum agreeing answers required by `Majority`
        #[serde(default = "default_min_votes")]
        min_votes: usize,
        /// Per-request timeout in milliseconds
        ///
        /// Services are queried one after another, so all of them together
        /// must fit inside the engine's call timeout.
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },

    /// Local address of a UDP socket "connected" to a well-known host
    ///
    /// Only a valid proxy for the public address when this host is not
    /// behind NAT.
    Socket {
        /// Host and port to aim the socket at (e.g. "8.8.8.8:80")
        target: String,
    },

    /// Custom IP source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http {
                urls,
                min_votes,
                request_timeout_ms,
                ..
            } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("HTTP IP source needs at least one URL"));
                }
                if urls.iter().any(|u| u.is_empty()) {
                    return Err(crate::Error::config("HTTP IP source URL cannot be empty"));
                }
                if *min_votes == 0 || *min_votes > urls.len() {
                    return Err(crate::Error::config(format!(
                        "min_votes must be between 1 and {} (number of URLs)",
                        urls.len()
                    )));
                }
                if *request_timeout_ms == 0 {
                    return Err(crate::Error::config("HTTP request timeout must be > 0"));
                }
                Ok(())
            }
            IpSourceConfig::Socket { target } => {
                if target.is_empty() {
                    return Err(crate::Error::config("Socket IP source target cannot be empty"));
                }
                Ok(())
            }
            IpSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom IP source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom IP source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Http { .. } => "http",
            IpSourceConfig::Socket { .. } => "socket",
            IpSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            urls: DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect(),
            strategy: ConsensusStrategy::default(),
            min_votes: default_min_votes(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// How answers from several IP services are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// Ask every service, take the most common answer
    #[default]
    Majority,
    /// Take the first usable answer, falling back down the list
    FirstSuccess,
}

fn default_min_votes() -> usize {
    1
}

// Three default services at 8s each leave headroom under the 30s call timeout
fn default_request_timeout_ms() -> u64 {
    8_000
}

/// Split a call timeout across `services` sequential HTTP requests
///
/// Keeps a fifth of the budget in reserve so the engine's own timeout never
/// races the last request.
pub fn split_request_timeout(call_timeout: Duration, services: usize) -> u64 {
    let budget_ms = call_timeout.as_millis() * 4 / 5;
    let per_request = budget_ms / services.max(1) as u128;
    u64::try_from(per_request).unwrap_or(u64::MAX).max(1)
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// AWS Route 53
    Route53 {
        /// AWS region used to route client calls
        #[serde(default = "default_region")]
        region: String,
        /// Comment attached to each change batch
        #[serde(default)]
        comment: Option<String>,
        /// Set identifier; makes the record a weighted record with weight 100
        #[serde(default)]
        set_identifier: Option<String>,
        /// Log changes instead of sending them
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Route53 {
                region,
                set_identifier,
                ..
            } => {
                if region.is_empty() {
                    return Err(crate::Error::config("Route 53 region cannot be empty"));
                }
                if set_identifier.as_ref().is_some_and(|id| id.is_empty()) {
                    return Err(crate::Error::config("Route 53 set identifier cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Route53 { .. } => "route53",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Route53 {
            region: default_region(),
            comment: None,
            set_identifier: None,
            dry_run: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// DNS record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Zone identifier (Route 53 hosted zone ID)
    #[serde(default = "default_zone_id")]
    pub zone_id: String,

    /// DNS record name to upsert
    #[serde(default = "default_record_name")]
    pub name: String,

    /// TTL in seconds applied to the record
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl RecordConfig {
    /// Create a new record configuration with the default TTL
    pub fn new(zone_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
            ttl: default_ttl(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate the record configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_id.is_empty() {
            return Err(crate::Error::config("Zone ID cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(crate::Error::config("Record name cannot be empty"));
        }
        if self.ttl == 0 {
            return Err(crate::Error::config("TTL must be > 0"));
        }
        Ok(())
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self::new(default_zone_id(), default_record_name())
    }
}

fn default_zone_id() -> String {
    "localhost".to_string()
}

fn default_record_name() -> String {
    "80".to_string()
}

fn default_ttl() -> u32 {
    300
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between cycles, and between a failed cycle and its retry
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound on each external call (resolve, upsert), in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Stop with an error after this many consecutive failed cycles
    ///
    /// `None` retries forever.
    #[serde(default)]
    pub max_consecutive_failures: Option<usize>,

    /// Treat private, loopback and link-local results as resolution failures
    #[serde(default)]
    pub require_public_ip: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Interval must be > 0"));
        }
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("Call timeout must be > 0"));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(crate::Error::config(
                "max_consecutive_failures must be > 0 (omit it to retry forever)",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            max_consecutive_failures: None,
            require_public_ip: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}
