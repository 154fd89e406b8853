// # dyndnsd - dynamic DNS daemon
//
// Keeps one Route 53 record pointed at this host's public IP.
//
// The daemon is a thin integration layer:
// 1. Parse flags (each with a `DYNDNS_*` environment fallback)
// 2. Validate them and initialize logging
// 3. Register providers and IP resolvers, build them from configuration
// 4. Run the engine until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Record
// - `--hosted-zone-id` / `DYNDNS_HOSTED_ZONE_ID` (default `localhost`)
// - `--record-name` / `DYNDNS_RECORD_NAME` (default `80`)
// - `--ttl` / `DYNDNS_TTL` (default 300)
//
// ### Route 53
// - `--region` / `DYNDNS_REGION` (default `us-east-1`)
// - `--comment`, `--set-identifier`, `--dry-run`
// - Credentials come from the AWS default chain (`AWS_ACCESS_KEY_ID`,
//   `AWS_PROFILE`, instance metadata, ...)
//
// ### IP source
// - `--ip-source http|socket` (default `http`)
// - `--ip-urls`, `--consensus majority|first`, `--min-votes` (http)
// - `--socket-target` (socket)
//
// ### Engine
// - `--interval` / `DYNDNS_INTERVAL_SECS` (default 300, also the retry wait)
// - `--timeout` / `DYNDNS_TIMEOUT_SECS` (default 30, per external call)
// - `--max-failures` / `DYNDNS_MAX_FAILURES` (default 0 = retry forever)
// - `--require-public-ip`
//
// ## Example
//
// ```bash
// export AWS_PROFILE=dyndns
// dyndnsd --hosted-zone-id Z0123456789ABC --record-name home.example.com --ttl 60
// ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dyndns_core::config::{
    ConsensusStrategy, DEFAULT_IP_SERVICES, DdnsConfig, EngineConfig, IpSourceConfig,
    ProviderConfig, RecordConfig, split_request_timeout,
};
use dyndns_core::{DdnsEngine, ProviderRegistry};
use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (including the consecutive-failure limit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IpSourceKind {
    Http,
    Socket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Consensus {
    Majority,
    First,
}

impl From<Consensus> for ConsensusStrategy {
    fn from(consensus: Consensus) -> Self {
        match consensus {
            Consensus::Majority => ConsensusStrategy::Majority,
            Consensus::First => ConsensusStrategy::FirstSuccess,
        }
    }
}

/// Keep a Route 53 record pointed at this host's public IP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    /// Route 53 hosted zone ID
    #[arg(long, env = "DYNDNS_HOSTED_ZONE_ID", default_value = "localhost")]
    hosted_zone_id: String,

    /// DNS record name to keep current
    #[arg(long, env = "DYNDNS_RECORD_NAME", default_value = "80")]
    record_name: String,

    /// TTL of the DNS record, in seconds
    #[arg(long, env = "DYNDNS_TTL", default_value_t = 300)]
    ttl: u32,

    /// AWS region used for API calls
    #[arg(long, env = "DYNDNS_REGION", default_value = "us-east-1")]
    region: String,

    /// Seconds between checks, and between retries after a failure
    #[arg(long, env = "DYNDNS_INTERVAL_SECS", default_value_t = 300)]
    interval: u64,

    /// How the public IP is learned
    #[arg(long, env = "DYNDNS_IP_SOURCE", value_enum, default_value_t = IpSourceKind::Http)]
    ip_source: IpSourceKind,

    /// "What is my IP" services, comma separated
    #[arg(long, env = "DYNDNS_IP_URLS", value_delimiter = ',')]
    ip_urls: Vec<String>,

    /// How answers from several services are combined
    #[arg(long, env = "DYNDNS_CONSENSUS", value_enum, default_value_t = Consensus::Majority)]
    consensus: Consensus,

    /// Agreeing services required for a majority answer
    #[arg(long, env = "DYNDNS_MIN_VOTES", default_value_t = 1)]
    min_votes: usize,

    /// Host the UDP socket is aimed at (socket source only)
    #[arg(long, env = "DYNDNS_SOCKET_TARGET", default_value = "8.8.8.8:80")]
    socket_target: String,

    /// Upper bound, in seconds, on each resolve or update call
    #[arg(long, env = "DYNDNS_TIMEOUT_SECS", default_value_t = 30)]
    timeout: u64,

    /// Exit after this many consecutive failed cycles (0 = never)
    #[arg(long, env = "DYNDNS_MAX_FAILURES", default_value_t = 0)]
    max_failures: usize,

    /// Treat private, loopback and other non-public answers as failures
    #[arg(long, env = "DYNDNS_REQUIRE_PUBLIC_IP")]
    require_public_ip: bool,

    /// Comment attached to each Route 53 change batch
    #[arg(long, env = "DYNDNS_COMMENT")]
    comment: Option<String>,

    /// Send the record as a weighted record with this set identifier
    #[arg(long, env = "DYNDNS_SET_IDENTIFIER")]
    set_identifier: Option<String>,

    /// Log changes instead of sending them
    #[arg(long, env = "DYNDNS_DRY_RUN")]
    dry_run: bool,

    /// trace, debug, info, warn or error
    #[arg(long, env = "DYNDNS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Options {
    /// Validate the options
    ///
    /// Checks value formats and numeric ranges the core configuration does
    /// not know about (DNS name syntax, log level, sane bounds).
    fn validate(&self) -> Result<()> {
        if self.hosted_zone_id.trim().is_empty() {
            anyhow::bail!("--hosted-zone-id cannot be empty");
        }

        validate_domain_name(&self.record_name)?;

        if self.ttl == 0 || self.ttl > 2_147_483_647 {
            anyhow::bail!("--ttl must be between 1 and 2147483647. Got: {}", self.ttl);
        }

        if !(10..=86_400).contains(&self.interval) {
            anyhow::bail!(
                "--interval must be between 10 and 86400 seconds. Got: {}",
                self.interval
            );
        }

        if !(1..=300).contains(&self.timeout) {
            anyhow::bail!(
                "--timeout must be between 1 and 300 seconds. Got: {}",
                self.timeout
            );
        }

        if self.region.trim().is_empty() {
            anyhow::bail!("--region cannot be empty");
        }

        if self.set_identifier.as_ref().is_some_and(|id| id.is_empty()) {
            anyhow::bail!("--set-identifier cannot be empty when given");
        }

        if self.ip_source == IpSourceKind::Http {
            for url in &self.ip_urls {
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    anyhow::bail!("--ip-urls entries must use HTTP or HTTPS. Got: {}", url);
                }
            }

            let services = self.ip_urls().len();
            if self.min_votes == 0 || self.min_votes > services {
                anyhow::bail!(
                    "--min-votes must be between 1 and {} (number of IP services). Got: {}",
                    services,
                    self.min_votes
                );
            }
        }

        if self.ip_source == IpSourceKind::Socket && !self.socket_target.contains(':') {
            anyhow::bail!(
                "--socket-target must be host:port. Got: {}",
                self.socket_target
            );
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }

    fn ip_urls(&self) -> Vec<String> {
        if self.ip_urls.is_empty() {
            DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect()
        } else {
            self.ip_urls.clone()
        }
    }

    fn to_config(&self) -> DdnsConfig {
        let ip_source = match self.ip_source {
            IpSourceKind::Http => {
                let urls = self.ip_urls();
                // Sequential queries must fit in one call timeout
                let request_timeout_ms =
                    split_request_timeout(Duration::from_secs(self.timeout), urls.len());
                IpSourceConfig::Http {
                    urls,
                    strategy: self.consensus.into(),
                    min_votes: self.min_votes,
                    request_timeout_ms,
                }
            }
            IpSourceKind::Socket => IpSourceConfig::Socket {
                target: self.socket_target.clone(),
            },
        };

        DdnsConfig {
            ip_source,
            provider: ProviderConfig::Route53 {
                region: self.region.clone(),
                comment: self.comment.clone(),
                set_identifier: self.set_identifier.clone(),
                dry_run: self.dry_run,
            },
            record: RecordConfig::new(self.hosted_zone_id.trim(), self.record_name.as_str())
                .with_ttl(self.ttl),
            engine: EngineConfig {
                interval_secs: self.interval,
                call_timeout_secs: self.timeout,
                max_consecutive_failures: (self.max_failures > 0).then_some(self.max_failures),
                require_public_ip: self.require_public_ip,
                ..EngineConfig::default()
            },
        }
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "--log-level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Validate that a string is a valid DNS record name
///
/// Basic RFC 1035 checks. A single trailing dot (fully qualified form) and
/// a leading `*` wildcard label are accepted, as are underscores (used by
/// service records).
fn validate_domain_name(domain: &str) -> Result<()> {
    let name = domain.strip_suffix('.').unwrap_or(domain);

    if name.is_empty() {
        anyhow::bail!("Record name cannot be empty");
    }

    if name.len() > 253 {
        anyhow::bail!(
            "Record name too long: {} chars (max 253). Got: {}",
            name.len(),
            domain
        );
    }

    for (i, label) in name.split('.').enumerate() {
        if label.is_empty() {
            anyhow::bail!("Record name has empty label: '{}'", domain);
        }

        if label == "*" && i == 0 {
            continue;
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Record name label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "Record name label contains invalid characters. Label: '{}'. \
                Valid: letters, digits, hyphen and underscore.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Record name label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let options = match Options::try_parse() {
        Ok(options) => options,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                DdnsExitCode::ConfigError.into()
            } else {
                // --help / --version
                DdnsExitCode::CleanShutdown.into()
            };
        }
    };

    if let Err(e) = options.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&options.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting dyndnsd {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(options.to_config()).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    code.into()
}

fn exit_code_for(error: &anyhow::Error) -> DdnsExitCode {
    match error.downcast_ref::<dyndns_core::Error>() {
        Some(dyndns_core::Error::Config(_)) => DdnsExitCode::ConfigError,
        _ => DdnsExitCode::RuntimeError,
    }
}

fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "route53")]
    dyndns_provider_route53::register(&registry);

    #[cfg(feature = "http")]
    dyndns_ip_http::register(&registry);

    #[cfg(feature = "socket")]
    dyndns_ip_socket::register(&registry);

    debug!(
        "Registered providers: {:?}, IP resolvers: {:?}",
        registry.list_providers(),
        registry.list_ip_resolvers()
    );

    registry
}

/// Run the daemon until a shutdown signal or a fatal engine error
async fn run_daemon(config: DdnsConfig) -> Result<()> {
    config.validate()?;

    let registry = build_registry();

    let resolver = registry.create_ip_resolver(&config.ip_source)?;
    let provider = registry.create_provider(&config.provider).await?;

    info!(
        "Record: {} in zone {} (ttl {}), IP source: {}, provider: {}",
        config.record.name,
        config.record.zone_id,
        config.record.ttl,
        config.ip_source.type_name(),
        config.provider.type_name()
    );

    let (engine, mut event_rx) = DdnsEngine::new(resolver, provider, config)?;

    let monitor = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let shutdown = shutdown_signal()?;
    let result = engine.run_until(shutdown).await;

    // Closes the event channel so the monitor finishes
    drop(engine);
    let _ = monitor.await;

    result.context("Reconciliation loop stopped")
}

/// Future completing on SIGTERM or SIGINT
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
    })
}

/// Future completing on Ctrl-C
///
/// Fallback for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: Ctrl-C"),
            Err(e) => {
                error!("Failed to wait for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    })
}
