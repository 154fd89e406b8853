// # Route 53 DNS Provider
//
// Upserts a single record through the Route 53 `ChangeResourceRecordSets`
// API.
//
// ## Behaviour
//
// - One API call per upsert, one change per batch, action `UPSERT`
// - No retries: the SDK retry layer is disabled and the engine decides when
//   to try again
// - Service errors are mapped onto the core error variants so the logs say
//   what actually went wrong
// - Dry-run mode builds and logs the change batch without sending it
//
// ## Credentials
//
// Resolved by the AWS default provider chain (environment, shared profile,
// instance metadata). They never pass through this crate and are never
// logged.
//
// ## API Reference
//
// - `POST /2013-04-01/hostedzone/{Id}/rrset/`
//   https://docs.aws.amazon.com/Route53/latest/APIReference/API_ChangeResourceRecordSets.html

use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::config::retry::RetryConfig;
use aws_sdk_route53::config::{BehaviorVersion, Region};
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use dyndns_core::config::ProviderConfig;
use dyndns_core::traits::{ChangeReceipt, DnsProvider, DnsProviderFactory, RecordType, UpsertRequest};
use dyndns_core::{Error, Result};

const PROVIDER_NAME: &str = "route53";

/// Batch comment used when none is configured
pub const DEFAULT_COMMENT: &str = "dyndns upsert";

/// Weight sent with weighted records (when a set identifier is configured)
const WEIGHT: i64 = 100;

/// Error codes Route 53 and the AWS auth layer use for bad credentials
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "IncompleteSignature",
    "InvalidClientTokenId",
    "MissingAuthenticationToken",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

const THROTTLING_CODES: &[&str] = &[
    "PriorRequestNotComplete",
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
];

const INVALID_INPUT_CODES: &[&str] = &["InvalidChangeBatch", "InvalidInput", "InvalidArgument"];

/// Route 53 DNS provider
///
/// Stateless and single-shot: every call to [`DnsProvider::upsert`] is one
/// `ChangeResourceRecordSets` request.
pub struct Route53Provider {
    client: Client,

    /// Change batch comment
    comment: String,

    /// When set, records are sent as weighted records under this identifier
    set_identifier: Option<String>,

    /// Build and log the change, but do not send it
    dry_run: bool,
}

impl std::fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Provider")
            .field("comment", &self.comment)
            .field("set_identifier", &self.set_identifier)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Route53Provider {
    /// Create a provider around an existing SDK client
    pub fn new(
        client: Client,
        comment: Option<String>,
        set_identifier: Option<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            comment: comment.unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
            set_identifier,
            dry_run,
        }
    }

    /// Create a provider using the AWS default credential chain
    ///
    /// SDK-level retries are disabled.
    pub async fn from_env(
        region: impl Into<String>,
        comment: Option<String>,
        set_identifier: Option<String>,
        dry_run: bool,
    ) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        Self::new(Client::new(&sdk_config), comment, set_identifier, dry_run)
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn upsert(&self, request: &UpsertRequest) -> Result<ChangeReceipt> {
        let batch = build_change_batch(request, &self.comment, self.set_identifier.as_deref())?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would upsert {} {} -> {} in hosted zone {}",
                request.record_type(),
                request.name(),
                request.target(),
                request.zone_id()
            );
            tracing::debug!("[DRY-RUN] Change batch: {:?}", batch);
            return Ok(ChangeReceipt::dry_run(format!("{:?}", batch)));
        }

        tracing::debug!(
            "ChangeResourceRecordSets on hosted zone {}: {:?}",
            request.zone_id(),
            batch
        );

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(request.zone_id())
            .change_batch(batch)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service) => classify_service_error(
                    service.code(),
                    service.message().unwrap_or("no message"),
                ),
                None => classify_transport_error(&DisplayErrorContext(&err).to_string()),
            })?;

        tracing::debug!("Route 53 accepted change: {:?}", output);
        Ok(ChangeReceipt::accepted(format!("{:?}", output)))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Build the single-change UPSERT batch for `request`
pub fn build_change_batch(
    request: &UpsertRequest,
    comment: &str,
    set_identifier: Option<&str>,
) -> Result<ChangeBatch> {
    let record = ResourceRecord::builder()
        .value(request.target())
        .build()
        .map_err(invalid_batch)?;

    let mut record_set = ResourceRecordSet::builder()
        .name(request.name())
        .r#type(rr_type(request.record_type()))
        .ttl(i64::from(request.ttl()))
        .resource_records(record);

    if let Some(id) = set_identifier {
        record_set = record_set.set_identifier(id).weight(WEIGHT);
    }

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(record_set.build().map_err(invalid_batch)?)
        .build()
        .map_err(invalid_batch)?;

    ChangeBatch::builder()
        .comment(comment)
        .changes(change)
        .build()
        .map_err(invalid_batch)
}

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::Aaaa => RrType::Aaaa,
        RecordType::Cname => RrType::Cname,
    }
}

fn invalid_batch(e: impl std::fmt::Display) -> Error {
    Error::invalid_input(format!("cannot build change batch: {}", e))
}

/// Map a Route 53 service error code onto a core error
pub fn classify_service_error(code: Option<&str>, message: &str) -> Error {
    let Some(code) = code else {
        return Error::provider(PROVIDER_NAME, message);
    };
    let detail = format!("{}: {}", code, message);

    if code == "NoSuchHostedZone" {
        Error::not_found(detail)
    } else if THROTTLING_CODES.contains(&code) {
        Error::rate_limited(detail)
    } else if AUTH_CODES.contains(&code) {
        Error::auth(detail)
    } else if INVALID_INPUT_CODES.contains(&code) {
        Error::invalid_input(detail)
    } else {
        Error::provider(PROVIDER_NAME, detail)
    }
}

/// Errors that never reached the service (credentials, DNS, TLS, timeouts)
fn classify_transport_error(detail: &str) -> Error {
    if detail.to_ascii_lowercase().contains("credentials") {
        Error::auth(detail)
    } else {
        Error::provider(PROVIDER_NAME, detail)
    }
}

/// Factory for creating Route 53 providers
pub struct Route53Factory;

#[async_trait]
impl DnsProviderFactory for Route53Factory {
    async fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Route53 {
                region,
                comment,
                set_identifier,
                dry_run,
            } => {
                if region.is_empty() {
                    return Err(Error::config("Route 53 region is required"));
                }

                if *dry_run {
                    tracing::warn!("Route 53 provider running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(
                    Route53Provider::from_env(
                        region.clone(),
                        comment.clone(),
                        set_identifier.clone(),
                        *dry_run,
                    )
                    .await,
                ))
            }
            _ => Err(Error::config("Invalid config for Route 53 provider")),
        }
    }
}

/// Register the Route 53 provider with a registry
pub fn register(registry: &dyndns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(Route53Factory));
}
