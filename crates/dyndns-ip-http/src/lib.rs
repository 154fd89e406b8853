// # HTTP IP Resolver
//
// Asks public "what is my IP" services for the caller's address.
//
// ## Consensus
//
// A single service can lie, be down, or serve an error page with a 200.
// With `Majority` every configured service is asked (one after another) and
// the most common answer wins, provided at least `min_votes` services agree.
// Ties go to the answer first seen. `FirstSuccess` walks the list and stops
// at the first usable answer.
//
// Anything other than a 2xx response whose trimmed body parses as an IP
// address counts as a failed vote.

use dyndns_core::ProviderRegistry;
use dyndns_core::config::{ConsensusStrategy, IpSourceConfig};
use dyndns_core::traits::{IpAddress, IpResolver, IpResolverFactory};
use dyndns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, warn};

/// HTTP-based IP resolver
pub struct HttpIpSource {
    /// Services to query, in order
    urls: Vec<String>,

    strategy: ConsensusStrategy,

    /// Agreeing answers required under `Majority`
    min_votes: usize,

    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a resolver over `urls`
    ///
    /// `request_timeout` bounds each individual request.
    pub fn new(
        urls: Vec<String>,
        strategy: ConsensusStrategy,
        min_votes: usize,
        request_timeout: Duration,
    ) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("HTTP IP source needs at least one URL"));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("dyndns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            strategy,
            min_votes: min_votes.max(1),
            client,
        })
    }

    /// Ask one service
    async fn fetch(&self, url: &str) -> Result<IpAddress> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::resolution(format!("{}: request failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::resolution(format!("{}: HTTP {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::resolution(format!("{}: failed to read response: {}", url, e)))?;

        parse_answer(&body).ok_or_else(|| {
            Error::resolution(format!("{}: not an IP address: {:?}", url, truncate(&body)))
        })
    }

    async fn first_success(&self) -> Result<IpAddress> {
        let mut failures = Vec::new();

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(ip) => {
                    debug!("{} answered {}", url, ip);
                    return Ok(ip);
                }
                Err(e) => {
                    warn!("IP service failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::resolution(format!(
            "all IP services failed: {}",
            failures.join("; ")
        )))
    }

    async fn majority(&self) -> Result<IpAddress> {
        let mut answers = Vec::with_capacity(self.urls.len());
        let mut failures = Vec::new();

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(ip) => {
                    debug!("{} voted {}", url, ip);
                    answers.push(ip);
                }
                Err(e) => {
                    warn!("IP service failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        let Some((winner, votes)) = tally(&answers) else {
            return Err(Error::resolution(format!(
                "all IP services failed: {}",
                failures.join("; ")
            )));
        };

        if votes < self.min_votes {
            return Err(Error::resolution(format!(
                "no consensus: best answer {} has {} of {} required votes ({} services answered)",
                winner,
                votes,
                self.min_votes,
                answers.len()
            )));
        }

        if votes < answers.len() {
            warn!(
                "IP services disagree, using {} ({} of {} answers)",
                winner,
                votes,
                answers.len()
            );
        }

        Ok(winner)
    }
}

#[async_trait::async_trait]
impl IpResolver for HttpIpSource {
    async fn resolve(&self) -> Result<IpAddress> {
        match self.strategy {
            ConsensusStrategy::Majority => self.majority().await,
            ConsensusStrategy::FirstSuccess => self.first_success().await,
        }
    }

    fn resolver_name(&self) -> &'static str {
        "http"
    }
}

/// Trim and validate a service's response body
fn parse_answer(body: &str) -> Option<IpAddress> {
    body.trim().parse::<IpAddr>().ok().map(IpAddress::from)
}

/// Most common answer and its vote count; ties go to the earliest answer
fn tally(answers: &[IpAddress]) -> Option<(IpAddress, usize)> {
    let mut counts: Vec<(&IpAddress, usize)> = Vec::new();

    for answer in answers {
        match counts.iter_mut().find(|(seen, _)| *seen == answer) {
            Some((_, count)) => *count += 1,
            None => counts.push((answer, 1)),
        }
    }

    // max_by_key keeps the last maximum, so walk from the back
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map(|(ip, count)| (ip.clone(), count))
}

fn truncate(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(64) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Factory for creating HTTP IP resolvers
pub struct HttpFactory;

impl IpResolverFactory for HttpFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpResolver>> {
        match config {
            IpSourceConfig::Http {
                urls,
                strategy,
                min_votes,
                request_timeout_ms,
            } => Ok(Box::new(HttpIpSource::new(
                urls.clone(),
                *strategy,
                *min_votes,
                Duration::from_millis(*request_timeout_ms),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP IP source")),
        }
    }
}

/// Register the HTTP IP resolver with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_resolver("http", Box::new(HttpFactory));
}
