//! Core traits for the dyndns system
//!
//! This module defines the two collaborator interfaces the loop is written
//! against.
//!
//! - [`IpResolver`]: learn the current public address
//! - [`DnsProvider`]: upsert a DNS record via a zone service

pub mod ip_resolver;
pub mod dns_provider;

pub use ip_resolver::{IpAddress, IpFamily, IpResolver, IpResolverFactory, is_public_ip};
pub use dns_provider::{ChangeReceipt, DnsProvider, DnsProviderFactory, RecordType, UpsertRequest};
