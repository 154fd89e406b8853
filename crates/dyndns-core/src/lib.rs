// # dyndns-core
//
// Core library for the dyndns client: keep one DNS record pointed at this
// host's public IP.
//
// ## Architecture Overview
//
// - **IpResolver**: Trait for learning the current public IP
// - **DnsProvider**: Trait for upserting a DNS record through a zone service
// - **DdnsEngine**: The detect → compare → update → sleep loop
// - **ReconcilerState**: In-memory record of the last successful update
// - **ProviderRegistry**: Plugin-based registry for providers and resolvers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Decision logic lives here; network
//    integrations live in their own crates
// 2. **Single Worker**: One sequential loop, no shared mutable state
// 3. **Engine-Owned Retry**: Collaborators fail fast; the loop decides when
//    to try again
// 4. **Library-First**: Everything the daemon does can be driven as a library

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{ChangeReceipt, DnsProvider, IpAddress, IpFamily, IpResolver, RecordType, UpsertRequest};
pub use engine::{CycleOutcome, DdnsEngine, EngineEvent};
pub use registry::ProviderRegistry;
pub use config::{DdnsConfig, EngineConfig, IpSourceConfig, ProviderConfig, RecordConfig};
pub use error::{Error, Result};
pub use state::ReconcilerState;
