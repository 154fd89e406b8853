//! Plugin-based provider registry
//!
//! The registry lets DNS providers and IP resolvers be registered at
//! runtime, so the daemon builds them from configuration without hardcoded
//! if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dyndns_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! dyndns_provider_route53::register(&registry);
//! dyndns_ip_http::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider).await?;
//! let resolver = registry.create_ip_resolver(&config.ip_source)?;
//! ```

use crate::config::{IpSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, IpResolver, IpResolverFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry for plugin-based provider and resolver creation
///
/// Maps type names (as returned by the config `type_name()` methods) to
/// factory objects.
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
/// No lock is held across an await point.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Arc<dyn DnsProviderFactory>>>,

    /// Registered IP resolver factories
    ip_resolvers: RwLock<HashMap<String, Box<dyn IpResolverFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name` (e.g. "route53")
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), Arc::from(factory));
    }

    /// Register an IP resolver factory under `name` (e.g. "http", "socket")
    pub fn register_ip_resolver(
        &self,
        name: impl Into<String>,
        factory: Box<dyn IpResolverFactory>,
    ) {
        let mut resolvers = self
            .ip_resolvers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        resolvers.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub async fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();

        let factory = {
            let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
            providers
                .get(provider_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?
        };

        factory.create(config).await
    }

    /// Create an IP resolver from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpResolver>)`: Created resolver instance
    /// - `Err(Error)`: If source type is not registered or creation fails
    pub fn create_ip_resolver(&self, config: &IpSourceConfig) -> Result<Box<dyn IpResolver>> {
        let source_type = config.type_name();
        let resolvers = self
            .ip_resolvers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = resolvers
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown IP source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered IP resolver types
    pub fn list_ip_resolvers(&self) -> Vec<String> {
        let resolvers = self
            .ip_resolvers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        resolvers.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if an IP resolver type is registered
    pub fn has_ip_resolver(&self, name: &str) -> bool {
        let resolvers = self
            .ip_resolvers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        resolvers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChangeReceipt, IpAddress, UpsertRequest};
    use async_trait::async_trait;

    struct StaticProvider;

    #[async_trait]
    impl DnsProvider for StaticProvider {
        async fn upsert(&self, _request: &UpsertRequest) -> Result<ChangeReceipt> {
            Ok(ChangeReceipt::accepted("ok"))
        }

        fn provider_name(&self) -> &'static str {
            "static"
        }
    }

    struct StaticProviderFactory;

    #[async_trait]
    impl DnsProviderFactory for StaticProviderFactory {
        async fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
            Ok(Box::new(StaticProvider))
        }
    }

    struct StaticResolver;

    #[async_trait]
    impl IpResolver for StaticResolver {
        async fn resolve(&self) -> Result<IpAddress> {
            IpAddress::classify("192.0.2.10")
        }

        fn resolver_name(&self) -> &'static str {
            "static"
        }
    }

    struct StaticResolverFactory;

    impl IpResolverFactory for StaticResolverFactory {
        fn create(&self, _config: &IpSourceConfig) -> Result<Box<dyn IpResolver>> {
            Ok(Box::new(StaticResolver))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();

        assert!(!registry.has_provider("static"));
        assert!(!registry.has_ip_resolver("static"));

        registry.register_provider("static", Box::new(StaticProviderFactory));
        registry.register_ip_resolver("static", Box::new(StaticResolverFactory));

        assert!(registry.has_provider("static"));
        assert!(registry.has_ip_resolver("static"));
        assert!(registry.list_providers().contains(&"static".to_string()));
        assert!(registry.list_ip_resolvers().contains(&"static".to_string()));
    }

    #[tokio::test]
    async fn test_create_from_custom_config() {
        let registry = ProviderRegistry::new();
        registry.register_provider("static", Box::new(StaticProviderFactory));
        registry.register_ip_resolver("static", Box::new(StaticResolverFactory));

        let provider_config = ProviderConfig::Custom {
            factory: "static".to_string(),
            config: serde_json::json!({}),
        };
        let provider = registry.create_provider(&provider_config).await.unwrap();
        assert_eq!(provider.provider_name(), "static");

        let source_config = IpSourceConfig::Custom {
            factory: "static".to_string(),
            config: serde_json::json!({}),
        };
        let resolver = registry.create_ip_resolver(&source_config).unwrap();
        assert_eq!(resolver.resolve().await.unwrap().as_str(), "192.0.2.10");
    }

    #[tokio::test]
    async fn test_unknown_type_is_config_error() {
        let registry = ProviderRegistry::new();

        let err = registry
            .create_provider(&ProviderConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));

        assert!(registry.create_ip_resolver(&IpSourceConfig::default()).is_err());
    }
}
