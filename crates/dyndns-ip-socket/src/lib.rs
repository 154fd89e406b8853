// # Socket IP Resolver
//
// Learns the address of the interface the kernel would route through to
// reach a well-known host.
//
// A UDP socket is "connected" to the target: no packet is sent, but the
// kernel picks a route and a source address, which `local_addr()` then
// reports. That address is the public one only when this host sits directly
// on the internet. Behind NAT it is the private LAN address, so pair this
// resolver with `require_public_ip` or prefer the HTTP resolver.

use dyndns_core::ProviderRegistry;
use dyndns_core::config::IpSourceConfig;
use dyndns_core::traits::{IpAddress, IpResolver, IpResolverFactory};
use dyndns_core::{Error, Result};

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

/// UDP-socket-based IP resolver
pub struct SocketIpSource {
    /// `host:port` to aim the socket at
    target: String,
}

impl SocketIpSource {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    async fn target_addr(&self) -> Result<SocketAddr> {
        let mut addrs = lookup_host(self.target.as_str())
            .await
            .map_err(|e| Error::resolution(format!("cannot resolve {}: {}", self.target, e)))?;

        addrs
            .next()
            .ok_or_else(|| Error::resolution(format!("{} has no addresses", self.target)))
    }
}

#[async_trait::async_trait]
impl IpResolver for SocketIpSource {
    async fn resolve(&self) -> Result<IpAddress> {
        let target = self.target_addr().await?;

        let bind: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| Error::resolution(format!("cannot bind UDP socket: {}", e)))?;
        socket
            .connect(target)
            .await
            .map_err(|e| Error::resolution(format!("no route to {}: {}", target, e)))?;
        let local = socket
            .local_addr()
            .map_err(|e| Error::resolution(format!("cannot read local address: {}", e)))?;

        debug!("Route to {} leaves from {}", target, local.ip());

        let ip = local.ip();
        if ip.is_unspecified() {
            return Err(Error::resolution(format!(
                "kernel reported no source address towards {}",
                target
            )));
        }

        Ok(IpAddress::from(ip))
    }

    fn resolver_name(&self) -> &'static str {
        "socket"
    }
}

/// Factory for creating socket IP resolvers
pub struct SocketFactory;

impl IpResolverFactory for SocketFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpResolver>> {
        match config {
            IpSourceConfig::Socket { target } => Ok(Box::new(SocketIpSource::new(target.clone()))),
            _ => Err(Error::config("Invalid config for socket IP source")),
        }
    }
}

/// Register the socket IP resolver with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_resolver("socket", Box::new(SocketFactory));
}
