// # IP Resolver Trait
//
// Defines the interface for learning the caller's public-facing address.
//
// ## Implementations
//
// - HTTP "what is my IP" services with consensus: `dyndns-ip-http` crate
// - UDP socket local-address approximation: `dyndns-ip-socket` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::IpResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* IpResolver implementation */;
//
//     let ip = resolver.resolve().await?;
//     println!("{} ({:?})", ip, ip.family());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family of a resolved IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

/// A resolved address plus its family
///
/// The family is derived syntactically from the text: a `:` anywhere means
/// IPv6, otherwise a `.` means IPv4. Nothing here checks that the address is
/// routable; see [`IpAddress::is_public`] for that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IpAddress {
    address: String,
    family: IpFamily,
}

impl IpAddress {
    /// Classify an address string
    ///
    /// Surrounding whitespace is trimmed. Fails with a resolution error when
    /// the text is empty or contains neither `.` nor `:`.
    ///
    /// A `:` always wins over a `.`, so an IPv4-mapped IPv6 address such as
    /// `::ffff:203.0.113.5` classifies as IPv6 and becomes an `AAAA` record.
    /// This departs on purpose from a last-separator-wins scan, which would
    /// call that text IPv4.
    pub fn classify(raw: &str) -> Result<Self, crate::Error> {
        let address = raw.trim();
        if address.is_empty() {
            return Err(crate::Error::resolution("oracle returned an empty address"));
        }

        let family = if address.contains(':') {
            IpFamily::V6
        } else if address.contains('.') {
            IpFamily::V4
        } else {
            return Err(crate::Error::resolution(format!(
                "cannot classify address '{}'",
                address
            )));
        };

        Ok(Self {
            address: address.to_string(),
            family,
        })
    }

    /// The address text as received from the oracle
    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Parse the text into a `std::net::IpAddr`, if it is one
    pub fn to_ip_addr(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }

    /// Whether the address lies outside private, loopback, link-local and
    /// other non-internet ranges
    ///
    /// Text that does not parse as an IP is never public.
    pub fn is_public(&self) -> bool {
        self.to_ip_addr().is_some_and(|ip| is_public_ip(&ip))
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl From<IpAddr> for IpAddress {
    fn from(ip: IpAddr) -> Self {
        let family = match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        };

        Self {
            address: ip.to_string(),
            family,
        }
    }
}

/// Range check for internet-routable unicast addresses
///
/// Rejects RFC 1918 private space, loopback, link-local, CGNAT
/// (100.64.0.0/10), unspecified, broadcast and multicast for IPv4, and
/// loopback, unspecified, unique-local (fc00::/7), link-local (fe80::/10)
/// and multicast for IPv6. IPv4-mapped IPv6 addresses are checked as IPv4.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..=127).contains(&b);

    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || shared)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;

    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}

/// Trait for IP oracle implementations
///
/// A resolver answers one question per call: what does the outside world see
/// as our address right now.
///
/// # Rules
///
/// - One lookup per call. No internal retries or sleeps: the reconciliation
///   loop owns retry cadence.
/// - No caching between calls. Change detection is the loop's job.
/// - No spawned tasks.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddress)`: non-empty, classified address
    /// - `Err(Error)`: oracle unreachable, no route, or malformed answer
    async fn resolve(&self) -> Result<IpAddress, crate::Error>;

    /// Resolver name (for logging/debugging)
    fn resolver_name(&self) -> &'static str;
}

/// Helper trait for constructing IP resolvers from configuration
pub trait IpResolverFactory: Send + Sync {
    /// Create an IpResolver instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
    ) -> Result<Box<dyn IpResolver>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ipv4() {
        let ip = IpAddress::classify("203.0.113.5").unwrap();
        assert_eq!(ip.family(), IpFamily::V4);
        assert_eq!(ip.as_str(), "203.0.113.5");
    }

    #[test]
    fn test_classify_ipv6() {
        let ip = IpAddress::classify("2001:db8::1").unwrap();
        assert_eq!(ip.family(), IpFamily::V6);

        // v4-mapped text is IPv6 syntax
        let mapped = IpAddress::classify("::ffff:198.51.100.7").unwrap();
        assert_eq!(mapped.family(), IpFamily::V6);
    }

    #[test]
    fn test_classify_is_syntactic() {
        // Not a real address, still classified by its separators
        let odd = IpAddress::classify("999.1.2").unwrap();
        assert_eq!(odd.family(), IpFamily::V4);
        assert!(odd.to_ip_addr().is_none());
        assert!(!odd.is_public());
    }

    #[test]
    fn test_classify_trims_and_rejects_empty() {
        let ip = IpAddress::classify(" 198.51.100.7\n").unwrap();
        assert_eq!(ip.to_string(), "198.51.100.7");

        assert!(IpAddress::classify("").unwrap_err().is_resolution());
        assert!(IpAddress::classify("   ").is_err());
        assert!(IpAddress::classify("localhost").is_err());
    }

    #[test]
    fn test_from_ip_addr() {
        let ip = IpAddress::from(IpAddr::from([192, 0, 2, 1]));
        assert_eq!(ip.family(), IpFamily::V4);
        assert_eq!(ip.as_str(), "192.0.2.1");
    }

    #[test]
    fn test_public_ranges_v4() {
        let public = |s: &str| is_public_ip(&s.parse().unwrap());

        assert!(public("8.8.8.8"));
        assert!(public("203.0.113.5"));
        assert!(!public("10.1.2.3"));
        assert!(!public("172.16.0.1"));
        assert!(!public("192.168.1.1"));
        assert!(!public("127.0.0.1"));
        assert!(!public("169.254.10.10"));
        assert!(!public("100.64.0.1"));
        assert!(!public("0.0.0.0"));
        assert!(!public("255.255.255.255"));
        assert!(!public("224.0.0.1"));
    }

    #[test]
    fn test_public_ranges_v6() {
        let public = |s: &str| is_public_ip(&s.parse().unwrap());

        assert!(public("2606:4700:4700::1111"));
        assert!(!public("::1"));
        assert!(!public("::"));
        assert!(!public("fd00::1"));
        assert!(!public("fe80::1"));
        assert!(!public("ff02::1"));
        assert!(!public("::ffff:192.168.0.1"));
        assert!(public("::ffff:8.8.4.4"));
    }
}
