use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

/// Resolves a host name to the IP used as the throttle key.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns the first address of `host`, or `None` when it does not resolve.
    async fn resolve(&self, host: &str) -> Option<IpAddr>;

    /// Returns the IP to store for `host`, falling back to the host name itself.
    async fn ip_for(&self, host: &str) -> String {
        match self.resolve(host).await {
            Some(ip) => ip.to_string(),
            None => host.to_string(),
        }
    }
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Some(ip);
        }

        match tokio::net::lookup_host(format!("{}:80", host)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                debug!("Could not resolve {}: {}", host, e);
                None
            }
        }
    }
}

/// Resolver with a fixed host table
///
/// Unknown hosts resolve to `None`, except literal IP addresses.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    table: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ip: IpAddr) -> Self {
        self.table.insert(host.to_lowercase(), ip);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        self.table
            .get(&host.to_lowercase())
            .copied()
            .or_else(|| host.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_static_resolver_table() {
        let resolver =
            StaticResolver::new().with("example.com", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        assert_eq!(resolver.ip_for("example.com").await, "10.0.0.1");
        assert_eq!(resolver.ip_for("EXAMPLE.com").await, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_unresolved_host_falls_back_to_name() {
        let resolver = StaticResolver::new();
        assert_eq!(resolver.ip_for("nowhere.invalid").await, "nowhere.invalid");
    }

    #[tokio::test]
    async fn test_literal_ip() {
        assert_eq!(StaticResolver::new().ip_for("127.0.0.1").await, "127.0.0.1");
        assert_eq!(SystemResolver.ip_for("127.0.0.1").await, "127.0.0.1");
    }
}
