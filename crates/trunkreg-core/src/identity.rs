//! Node identity resolution
//!
//! Each reconcile cycle starts by resolving who and where this node is:
//! hostname and private address come from the local system and never fail,
//! the public address comes from a [`PublicIpSource`] bounded by a timeout.

use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::traits::PublicIpSource;

/// Destination used to ask the kernel which source address the default
/// route would pick. Connecting a UDP socket sends nothing.
const ROUTE_PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

/// Identity observed by one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub hostname: String,
    pub private_address: Ipv4Addr,
    /// Absent when the public lookup failed or timed out
    pub public_address: Option<Ipv4Addr>,
}

impl NodeIdentity {
    /// Promote to a resolved identity, if the public address is known
    pub fn resolved(self) -> Option<ResolvedIdentity> {
        let public_address = self.public_address?;
        Some(ResolvedIdentity {
            hostname: self.hostname,
            private_address: self.private_address,
            public_address,
        })
    }
}

/// Identity with every address known; the only kind that reaches the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub hostname: String,
    pub private_address: Ipv4Addr,
    pub public_address: Ipv4Addr,
}

impl ResolvedIdentity {
    pub fn new(
        hostname: impl Into<String>,
        private_address: Ipv4Addr,
        public_address: Ipv4Addr,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            private_address,
            public_address,
        }
    }
}

/// Synchronous, infallible source of hostname and private address
pub trait LocalIdentity: Send + Sync {
    fn hostname(&self) -> String;
    fn private_address(&self) -> Ipv4Addr;
}

/// Local identity read from the operating system
///
/// Either half can be pinned through [`IdentityConfig`], which is useful in
/// containers where the OS hostname is a random id.
#[derive(Debug, Clone, Default)]
pub struct SystemIdentity {
    hostname_override: Option<String>,
    private_override: Option<Ipv4Addr>,
}

impl SystemIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            hostname_override: config.hostname.clone(),
            private_override: config.private_address,
        }
    }
}

impl LocalIdentity for SystemIdentity {
    fn hostname(&self) -> String {
        if let Some(ref hostname) = self.hostname_override {
            return hostname.clone();
        }
        hostname::get().map_or_else(
            |_| "localhost".to_string(),
            |h| h.to_string_lossy().into_owned(),
        )
    }

    fn private_address(&self) -> Ipv4Addr {
        self.private_override
            .or_else(default_route_source_address)
            .unwrap_or(Ipv4Addr::LOCALHOST)
    }
}

fn default_route_source_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE_TARGET).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Fixed local identity
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    hostname: String,
    private_address: Ipv4Addr,
}

impl StaticIdentity {
    pub fn new(hostname: impl Into<String>, private_address: Ipv4Addr) -> Self {
        Self {
            hostname: hostname.into(),
            private_address,
        }
    }
}

impl LocalIdentity for StaticIdentity {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn private_address(&self) -> Ipv4Addr {
        self.private_address
    }
}

/// Resolves a [`NodeIdentity`] for one reconcile cycle
pub struct IdentityProbe {
    local: Box<dyn LocalIdentity>,
    public: Box<dyn PublicIpSource>,
    lookup_timeout: Duration,
}

impl IdentityProbe {
    pub fn new(
        local: Box<dyn LocalIdentity>,
        public: Box<dyn PublicIpSource>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            local,
            public,
            lookup_timeout,
        }
    }

    /// Hostname as seen right now
    pub fn hostname(&self) -> String {
        self.local.hostname()
    }

    /// Resolve the node identity.
    ///
    /// Never fails: a public lookup error or timeout yields
    /// `public_address: None`.
    pub async fn probe(&self) -> NodeIdentity {
        let hostname = self.local.hostname();
        let private_address = self.local.private_address();

        let public_address =
            match tokio::time::timeout(self.lookup_timeout, self.public.lookup()).await {
                Ok(Ok(ip)) => {
                    debug!(%hostname, %ip, source = self.public.source_name(), "Public address resolved");
                    Some(ip)
                }
                Ok(Err(e)) => {
                    warn!(%hostname, source = self.public.source_name(), "Public address lookup failed: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        %hostname,
                        source = self.public.source_name(),
                        "Public address lookup timed out after {:?}",
                        self.lookup_timeout
                    );
                    None
                }
            };

        NodeIdentity {
            hostname,
            private_address,
            public_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedSource(Option<Ipv4Addr>);

    #[async_trait]
    impl PublicIpSource for FixedSource {
        async fn lookup(&self) -> crate::Result<Ipv4Addr> {
            self.0.ok_or_else(|| crate::Error::identity_lookup("no service answered"))
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct HangingSource;

    #[async_trait]
    impl PublicIpSource for HangingSource {
        async fn lookup(&self) -> crate::Result<Ipv4Addr> {
            std::future::pending().await
        }

        fn source_name(&self) -> &'static str {
            "hanging"
        }
    }

    fn probe_with(public: Box<dyn PublicIpSource>) -> IdentityProbe {
        IdentityProbe::new(
            Box::new(StaticIdentity::new("edge-1", Ipv4Addr::new(10, 0, 0, 7))),
            public,
            Duration::from_millis(600),
        )
    }

    #[tokio::test]
    async fn resolves_all_three_addresses() {
        let probe = probe_with(Box::new(FixedSource(Some(Ipv4Addr::new(203, 0, 113, 9)))));
        let identity = probe.probe().await;

        assert_eq!(identity.hostname, "edge-1");
        assert_eq!(identity.private_address, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(identity.public_address, Some(Ipv4Addr::new(203, 0, 113, 9)));
        assert!(identity.resolved().is_some());
    }

    #[tokio::test]
    async fn lookup_error_yields_no_public_address() {
        let probe = probe_with(Box::new(FixedSource(None)));
        let identity = probe.probe().await;

        assert_eq!(identity.public_address, None);
        assert!(identity.resolved().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_timeout_yields_no_public_address() {
        let probe = probe_with(Box::new(HangingSource));
        let identity = probe.probe().await;

        assert_eq!(identity.hostname, "edge-1");
        assert_eq!(identity.public_address, None);
    }

    #[test]
    fn overrides_pin_system_identity() {
        let identity = SystemIdentity::from_config(&IdentityConfig {
            hostname: Some("node-upstream-1".to_string()),
            private_address: Some(Ipv4Addr::new(10, 0, 0, 5)),
        });

        assert_eq!(identity.hostname(), "node-upstream-1");
        assert_eq!(identity.private_address(), Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn system_identity_never_returns_empty_hostname() {
        assert!(!SystemIdentity::new().hostname().is_empty());
    }
}
