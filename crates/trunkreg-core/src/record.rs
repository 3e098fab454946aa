//! Registration record construction
//!
//! Turns a [`ResolvedIdentity`] (plus whatever row already exists for the
//! node) into the candidate row the store upserts.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::Ipv4Addr;

use crate::config::{DnsConfig, PeerProfile};
use crate::identity::ResolvedIdentity;
use crate::traits::ExistingRegistration;

/// Hostname substring that marks an upstream-facing node
pub const UPSTREAM_MARKER: &str = "upstream";

/// Dialplan context for upstream-facing nodes
pub const UPSTREAM_CONTEXT: &str = "fromupstream";

/// Dialplan context for every other node
pub const DEFAULT_CONTEXT: &str = "fromasterisk";

/// Length of a generated peer secret
pub const SECRET_LEN: usize = 32;

/// One row of the peer-registry table
///
/// `provisioned_at` and `secret` are always populated on a candidate, but
/// stores write them only when inserting; an update leaves the stored values
/// in place.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub name: String,
    pub registrar: String,
    pub username: String,
    pub context: String,
    /// Public address
    pub host_address: Ipv4Addr,
    /// Private address
    pub local_address: Ipv4Addr,
    /// Public address
    pub ip_address: Ipv4Addr,
    pub public_dns_hostname: String,
    pub is_upstream: bool,
    pub provisioned_at: DateTime<Utc>,
    pub last_response_at: DateTime<Utc>,
    /// ⚠️ NEVER log this value
    pub secret: String,
    pub profile: PeerProfile,
}

impl RegistrationRecord {
    /// Build the candidate row for `identity`.
    ///
    /// The public DNS name is carried over from `existing` when it already
    /// lives in the managed zone, otherwise it is derived from the hostname.
    pub fn build(
        identity: &ResolvedIdentity,
        existing: Option<&ExistingRegistration>,
        dns: &DnsConfig,
        profile: &PeerProfile,
        now: DateTime<Utc>,
    ) -> Self {
        let hostname = identity.hostname.clone();
        let is_upstream = is_upstream(&hostname);

        let public_dns_hostname = existing
            .and_then(|row| row.public_dns_hostname.as_deref())
            .filter(|stored| stored.contains(&dns.managed_zone_marker))
            .map(str::to_string)
            .unwrap_or_else(|| public_dns_name(&hostname, &dns.record_suffix));

        Self {
            registrar: hostname.clone(),
            username: hostname.clone(),
            context: derive_context(&hostname).to_string(),
            host_address: identity.public_address,
            local_address: identity.private_address,
            ip_address: identity.public_address,
            public_dns_hostname,
            is_upstream,
            provisioned_at: now,
            last_response_at: now,
            secret: generate_secret(),
            profile: profile.clone(),
            name: hostname,
        }
    }
}

impl std::fmt::Debug for RegistrationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRecord")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("host_address", &self.host_address)
            .field("local_address", &self.local_address)
            .field("public_dns_hostname", &self.public_dns_hostname)
            .field("is_upstream", &self.is_upstream)
            .field("provisioned_at", &self.provisioned_at)
            .field("last_response_at", &self.last_response_at)
            .field("secret", &"<REDACTED>")
            .finish_non_exhaustive()
    }
}

pub fn is_upstream(hostname: &str) -> bool {
    hostname.contains(UPSTREAM_MARKER)
}

/// Dialplan context for a hostname
pub fn derive_context(hostname: &str) -> &'static str {
    if is_upstream(hostname) {
        UPSTREAM_CONTEXT
    } else {
        DEFAULT_CONTEXT
    }
}

/// `hex(md5(hostname)) + suffix`
pub fn public_dns_name(hostname: &str, suffix: &str) -> String {
    let digest = Md5::digest(hostname.as_bytes());
    format!("{}{}", hex::encode(digest), suffix)
}

/// Random alphanumeric peer secret
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn identity(hostname: &str) -> ResolvedIdentity {
        ResolvedIdentity::new(
            hostname,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(203, 0, 113, 9),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn upstream_node_gets_upstream_context() {
        let record = RegistrationRecord::build(
            &identity("node-upstream-1"),
            None,
            &DnsConfig::default(),
            &PeerProfile::default(),
            now(),
        );

        assert_eq!(record.name, "node-upstream-1");
        assert_eq!(record.registrar, "node-upstream-1");
        assert_eq!(record.username, "node-upstream-1");
        assert_eq!(record.context, "fromupstream");
        assert!(record.is_upstream);
        assert_eq!(record.host_address, Ipv4Addr::new(203, 0, 113, 9));
        assert_eq!(record.ip_address, Ipv4Addr::new(203, 0, 113, 9));
        assert_eq!(record.local_address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(
            record.public_dns_hostname,
            "56cf165b116cc8798bc613d6b43e3910-voip-aws-eu.publicdns.zone"
        );
    }

    #[test]
    fn ordinary_node_gets_default_context() {
        assert_eq!(derive_context("edge-1"), "fromasterisk");
        assert!(!is_upstream("edge-1"));
        assert_eq!(
            public_dns_name("edge-1", "-voip-aws-eu.publicdns.zone"),
            "f793fc7bad4341d0e3a497996832ff89-voip-aws-eu.publicdns.zone"
        );
    }

    #[test]
    fn managed_dns_name_is_preserved() {
        let existing = ExistingRegistration {
            id: 7,
            name: "edge-1".to_string(),
            public_dns_hostname: Some("legacy-edge.publicdns.zone".to_string()),
        };
        let record = RegistrationRecord::build(
            &identity("edge-1"),
            Some(&existing),
            &DnsConfig::default(),
            &PeerProfile::default(),
            now(),
        );

        assert_eq!(record.public_dns_hostname, "legacy-edge.publicdns.zone");
    }

    #[test]
    fn foreign_dns_name_is_replaced() {
        let existing = ExistingRegistration {
            id: 7,
            name: "edge-1".to_string(),
            public_dns_hostname: Some("edge-1.example.net".to_string()),
        };
        let record = RegistrationRecord::build(
            &identity("edge-1"),
            Some(&existing),
            &DnsConfig::default(),
            &PeerProfile::default(),
            now(),
        );

        assert_eq!(
            record.public_dns_hostname,
            "f793fc7bad4341d0e3a497996832ff89-voip-aws-eu.publicdns.zone"
        );
    }

    #[test]
    fn secrets_are_alphanumeric_and_fresh() {
        let a = generate_secret();
        let b = generate_secret();

        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_output_hides_secret() {
        let record = RegistrationRecord::build(
            &identity("edge-1"),
            None,
            &DnsConfig::default(),
            &PeerProfile::default(),
            now(),
        );
        let rendered = format!("{:?}", record);
        assert!(!rendered.contains(&record.secret));
    }
}
