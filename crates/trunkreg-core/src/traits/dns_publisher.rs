// # DNS Publisher Trait
//
// Defines the interface for pointing the node's public DNS name at its
// current public address.
//
// ## Implementations
//
// - AWS Route53: `trunkreg-provider-route53` crate

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// TTL of every published A record, in seconds
pub const RECORD_TTL_SECS: i64 = 60;

/// Trait for DNS publisher implementations
///
/// # Idempotency
///
/// `publish` must use provider-side upsert semantics: calling it repeatedly
/// with the same arguments is safe and leaves a single A record with a
/// single value.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ One API call to the provider per invocation
/// - ✅ Bounding that call with a timeout
///
/// ## Forbidden Capabilities
/// - ❌ Retry logic or backoff (a failure clears the engine's last-published
///   address, the next cycle retries)
/// - ❌ Deciding whether a publish is needed (owned by the engine's
///   `DnsSyncState`)
/// - ❌ Touching the registry store
#[async_trait]
pub trait DnsPublisher: Send + Sync {
    /// Ensure `fqdn` has a single A record pointing at `ip`
    ///
    /// # Parameters
    ///
    /// - `fqdn`: Fully-qualified record name
    /// - `ip`: The public address to publish
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The provider accepted the change
    /// - `Err(Error)`: The change was not applied
    async fn publish(&self, fqdn: &str, ip: Ipv4Addr) -> Result<(), crate::Error>;

    /// Get the publisher name (for logging/debugging)
    fn publisher_name(&self) -> &'static str;
}
