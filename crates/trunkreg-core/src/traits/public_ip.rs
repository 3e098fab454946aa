// # Public IP Source Trait
//
// Defines the interface for discovering the node's public IPv4 address.
//
// ## Implementations
//
// - HTTP services (parallel, first answer wins): `trunkreg-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use trunkreg_core::PublicIpSource;
//
// #[tokio::main]
// async fn main() -> trunkreg_core::Result<()> {
//     let source = /* PublicIpSource implementation */;
//     let public_ip = source.lookup().await?;
//     println!("public address: {}", public_ip);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public address lookups
///
/// One call is one lookup; there is no watching or caching. The reconcile
/// loop decides when to look up, and [`crate::IdentityProbe`] bounds each
/// call with a timeout.
///
/// ## Forbidden Capabilities
/// - ❌ Retry loops or sleeping (a failed lookup skips the cycle, the next
///   tick retries)
/// - ❌ Caching an answer across calls (a stale address would be published)
/// - ❌ Returning anything other than IPv4
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    /// Look up the current public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Addr)`: The address as seen from outside
    /// - `Err(Error)`: If no service produced a usable answer
    async fn lookup(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Name of the source (for logging)
    fn source_name(&self) -> &'static str;
}
