// # HTTP Public IP Source
//
// This crate provides the HTTP-based public address lookup for the trunk
// registration agent.
//
// ## Architecture
//
// Every lookup queries all configured "what is my IP" services in parallel
// (e.g. ifconfig.co, ifconfig.io). Each answers with a plain-text body; the
// first body that parses as an IPv4 address wins and the remaining requests
// are cancelled. The lookup fails only when every service fails.
//
// Nothing is cached: the reconcile loop decides when to look up.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::debug;
use trunkreg_core::config::IpLookupConfig;
use trunkreg_core::{Error, PublicIpSource, Result};

/// Parallel, first-answer-wins lookup over plain-text IP services
#[derive(Debug, Clone)]
pub struct HttpPublicIpSource {
    /// Service URLs
    services: Vec<String>,

    /// HTTP client (carries the per-request timeout)
    client: reqwest::Client,
}

impl HttpPublicIpSource {
    /// Create a new HTTP public IP source
    ///
    /// # Parameters
    ///
    /// - `services`: URLs returning the caller's address as plain text
    /// - `timeout`: Bound on each request
    pub fn new(services: Vec<String>, timeout: Duration) -> Result<Self> {
        if services.is_empty() {
            return Err(Error::config("at least one IP lookup service is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { services, client })
    }

    pub fn from_config(config: &IpLookupConfig, timeout: Duration) -> Result<Self> {
        Self::new(config.services.clone(), timeout)
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }
}

async fn fetch_ipv4(client: reqwest::Client, url: String) -> std::result::Result<Ipv4Addr, String> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("{}: request failed: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("{}: HTTP error: {}", url, response.status()));
    }

    let body = response
        .text()
        .await
        .map_err(|e| format!("{}: failed to read response: {}", url, e))?;

    let body = body.trim();
    body.parse::<Ipv4Addr>()
        .map_err(|_| format!("{}: not an IPv4 address: {:?}", url, body))
}

#[async_trait::async_trait]
impl PublicIpSource for HttpPublicIpSource {
    async fn lookup(&self) -> Result<Ipv4Addr> {
        let mut lookups = JoinSet::new();
        for url in &self.services {
            lookups.spawn(fetch_ipv4(self.client.clone(), url.clone()));
        }

        let mut failures = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(Ok(ip)) => {
                    // Dropping the set aborts the slower lookups
                    debug!(%ip, "Public address answered");
                    return Ok(ip);
                }
                Ok(Err(reason)) => {
                    debug!("IP lookup service failed: {}", reason);
                    failures.push(reason);
                }
                Err(e) => failures.push(format!("lookup task failed: {}", e)),
            }
        }

        Err(Error::identity_lookup(format!(
            "no IP lookup service answered: {}",
            failures.join("; ")
        )))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
