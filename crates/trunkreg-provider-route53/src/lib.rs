// # AWS Route53 DNS Publisher
//
// This crate provides the Route53 implementation of `DnsPublisher` for the
// trunk registration agent.
//
// ## Behaviour
//
// - ✅ One `ChangeResourceRecordSets` call per publish (action UPSERT)
// - ✅ Single A record, single value, TTL 60
// - ✅ Operation timeout on every call (SDK timeout config)
// - ✅ Dry-run mode for safe testing
// - ✅ Service errors mapped to the agent's error taxonomy
// - ❌ NO retry loop (the reconcile engine retries on its next cycle)
// - ❌ NO change-status polling (UPSERT is accepted or rejected synchronously)
//
// ## Trust Level: Untrusted (DNS Publisher)
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Decide whether a publish is needed (owned by the engine)
// - ❌ Touch the registry store
//
// ## Security Requirements
//
// - AWS secret key NEVER appears in logs
// - Static credentials are optional; without them the SDK default chain is used
//
// ## API Reference
//
// - ChangeResourceRecordSets: POST `/2013-04-01/hostedzone/{Id}/rrset`

use std::net::Ipv4Addr;

use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_route53::error::{DisplayErrorContext, SdkError};
use aws_sdk_route53::operation::change_resource_record_sets::ChangeResourceRecordSetsError;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_smithy_types::timeout::TimeoutConfig;
use trunkreg_core::config::{AwsConfig, DnsConfig};
use trunkreg_core::traits::RECORD_TTL_SECS;
use trunkreg_core::{DnsPublisher, Error, Result};

const PROVIDER: &str = "route53";

/// Route53 DNS publisher
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the publisher builds the full change batch, logs
/// it, and returns success without calling AWS.
pub struct Route53Publisher {
    client: Client,

    /// Hosted zone id without the `/hostedzone/` prefix
    hosted_zone_id: String,

    dry_run: bool,
}

// The client carries resolved credentials; keep it out of Debug output
impl std::fmt::Debug for Route53Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Publisher")
            .field("client", &"<REDACTED>")
            .field("hosted_zone_id", &self.hosted_zone_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Route53Publisher {
    /// Build a publisher from agent configuration
    ///
    /// Loads the shared AWS config (region, and static credentials when both
    /// keys are set), then applies the operation timeout to the Route53
    /// client.
    pub async fn from_config(aws: &AwsConfig, dns: &DnsConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()));

        if aws.has_static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                aws.access_key_id.clone(),
                aws.secret_access_key.clone(),
                None,
                None,
                "trunkreg-config",
            ));
        }

        let sdk_config = loader.load().await;

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(dns.operation_timeout())
            .build();
        let conf = aws_sdk_route53::config::Builder::from(&sdk_config)
            .timeout_config(timeout_config)
            .build();

        tracing::debug!(
            region = %aws.region,
            static_credentials = aws.has_static_credentials(),
            timeout = ?dns.operation_timeout(),
            "Route53 client configured"
        );

        Ok(Self::from_client(
            Client::from_conf(conf),
            &dns.hosted_zone_id,
            dns.dry_run,
        ))
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client, hosted_zone_id: &str, dry_run: bool) -> Self {
        Self {
            client,
            hosted_zone_id: normalize_zone_id(hosted_zone_id),
            dry_run,
        }
    }

    /// Dry-run publisher that never reaches AWS
    pub fn new_dry_run(hosted_zone_id: &str) -> Self {
        let conf = aws_sdk_route53::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        Self::from_client(Client::from_conf(conf), hosted_zone_id, true)
    }

    pub fn hosted_zone_id(&self) -> &str {
        &self.hosted_zone_id
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Strip the `/hostedzone/` prefix Route53 returns in zone ARNs and listings
pub fn normalize_zone_id(zone_id: &str) -> String {
    zone_id.trim().trim_start_matches("/hostedzone/").to_string()
}

/// The single-change UPSERT batch for `fqdn -> ip`
pub fn build_change_batch(fqdn: &str, ip: Ipv4Addr) -> Result<ChangeBatch> {
    if fqdn.is_empty() {
        return Err(Error::invalid_input("record name cannot be empty"));
    }

    let build_err = |e: aws_sdk_route53::error::BuildError| {
        Error::invalid_input(format!("Failed to build Route53 change: {}", e))
    };

    let record = ResourceRecord::builder()
        .value(ip.to_string())
        .build()
        .map_err(build_err)?;

    let record_set = ResourceRecordSet::builder()
        .name(fqdn)
        .r#type(RrType::A)
        .ttl(RECORD_TTL_SECS)
        .resource_records(record)
        .build()
        .map_err(build_err)?;

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(record_set)
        .build()
        .map_err(build_err)?;

    ChangeBatch::builder()
        .comment(format!("trunkreg: {} -> {}", fqdn, ip))
        .changes(change)
        .build()
        .map_err(build_err)
}

/// Map an SDK failure to the agent's error taxonomy
fn map_sdk_error(err: SdkError<ChangeResourceRecordSetsError>) -> Error {
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => Error::timeout(format!("Route53 call timed out: {}", detail)),
        SdkError::ServiceError(service_err) => match service_err.err() {
            ChangeResourceRecordSetsError::NoSuchHostedZone(_) => {
                Error::not_found(format!("Hosted zone not found: {}", detail))
            }
            ChangeResourceRecordSetsError::InvalidChangeBatch(_)
            | ChangeResourceRecordSetsError::InvalidInput(_) => {
                Error::invalid_input(format!("Route53 rejected the change: {}", detail))
            }
            ChangeResourceRecordSetsError::PriorRequestNotComplete(_) => {
                Error::rate_limited(format!("Route53 change still pending: {}", detail))
            }
            _ => Error::provider(PROVIDER, detail),
        },
        _ => Error::provider(PROVIDER, detail),
    }
}

#[async_trait]
impl DnsPublisher for Route53Publisher {
    async fn publish(&self, fqdn: &str, ip: Ipv4Addr) -> Result<()> {
        let batch = build_change_batch(fqdn, ip)?;

        if self.dry_run {
            tracing::info!(
                zone = %self.hosted_zone_id,
                %fqdn,
                %ip,
                ttl = RECORD_TTL_SECS,
                "[DRY-RUN] Would UPSERT A record"
            );
            return Ok(());
        }

        if self.hosted_zone_id.is_empty() {
            return Err(Error::config("Route53 hosted zone id is not configured"));
        }

        tracing::debug!(zone = %self.hosted_zone_id, %fqdn, %ip, "Sending Route53 UPSERT");

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        PROVIDER
    }
}
