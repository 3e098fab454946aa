//! Configuration types for the registration agent
//!
//! All structures deserialize from TOML with per-field defaults, so an empty
//! file (or no file at all) yields a working configuration for a local
//! database. Environment variables override file values through
//! [`AgentConfig::apply_env_overrides`].

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Main agent configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    /// Registry database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// AWS credentials for the DNS provider
    #[serde(default)]
    pub aws: AwsConfig,

    /// Managed DNS zone settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Optional pinning of hostname / private address
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Public address discovery
    #[serde(default)]
    pub ip_lookup: IpLookupConfig,

    /// Registry table and static peer profile
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Ownership tables released by restart cleanup
    #[serde(default)]
    pub ownership: OwnershipConfig,

    /// Reconcile loop and liveness timers
    #[serde(default)]
    pub engine: EngineConfig,

    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// Explicit log level, wins over `debug`
    #[serde(default)]
    pub log_level: Option<String>,
}

impl AgentConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.dns.validate()?;
        self.ip_lookup.validate()?;
        self.registry.validate()?;
        self.ownership.validate()?;

        if self.database.host.is_empty() {
            return Err(crate::Error::config("database host cannot be empty"));
        }
        if self.database.database.is_empty() {
            return Err(crate::Error::config("database name cannot be empty"));
        }

        match self.effective_log_level() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(crate::Error::config(format!(
                "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ))),
        }
    }

    /// Log level after applying the `debug` flag
    pub fn effective_log_level(&self) -> &str {
        match self.log_level.as_deref() {
            Some(level) => level,
            None if self.debug => "debug",
            None => "info",
        }
    }

    /// Apply environment overrides on top of file values.
    ///
    /// `lookup` resolves a variable name to its value; the daemon passes
    /// `std::env::var(..).ok()`. Empty values count as unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), crate::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("MYSQL_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("MYSQL_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("MYSQL_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = get("MYSQL_DB") {
            self.database.database = v;
        }
        if let Some(v) = get("AWS_ACCESS_KEY") {
            self.aws.access_key_id = v;
        }
        if let Some(v) = get("AWS_SECRET_KEY") {
            self.aws.secret_access_key = v;
        }
        if let Some(v) = get("AWS_REGION") {
            self.aws.region = v;
        }
        if let Some(v) = get("TRUNKREG_HOSTED_ZONE_ID") {
            self.dns.hosted_zone_id = v;
        }
        if let Some(v) = get("TRUNKREG_UPDATE_INTERVAL_SEC") {
            self.engine.update_interval_secs = v.trim().parse().map_err(|_| {
                crate::Error::config(format!(
                    "TRUNKREG_UPDATE_INTERVAL_SEC must be a whole number of seconds. Got: {}",
                    v
                ))
            })?;
        }
        if let Some(v) = get("TRUNKREG_DEBUG") {
            self.debug = parse_flag(&v).ok_or_else(|| {
                crate::Error::config(format!("TRUNKREG_DEBUG must be a boolean. Got: {}", v))
            })?;
        }
        if let Some(v) = get("TRUNKREG_LOG_LEVEL") {
            self.log_level = Some(v.to_lowercase());
        }

        Ok(())
    }
}

/// One week
const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 3600;
const MAX_OPERATION_TIMEOUT_MS: u64 = 5 * 60 * 1000;
/// One day
const MAX_UPDATE_INTERVAL_SECS: u64 = 24 * 3600;
const MAX_LOOKUP_TIMEOUT_MS: u64 = 60 * 1000;
const MAX_LIVENESS_SECS: u64 = 3600;

fn check_range(
    name: &str,
    value: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<(), crate::Error> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(crate::Error::config(format!(
            "{} must be between {} and {}. Got: {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether `value` can be spliced into SQL as a bare table or column name.
pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    value.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(kind: &str, value: &str) -> Result<(), crate::Error> {
    if is_sql_identifier(value) {
        Ok(())
    } else {
        Err(crate::Error::config(format!(
            "{} '{}' is not a plain SQL identifier",
            kind, value
        )))
    }
}

/// Registry database connection
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_user")]
    pub user: String,

    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub database: String,

    /// How long a caller waits for the single pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            database: default_db_name(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .field("database", &self.database)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "root".to_string()
}

fn default_db_name() -> String {
    "asterisk".to_string()
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

/// AWS credentials and region
#[derive(Clone, Deserialize)]
pub struct AwsConfig {
    /// Empty means "use the SDK default credential chain"
    #[serde(default)]
    pub access_key_id: String,

    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub secret_access_key: String,

    #[serde(default = "default_aws_region")]
    pub region: String,
}

impl AwsConfig {
    /// Whether static credentials were supplied
    pub fn has_static_credentials(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: default_aws_region(),
        }
    }
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<REDACTED>")
            .field("region", &self.region)
            .finish()
    }
}

fn default_aws_region() -> String {
    "eu-west-1".to_string()
}

/// Managed DNS zone settings
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// Hosted zone the A records live in (e.g. "/hostedzone/Z123")
    #[serde(default)]
    pub hosted_zone_id: String,

    /// Appended to `md5(hostname)` to form the public DNS name
    #[serde(default = "default_record_suffix")]
    pub record_suffix: String,

    /// A stored DNS name containing this marker is kept as-is on update
    #[serde(default = "default_managed_zone_marker")]
    pub managed_zone_marker: String,

    /// After a successful publish the same address is not re-published
    /// for this long.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Upper bound for one provider call
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Log the intended change instead of calling the provider
    #[serde(default)]
    pub dry_run: bool,
}

impl DnsConfig {
    /// Validate the DNS configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hosted_zone_id.is_empty() && !self.dry_run {
            return Err(crate::Error::config(
                "dns.hosted_zone_id is required unless dns.dry_run is set",
            ));
        }
        if self.record_suffix.is_empty() {
            return Err(crate::Error::config("dns.record_suffix cannot be empty"));
        }
        if self.managed_zone_marker.is_empty() {
            return Err(crate::Error::config("dns.managed_zone_marker cannot be empty"));
        }
        check_range("dns.cooldown_secs", self.cooldown_secs, 1..=MAX_COOLDOWN_SECS)?;
        check_range(
            "dns.operation_timeout_ms",
            self.operation_timeout_ms,
            1..=MAX_OPERATION_TIMEOUT_MS,
        )?;
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            hosted_zone_id: String::new(),
            record_suffix: default_record_suffix(),
            managed_zone_marker: default_managed_zone_marker(),
            cooldown_secs: default_cooldown_secs(),
            operation_timeout_ms: default_operation_timeout_ms(),
            dry_run: false,
        }
    }
}

fn default_record_suffix() -> String {
    "-voip-aws-eu.publicdns.zone".to_string()
}

fn default_managed_zone_marker() -> String {
    "publicdns.zone".to_string()
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_operation_timeout_ms() -> u64 {
    10_000
}

/// Overrides for the locally-resolved identity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Use this instead of the OS hostname
    #[serde(default)]
    pub hostname: Option<String>,

    /// Use this instead of the default-route source address
    #[serde(default)]
    pub private_address: Option<Ipv4Addr>,
}

/// Public address discovery
#[derive(Debug, Clone, Deserialize)]
pub struct IpLookupConfig {
    /// Plain-text "what is my IP" endpoints, queried in parallel
    #[serde(default = "default_ip_services")]
    pub services: Vec<String>,
}

impl IpLookupConfig {
    /// Validate the lookup configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.services.is_empty() {
            return Err(crate::Error::config("ip_lookup.services cannot be empty"));
        }
        for url in &self.services {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(crate::Error::config(format!(
                    "ip_lookup service must use HTTP or HTTPS scheme. Got: {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            services: default_ip_services(),
        }
    }
}

fn default_ip_services() -> Vec<String> {
    vec![
        "http://ifconfig.co/x-real-ip".to_string(),
        "http://ifconfig.io/ip".to_string(),
    ]
}

/// Registry table and static peer profile
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Peer-registry table name
    #[serde(default = "default_registry_table")]
    pub table: String,

    /// Fixed per-deployment peer fields
    #[serde(default)]
    pub profile: PeerProfile,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        check_identifier("registry.table", &self.table)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table: default_registry_table(),
            profile: PeerProfile::default(),
        }
    }
}

fn default_registry_table() -> String {
    "iaxfriends".to_string()
}

/// Static operational fields written on every registration row.
///
/// These never derive from live state; they are the same for every node of
/// a deployment.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeerProfile {
    pub peer_type: String,
    pub port: u16,
    pub mask: String,
    pub trunk: String,
    pub encryption: String,
    pub transfer: String,
    pub jitterbuffer: String,
    pub disallow: String,
    pub allow: String,
    pub qualify: String,
    pub qualify_freq_ok_ms: u32,
    pub qualify_freq_not_ok_ms: u32,
    pub inkeys: String,
    pub outkeys: String,
    /// ⚠️ NEVER log this value
    pub manager_password: String,
    /// ⚠️ NEVER log this value
    pub ari_password: String,
}

impl Default for PeerProfile {
    fn default() -> Self {
        Self {
            peer_type: "friend".to_string(),
            port: 4569,
            mask: "255.255.255.255".to_string(),
            trunk: "yes".to_string(),
            encryption: "yes".to_string(),
            transfer: "mediaonly".to_string(),
            jitterbuffer: "yes".to_string(),
            disallow: "all".to_string(),
            allow: "ulaw,alaw".to_string(),
            qualify: "yes".to_string(),
            qualify_freq_ok_ms: 60_000,
            qualify_freq_not_ok_ms: 10_000,
            inkeys: "IAXTrunk".to_string(),
            outkeys: "IAXTrunk".to_string(),
            manager_password: String::new(),
            ari_password: String::new(),
        }
    }
}

impl PeerProfile {
    /// Shared credentials left empty, by config key
    pub fn unset_credentials(&self) -> Vec<&'static str> {
        let mut unset = Vec::new();
        if self.manager_password.is_empty() {
            unset.push("registry.profile.manager_password");
        }
        if self.ari_password.is_empty() {
            unset.push("registry.profile.ari_password");
        }
        unset
    }
}

impl std::fmt::Debug for PeerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerProfile")
            .field("peer_type", &self.peer_type)
            .field("port", &self.port)
            .field("trunk", &self.trunk)
            .field("allow", &self.allow)
            .field("manager_password", &"<REDACTED>")
            .field("ari_password", &"<REDACTED>")
            .finish_non_exhaustive()
    }
}

/// Ownership tables released by restart cleanup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    pub call_channels_table: String,
    pub caller_column: String,
    pub callee_column: String,
    pub parking_lots_table: String,
    pub queues_table: String,
    /// Owning-server column on the parking-lot and queue tables
    pub owner_column: String,
    /// Increment a counter on the node's registry row during cleanup
    pub bump_restart_counter: bool,
    pub restart_counter_column: String,
}

impl OwnershipConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        check_identifier("ownership.call_channels_table", &self.call_channels_table)?;
        check_identifier("ownership.caller_column", &self.caller_column)?;
        check_identifier("ownership.callee_column", &self.callee_column)?;
        check_identifier("ownership.parking_lots_table", &self.parking_lots_table)?;
        check_identifier("ownership.queues_table", &self.queues_table)?;
        check_identifier("ownership.owner_column", &self.owner_column)?;
        check_identifier("ownership.restart_counter_column", &self.restart_counter_column)
    }
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            call_channels_table: "call_channels".to_string(),
            caller_column: "caller_server".to_string(),
            callee_column: "callee_server".to_string(),
            parking_lots_table: "parkinglots".to_string(),
            queues_table: "queues_meta".to_string(),
            owner_column: "server".to_string(),
            bump_restart_counter: false,
            restart_counter_column: "restart_count".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between reconcile cycles (the first runs immediately)
    #[serde(default = "default_update_interval_secs", alias = "update_interval_sec")]
    pub update_interval_secs: u64,

    /// Bound on one public address lookup
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Seconds between store liveness checks
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,

    /// Bound on one liveness round trip
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Release this node's ownership rows before the first cycle
    #[serde(default = "default_cleanup_on_start")]
    pub cleanup_on_start: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        check_range(
            "engine.update_interval_secs",
            self.update_interval_secs,
            1..=MAX_UPDATE_INTERVAL_SECS,
        )?;
        check_range(
            "engine.lookup_timeout_ms",
            self.lookup_timeout_ms,
            1..=MAX_LOOKUP_TIMEOUT_MS,
        )?;
        check_range(
            "engine.liveness_interval_secs",
            self.liveness_interval_secs,
            1..=MAX_LIVENESS_SECS,
        )?;
        check_range(
            "engine.liveness_timeout_secs",
            self.liveness_timeout_secs,
            1..=MAX_LIVENESS_SECS,
        )?;
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("engine.event_channel_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            liveness_interval_secs: default_liveness_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            cleanup_on_start: default_cleanup_on_start(),
        }
    }
}

fn default_update_interval_secs() -> u64 {
    60
}

fn default_lookup_timeout_ms() -> u64 {
    600
}

fn default_liveness_interval_secs() -> u64 {
    5
}

fn default_liveness_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_cleanup_on_start() -> bool {
    true
}
