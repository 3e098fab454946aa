//! SQL text for the registry and ownership tables
//!
//! Table and column names come from configuration, so statements are built
//! once at startup from validated identifiers. Values are always bound.

use trunkreg_core::config::{is_sql_identifier, OwnershipConfig, RegistryConfig};
use trunkreg_core::{Error, Result};

/// Columns written on both insert and update, in bind order
pub const REGISTRY_COLUMNS: &[&str] = &[
    "name",
    "regserver",
    "type",
    "username",
    "context",
    "host",
    "local_ip",
    "ipaddr",
    "port",
    "mask",
    "trunk",
    "encryption",
    "transfer",
    "jitterbuffer",
    "disallow",
    "allow",
    "qualify",
    "qualifyfreqok",
    "qualifyfreqnotok",
    "provision_last_response",
    "is_upstream",
    "inkeys",
    "outkeys",
    "manager_password",
    "ari_password",
    "hostname",
];

/// Columns written only on insert, bound after [`REGISTRY_COLUMNS`]
pub const INSERT_ONLY_COLUMNS: &[&str] = &["provision_date", "secret"];

fn quote(identifier: &str) -> Result<String> {
    if is_sql_identifier(identifier) {
        Ok(format!("`{}`", identifier))
    } else {
        Err(Error::config(format!(
            "'{}' is not a plain SQL identifier",
            identifier
        )))
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Every statement the store runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub find_existing: String,
    pub lock_row: String,
    pub update: String,
    pub insert: String,
    pub ping: String,
    pub delete_call_channels: String,
    pub release_parking_lots: String,
    pub release_queues: String,
    pub bump_restart_counter: String,
}

impl Statements {
    pub fn new(registry: &RegistryConfig, ownership: &OwnershipConfig) -> Result<Self> {
        let table = quote(&registry.table)?;

        let assignments = REGISTRY_COLUMNS
            .iter()
            .map(|c| quote(c).map(|c| format!("{} = ?", c)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let insert_columns = REGISTRY_COLUMNS
            .iter()
            .chain(INSERT_ONLY_COLUMNS)
            .map(|c| quote(c))
            .collect::<Result<Vec<_>>>()?;

        let channels = quote(&ownership.call_channels_table)?;
        let caller = quote(&ownership.caller_column)?;
        let callee = quote(&ownership.callee_column)?;
        let parking = quote(&ownership.parking_lots_table)?;
        let queues = quote(&ownership.queues_table)?;
        let owner = quote(&ownership.owner_column)?;
        let counter = quote(&ownership.restart_counter_column)?;

        Ok(Self {
            find_existing: format!(
                "SELECT CAST(`id` AS SIGNED) AS id, `name`, `hostname` FROM {table} \
                 WHERE `name` = ? OR `local_ip` = ? OR `ipaddr` = ? \
                 ORDER BY (`name` = ?) DESC, `id` ASC LIMIT 1"
            ),
            lock_row: format!(
                "SELECT CAST(`id` AS SIGNED) AS id FROM {table} WHERE `id` = ? FOR UPDATE"
            ),
            update: format!("UPDATE {table} SET {assignments} WHERE `id` = ?"),
            insert: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                insert_columns.join(", "),
                placeholders(insert_columns.len())
            ),
            ping: "SELECT 1".to_string(),
            delete_call_channels: format!(
                "DELETE FROM {channels} WHERE {caller} = ? OR {callee} = ?"
            ),
            release_parking_lots: format!(
                "UPDATE {parking} SET {owner} = '' WHERE {owner} = ?"
            ),
            release_queues: format!("UPDATE {queues} SET {owner} = '' WHERE {owner} = ?"),
            bump_restart_counter: format!(
                "UPDATE {table} SET {counter} = {counter} + 1 WHERE `name` = ?"
            ),
        })
    }
}
