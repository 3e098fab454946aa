// # MySQL Registry Store
//
// This crate provides the MySQL implementation of `RegistryStore` for the
// trunk registration agent.
//
// ## Connection Model
//
// One pooled connection (min 1, max 1) with a bounded acquire timeout. The
// reconcile loop, the liveness monitor and restart cleanup all share it, so
// a dead connection is noticed by whichever touches it first.
//
// ## Transactions
//
// `upsert` and `release_ownership` each run in one transaction: commit on
// success, explicit rollback on the first failing statement.

pub mod sql;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{Row, Transaction};
use tracing::{debug, info, warn};
use trunkreg_core::config::{DatabaseConfig, OwnershipConfig, RegistryConfig};
use trunkreg_core::traits::{
    CleanupReport, ExistingRegistration, RegistryStore, UpsertKind, UpsertOutcome,
};
use trunkreg_core::{Error, RegistrationRecord, ResolvedIdentity, Result};

use crate::sql::Statements;

fn registry_err(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::registry(format!("{}: {}", context, e))
}

/// MySQL-backed registry store
#[derive(Debug, Clone)]
pub struct MySqlRegistryStore {
    pool: MySqlPool,
    statements: Statements,
}

impl MySqlRegistryStore {
    /// Connect and establish the single pooled connection
    ///
    /// Fails if the database is unreachable; callers treat that as fatal at
    /// startup.
    pub async fn connect(
        database: &DatabaseConfig,
        registry: &RegistryConfig,
        ownership: &OwnershipConfig,
    ) -> Result<Self> {
        let statements = Statements::new(registry, ownership)?;

        let options = MySqlConnectOptions::new()
            .host(&database.host)
            .port(database.port)
            .username(&database.user)
            .password(&database.password)
            .database(&database.database);

        let pool = MySqlPoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(registry_err("failed to connect to registry database"))?;

        info!(
            host = %database.host,
            port = database.port,
            database = %database.database,
            table = %registry.table,
            "Connected to registry database"
        );

        Ok(Self { pool, statements })
    }

    /// Wrap an existing pool
    pub fn from_pool(
        pool: MySqlPool,
        registry: &RegistryConfig,
        ownership: &OwnershipConfig,
    ) -> Result<Self> {
        Ok(Self {
            pool,
            statements: Statements::new(registry, ownership)?,
        })
    }

    async fn upsert_in(
        &self,
        tx: &mut Transaction<'static, MySql>,
        candidate: &RegistrationRecord,
        existing: Option<&ExistingRegistration>,
    ) -> Result<UpsertOutcome> {
        if let Some(existing) = existing {
            let locked = sqlx::query(&self.statements.lock_row)
                .bind(existing.id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(registry_err("failed to lock registry row"))?;

            if locked.is_some() {
                let result = bind_record(sqlx::query(&self.statements.update), candidate)
                    .bind(existing.id)
                    .execute(&mut **tx)
                    .await
                    .map_err(registry_err("failed to update registry row"))?;

                return Ok(UpsertOutcome {
                    kind: UpsertKind::Updated,
                    rows_affected: result.rows_affected(),
                });
            }

            warn!(
                id = existing.id,
                name = %existing.name,
                "Matched registry row vanished before update, inserting instead"
            );
        }

        let result = bind_record(sqlx::query(&self.statements.insert), candidate)
            .bind(candidate.provisioned_at.naive_utc())
            .bind(&candidate.secret)
            .execute(&mut **tx)
            .await
            .map_err(registry_err("failed to insert registry row"))?;

        Ok(UpsertOutcome {
            kind: UpsertKind::Inserted,
            rows_affected: result.rows_affected(),
        })
    }

    async fn release_in(
        &self,
        tx: &mut Transaction<'static, MySql>,
        hostname: &str,
        bump_restart_counter: bool,
    ) -> Result<CleanupReport> {
        let channels = sqlx::query(&self.statements.delete_call_channels)
            .bind(hostname)
            .bind(hostname)
            .execute(&mut **tx)
            .await
            .map_err(registry_err("failed to delete call channels"))?;

        let parking = sqlx::query(&self.statements.release_parking_lots)
            .bind(hostname)
            .execute(&mut **tx)
            .await
            .map_err(registry_err("failed to release parking lots"))?;

        let queues = sqlx::query(&self.statements.release_queues)
            .bind(hostname)
            .execute(&mut **tx)
            .await
            .map_err(registry_err("failed to release queues"))?;

        let restart_counter_bumped = if bump_restart_counter {
            let bumped = sqlx::query(&self.statements.bump_restart_counter)
                .bind(hostname)
                .execute(&mut **tx)
                .await
                .map_err(registry_err("failed to bump restart counter"))?;
            bumped.rows_affected() > 0
        } else {
            false
        };

        Ok(CleanupReport {
            channels_deleted: channels.rows_affected(),
            parking_lots_released: parking.rows_affected(),
            queues_released: queues.rows_affected(),
            restart_counter_bumped,
        })
    }
}

/// Bind the shared registry columns in [`sql::REGISTRY_COLUMNS`] order
fn bind_record<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    record: &'q RegistrationRecord,
) -> Query<'q, MySql, MySqlArguments> {
    let profile = &record.profile;
    query
        .bind(&record.name)
        .bind(&record.registrar)
        .bind(&profile.peer_type)
        .bind(&record.username)
        .bind(&record.context)
        .bind(record.host_address.to_string())
        .bind(record.local_address.to_string())
        .bind(record.ip_address.to_string())
        .bind(profile.port)
        .bind(&profile.mask)
        .bind(&profile.trunk)
        .bind(&profile.encryption)
        .bind(&profile.transfer)
        .bind(&profile.jitterbuffer)
        .bind(&profile.disallow)
        .bind(&profile.allow)
        .bind(&profile.qualify)
        .bind(profile.qualify_freq_ok_ms)
        .bind(profile.qualify_freq_not_ok_ms)
        .bind(record.last_response_at.naive_utc())
        .bind(i8::from(record.is_upstream))
        .bind(&profile.inkeys)
        .bind(&profile.outkeys)
        .bind(&profile.manager_password)
        .bind(&profile.ari_password)
        .bind(&record.public_dns_hostname)
}

async fn finish<T>(tx: Transaction<'static, MySql>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(registry_err("failed to commit transaction"))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

#[async_trait]
impl RegistryStore for MySqlRegistryStore {
    async fn find_existing(
        &self,
        identity: &ResolvedIdentity,
    ) -> Result<Option<ExistingRegistration>> {
        let row = sqlx::query(&self.statements.find_existing)
            .bind(&identity.hostname)
            .bind(identity.private_address.to_string())
            .bind(identity.public_address.to_string())
            .bind(&identity.hostname)
            .fetch_optional(&self.pool)
            .await
            .map_err(registry_err("failed to look up registry row"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ExistingRegistration {
            id: row
                .try_get("id")
                .map_err(registry_err("registry row has no id"))?,
            name: row
                .try_get("name")
                .map_err(registry_err("registry row has no name"))?,
            public_dns_hostname: row
                .try_get::<Option<String>, _>("hostname")
                .map_err(registry_err("registry row has unreadable hostname"))?
                .filter(|h| !h.is_empty()),
        }))
    }

    async fn upsert(
        &self,
        candidate: &RegistrationRecord,
        existing: Option<&ExistingRegistration>,
    ) -> Result<UpsertOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(registry_err("failed to begin transaction"))?;

        let result = self.upsert_in(&mut tx, candidate, existing).await;
        finish(tx, result).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query(&self.statements.ping)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Error::liveness(format!("SELECT 1 failed: {}", e)))
    }

    async fn release_ownership(
        &self,
        hostname: &str,
        bump_restart_counter: bool,
    ) -> Result<CleanupReport> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::cleanup(format!("failed to begin transaction: {}", e)))?;

        let result = self.release_in(&mut tx, hostname, bump_restart_counter).await;
        finish(tx, result)
            .await
            .map_err(|e| Error::cleanup(e.to_string()))
    }

    /// Close the pool, waiting for the connection to be returned
    async fn close(&self) {
        self.pool.close().await;
        debug!("Registry database pool closed");
    }

    fn store_name(&self) -> &'static str {
        "mysql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazy_pool_builds_store_without_server() {
        let options = MySqlConnectOptions::new()
            .host("127.0.0.1")
            .port(3306)
            .username("root")
            .database("asterisk");
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);

        let store = MySqlRegistryStore::from_pool(
            pool,
            &RegistryConfig::default(),
            &OwnershipConfig::default(),
        )
        .unwrap();

        assert_eq!(store.store_name(), "mysql");
        assert!(store.statements.insert.contains("`iaxfriends`"));
    }

    #[tokio::test]
    async fn bad_table_name_fails_before_connecting() {
        let registry = RegistryConfig {
            table: "bad table".to_string(),
            ..RegistryConfig::default()
        };
        let result = MySqlRegistryStore::connect(
            &DatabaseConfig::default(),
            &registry,
            &OwnershipConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
