//! Restart cleanup
//!
//! Releases every ownership row a previous run of this node left behind, in
//! one transaction. Runs once before the reconcile loop starts, or on its own
//! as a maintenance command.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::traits::{CleanupReport, RegistryStore};

pub struct RestartCleanup {
    store: Arc<dyn RegistryStore>,
    hostname: String,
    bump_restart_counter: bool,
}

impl RestartCleanup {
    pub fn new(store: Arc<dyn RegistryStore>, hostname: impl Into<String>, bump_restart_counter: bool) -> Self {
        Self {
            store,
            hostname: hostname.into(),
            bump_restart_counter,
        }
    }

    /// Run the batch. On `Err` nothing was changed.
    pub async fn run(&self) -> Result<CleanupReport> {
        match self
            .store
            .release_ownership(&self.hostname, self.bump_restart_counter)
            .await
        {
            Ok(report) => {
                info!(
                    hostname = %self.hostname,
                    channels_deleted = report.channels_deleted,
                    parking_lots_released = report.parking_lots_released,
                    queues_released = report.queues_released,
                    restart_counter_bumped = report.restart_counter_bumped,
                    "Released ownership rows from previous run"
                );
                Ok(report)
            }
            Err(e) => {
                error!(hostname = %self.hostname, "Restart cleanup rolled back: {}", e);
                if matches!(e, Error::Cleanup(_)) {
                    Err(e)
                } else {
                    Err(Error::cleanup(e.to_string()))
                }
            }
        }
    }
}
