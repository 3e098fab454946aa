//! Store connection liveness
//!
//! Pings the registry store on its own short interval. The first failure is
//! fatal: [`LivenessMonitor::run_until`] returns it and the supervisor shuts
//! the agent down.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::traits::RegistryStore;

pub struct LivenessMonitor {
    store: Arc<dyn RegistryStore>,
    interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(store: Arc<dyn RegistryStore>, interval: Duration, timeout: Duration) -> Self {
        Self {
            store,
            interval,
            timeout,
        }
    }

    pub fn from_config(store: Arc<dyn RegistryStore>, config: &EngineConfig) -> Self {
        Self::new(store, config.liveness_interval(), config.liveness_timeout())
    }

    /// One bounded ping
    pub async fn check(&self) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::liveness(format!(
                "{} store ping failed: {}",
                self.store.store_name(),
                e
            ))),
            Err(_) => Err(Error::liveness(format!(
                "{} store ping timed out after {:?}",
                self.store.store_name(),
                self.timeout
            ))),
        }
    }

    /// Ping every interval until a ping fails
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Ping every interval until `shutdown` resolves (`Ok`) or a ping
    /// fails (`Err`). The first ping happens one interval after start.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let Some(start) = tokio::time::Instant::now().checked_add(self.interval) else {
            // First ping lies beyond the clock's range
            shutdown.await;
            info!("Liveness monitor stopped");
            return Ok(());
        };
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    if let Err(e) = self.check().await {
                        error!("Store connection lost: {}", e);
                        return Err(e);
                    }
                    debug!(store = self.store.store_name(), "Store connection alive");
                }

                _ = &mut shutdown => {
                    info!("Liveness monitor stopped");
                    return Ok(());
                }
            }
        }
    }
}
