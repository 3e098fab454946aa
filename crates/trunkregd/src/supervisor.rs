//! Task supervision for `trunkregd run`
//!
//! Runs startup cleanup, then the reconcile engine, the event drain and the
//! liveness monitor side by side. The first of these ends the run:
//!
//! - shutdown signal: clean stop
//! - liveness failure: fatal
//! - reconcile engine exit or panic: fatal
//!
//! On every path the engine finishes its in-flight cycle before the store is
//! closed.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error, info};
use trunkreg_core::{
    AgentConfig, DnsPublisher, IdentityProbe, LivenessMonitor, ReconcileEngine, RegistryStore,
    RestartCleanup,
};

/// Run the agent until `shutdown` resolves or something fatal happens.
///
/// Returns `Ok` only for a shutdown signal. The store is closed before
/// returning, whatever the outcome.
pub async fn supervise<F>(
    store: Arc<dyn RegistryStore>,
    probe: IdentityProbe,
    publisher: Box<dyn DnsPublisher>,
    config: &AgentConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = Result<&'static str>>,
{
    let result = run_tasks(Arc::clone(&store), probe, publisher, config, shutdown).await;
    store.close().await;
    result
}

async fn run_tasks<F>(
    store: Arc<dyn RegistryStore>,
    probe: IdentityProbe,
    publisher: Box<dyn DnsPublisher>,
    config: &AgentConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = Result<&'static str>>,
{
    if config.engine.cleanup_on_start {
        RestartCleanup::new(
            Arc::clone(&store),
            probe.hostname(),
            config.ownership.bump_restart_counter,
        )
        .run()
        .await?;
    }

    let (engine, mut events) = ReconcileEngine::new(probe, Arc::clone(&store), publisher, config)?;

    let (engine_stop_tx, engine_stop_rx) = oneshot::channel();
    let mut engine_task =
        tokio::spawn(async move { engine.run_with_shutdown(Some(engine_stop_rx)).await });

    // Ends once the engine is dropped
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Engine event");
        }
    });

    let monitor = LivenessMonitor::from_config(store, &config.engine);
    let (liveness_stop_tx, liveness_stop_rx) = oneshot::channel::<()>();
    let mut liveness_task = tokio::spawn(async move {
        monitor
            .run_until(async {
                let _ = liveness_stop_rx.await;
            })
            .await
    });

    info!("trunkregd running");

    let (result, engine_done, liveness_done) = tokio::select! {
        joined = &mut liveness_task => {
            let result = match joined {
                Ok(Ok(())) => Err(anyhow!("liveness monitor stopped unexpectedly")),
                Ok(Err(e)) => Err(anyhow!("registry store connection lost: {}", e)),
                Err(e) => Err(anyhow!("liveness monitor task failed: {}", e)),
            };
            (result, false, true)
        }

        joined = &mut engine_task => (Err(engine_exit(joined)), true, false),

        signal = shutdown => {
            let result = signal.map(|name| info!("Received shutdown signal: {}", name));
            (result, false, false)
        }
    };

    if !engine_done {
        info!("Stopping reconcile engine, waiting for the in-flight cycle");
        let _ = engine_stop_tx.send(());
        match engine_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Reconcile engine error: {}", e),
            Err(e) => error!("Reconcile engine task failed: {}", e),
        }
    }

    if !liveness_done {
        let _ = liveness_stop_tx.send(());
        if let Err(e) = liveness_task.await {
            error!("Liveness monitor task failed: {}", e);
        }
    }

    if let Err(e) = event_task.await {
        error!("Event drain task failed: {}", e);
    }

    result
}

fn engine_exit(joined: std::result::Result<trunkreg_core::Result<()>, JoinError>) -> anyhow::Error {
    match joined {
        Ok(Ok(())) => anyhow!("reconcile engine stopped unexpectedly"),
        Ok(Err(e)) => anyhow!("reconcile engine failed: {}", e),
        Err(e) => anyhow!("reconcile engine task failed: {}", e),
    }
}
