// # trunkregd - trunk self-registration daemon
//
// Thin integration layer: loads configuration, wires the concrete MySQL
// store, Route53 publisher and HTTP address lookup into the core engine,
// and supervises the process. No registration or DNS logic lives here.
//
// ## Commands
//
// - `run` (default): restart cleanup (unless disabled), then the reconcile
//   loop and the store liveness monitor until a signal, a lost store
//   connection or an engine failure (see `supervisor`)
// - `cleanup`: release everything this host owns and exit
//
// ## Configuration
//
// TOML file from `--config` / `TRUNKREG_CONFIG`, defaulting to
// `/etc/trunkreg/trunkreg.toml`. Environment variables override the file:
//
// - `MYSQL_HOST`, `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_DB`
// - `AWS_ACCESS_KEY`, `AWS_SECRET_KEY`, `AWS_REGION`
// - `TRUNKREG_HOSTED_ZONE_ID`, `TRUNKREG_UPDATE_INTERVAL_SEC`
// - `TRUNKREG_DEBUG`, `TRUNKREG_LOG_LEVEL`
//
// ## Example
//
// ```bash
// export MYSQL_HOST=10.0.0.2
// export MYSQL_PASSWORD=secret
// export TRUNKREG_HOSTED_ZONE_ID=/hostedzone/Z123ABC
//
// trunkregd --config /etc/trunkreg/trunkreg.toml run
// ```

mod settings;
mod supervisor;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use trunkreg_core::{
    AgentConfig, IdentityProbe, LocalIdentity, RegistryStore, RestartCleanup, SystemIdentity,
};
use trunkreg_ip_http::HttpPublicIpSource;
use trunkreg_provider_route53::Route53Publisher;
use trunkreg_store_mysql::MySqlRegistryStore;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// A supervisor restarts the agent on any non-zero exit.
#[derive(Debug, Clone, Copy)]
enum TrunkregExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Config or startup error, lost store connection, engine failure
    Failure = 1,
}

impl From<TrunkregExitCode> for ExitCode {
    fn from(code: TrunkregExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "trunkregd", version, about = "Trunk self-registration and DNS-sync agent")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TRUNKREG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Register this node and keep its registry row and DNS record current
    Run,
    /// Release call channels, parking lots and queues owned by this host, then exit
    Cleanup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match settings::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return TrunkregExitCode::Failure.into();
        }
    };

    let log_level = match config.effective_log_level() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TrunkregExitCode::Failure.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TrunkregExitCode::Failure.into();
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    let result = rt.block_on(async {
        let outcome = match command {
            Command::Run => run_daemon(config).await,
            Command::Cleanup => run_cleanup(config).await,
        };
        match outcome {
            Ok(()) => TrunkregExitCode::CleanShutdown,
            Err(e) => {
                error!("trunkregd failed: {:#}", e);
                TrunkregExitCode::Failure
            }
        }
    });

    result.into()
}

async fn connect_store(config: &AgentConfig) -> Result<Arc<dyn RegistryStore>> {
    let store =
        MySqlRegistryStore::connect(&config.database, &config.registry, &config.ownership).await?;
    let store: Arc<dyn RegistryStore> = Arc::new(store);
    Ok(store)
}

/// One-shot restart cleanup for this host
async fn run_cleanup(config: AgentConfig) -> Result<()> {
    let hostname = SystemIdentity::from_config(&config.identity).hostname();
    info!(%hostname, "Running restart cleanup");

    let store = connect_store(&config).await?;
    let result = RestartCleanup::new(
        Arc::clone(&store),
        hostname,
        config.ownership.bump_restart_counter,
    )
    .run()
    .await;
    store.close().await;

    result.map(|_| ()).map_err(Into::into)
}

/// Run the agent until a shutdown signal or a fatal condition
async fn run_daemon(config: AgentConfig) -> Result<()> {
    info!("Starting trunkregd");

    let publisher = Route53Publisher::from_config(&config.aws, &config.dns).await?;
    let ip_source =
        HttpPublicIpSource::from_config(&config.ip_lookup, config.engine.lookup_timeout())?;
    let probe = IdentityProbe::new(
        Box::new(SystemIdentity::from_config(&config.identity)),
        Box::new(ip_source),
        config.engine.lookup_timeout(),
    );

    let store = connect_store(&config).await?;
    let result = supervisor::supervise(
        store,
        probe,
        Box::new(publisher),
        &config,
        wait_for_shutdown(),
    )
    .await;

    info!("trunkregd stopped");
    result
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["trunkregd"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["trunkregd", "--config", "/tmp/a.toml", "cleanup"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Cleanup)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
    }

    #[test]
    fn exit_codes_follow_supervisor_convention() {
        assert_eq!(TrunkregExitCode::CleanShutdown as u8, 0);
        assert_eq!(TrunkregExitCode::Failure as u8, 1);
    }
}
