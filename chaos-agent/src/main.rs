use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chaos_agent::{
    agent::Agent,
    cli::{Cli, Command},
    config::AgentConfig,
};
use chaos_tc::{
    command::{Executor, Runner, Tc},
    device,
    shaper::Shaper,
};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber =
        FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AgentConfig::try_from(&cli.options).context("invalid configuration")?;
    let executor: Arc<dyn Executor> = Arc::new(Runner);
    let tc = Tc::new(executor.clone()).with_program(&config.tc_path);

    match cli.subcommand() {
        Command::Bootstrap => bootstrap(&tc, &config),
        Command::Clear { interface } => {
            Shaper::new(tc, config.devices(), config.shaper.clone(), interface)
                .clear_mirroring()
                .context("failed to clear mirroring")
        }
        Command::Once => {
            bootstrap(&tc, &config)?;
            let agent = Agent::from_config(&config, executor);
            let report = tokio::task::spawn_blocking(move || agent.sync()).await??;
            if !report.is_clean() {
                bail!(
                    "cycle incomplete: {} failed, {} held, {} rejected, {} collection errors",
                    report.cycle.failed.len(),
                    report.held.len(),
                    report.rejected.len(),
                    report.cycle.gc.errors.len()
                );
            }
            Ok(())
        }
        Command::Run => {
            bootstrap(&tc, &config)?;
            tracing::info!(
                interval = ?config.sync_interval,
                selector = %config.selector,
                pods = %config.pods.display(),
                "starting chaos agent"
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(%e, "failed to listen for shutdown signal");
                }
            };
            Agent::from_config(&config, executor).run(config.sync_interval, shutdown).await?;
            Ok(())
        }
    }
}

fn bootstrap(tc: &Tc, config: &AgentConfig) -> Result<()> {
    device::bootstrap(tc, &config.ip_path, &config.devices())
        .context("failed to bootstrap shaping devices")
}
