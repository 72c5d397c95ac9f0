//! Roleboot - role-based container entrypoint
//!
//! Run with `roleboot` or `roleboot run` to start the configured role.
//! Use `roleboot plan` to see what would be launched.
//! Use `roleboot devices` to list ALSA playback devices.

use clap::Parser;
use roleboot::devices::{self, AlsaHost, AudioHost};
use roleboot::orchestrator::{self, Orchestrator, TerminalAction};
use roleboot::services::SystemServices;
use roleboot::supervisor::{self, OsLauncher};
use roleboot::{config, Cli, Commands, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("roleboot={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration, environment on top of the file
    let mut config = config::load_config(cli.config.as_deref(), |k| std::env::var(k).ok())?;

    // Apply CLI overrides
    if let Some(role) = cli.role {
        config.role = role.parse()?;
    }
    if let Some(host) = cli.host {
        config.host = Some(host);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,

        Commands::Plan { json } => {
            let orch = Orchestrator::new(config, Arc::new(AlsaHost::new()), Arc::new(SystemServices::new()));
            let action = orch.plan().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&action.summary())?);
            } else {
                println!("Role: {}", orch.config().role);
                println!("{}", action);
            }
        }

        Commands::Devices => list_devices().await?,

        Commands::Config => {
            println!("# Effective configuration (file + environment)\n");
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let host = Arc::new(AlsaHost::new());
    devices::log_devices(host.as_ref()).await;

    let orch = Orchestrator::new(config, host.clone(), Arc::new(SystemServices::new()));

    match orch.dispatch().await? {
        TerminalAction::HandOff(command) => {
            let err = orchestrator::hand_off(&command);
            tracing::error!("{}", err);
            devices::log_devices(host.as_ref()).await;
            Err(err.into())
        }
        TerminalAction::Supervise(plan) => {
            let shutdown = supervisor::interrupt_signal()?;
            let mut group = plan.into_supervisor(Arc::new(OsLauncher::new()));
            let report = group.run(shutdown).await?;
            tracing::info!("Supervisor stopped after {} restart(s)", report.restarts);
            Ok(())
        }
    }
}

async fn list_devices() -> anyhow::Result<()> {
    let host = AlsaHost::new();

    println!("PCM devices (aplay -L):");
    for pcm in devices::parse_pcm_list(&host.list_pcms().await?) {
        println!("  {:<32} {}", pcm.name, pcm.description);
    }

    println!("\nHardware devices (aplay -l):");
    for hw in devices::parse_hardware_list(&host.list_hardware().await?) {
        println!("  hw:{},{:<4} {}", hw.card, hw.device, hw.description());
    }

    Ok(())
}
