// Command-line interface definitions for roleboot
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "roleboot")]
#[command(author, version, about = "Role-based entrypoint for multi-room audio containers")]
#[command(long_about = "
Roleboot is the entrypoint of a multi-room audio container. One image serves
every node; the ROLE environment variable decides what the container becomes.

ROLES:
  server        Stage the hub config and hand off to snapserver
  client        Pick an audio backend and hand off to snapclient
  ledfx_client  Load a loopback card, then supervise snapclient + LedFx
  ledfx         Hand off to LedFx alone

ENVIRONMENT:
  ROLE, HOST, SOUND_BACKEND, PLAYER_OPTIONS, DEVICE_NAME, CLIENT_ID,
  LOOPBACK_NUMBER, EXTRA_ARGS, PULSE_SERVER

Environment variables override the config file.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the role (server, client, ledfx_client, ledfx)
    #[arg(long, value_name = "ROLE")]
    pub role: Option<String>,

    /// Override the hub address the client connects to
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prepare the container and start the role (default if no command specified)
    Run,

    /// Show what the role would launch without touching the system
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List ALSA playback devices
    Devices,

    /// Show current configuration
    Config,
}
