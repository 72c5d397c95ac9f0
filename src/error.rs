//! Error types for roleboot
//!
//! Uses thiserror for ergonomic error definitions with messages that point
//! the operator at the environment variable or device that needs fixing.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the roleboot application
#[derive(Error, Debug)]
pub enum RolebootError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Loopback bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while preparing the virtual loopback device and its routing
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to load snd-aloop for card {index}: {reason}\n  Is the container privileged, with /lib/modules mounted?")]
    LoadFailed { index: u32, reason: String },

    #[error("Loopback card {0} did not appear after loading snd-aloop. Check `aplay -l` on the host.")]
    MarkerMissing(u32),

    #[error("Loopback is on card {found} but LOOPBACK_NUMBER is {expected}. Set LOOPBACK_NUMBER={found} or unload snd-aloop on the host.")]
    WrongIndex { expected: u32, found: u32 },

    #[error("Failed to write bridge config {path:?}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the process group supervisor
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Restart limit reached after {0} restarts, giving up")]
    RestartLimit(u32),

    #[error("Failed to install signal handler: {0}")]
    Signal(String),
}

/// Result type alias using RolebootError
pub type Result<T> = std::result::Result<T, RolebootError>;
