//! Background system services and filesystem staging
//!
//! The message bus and service discovery daemons are advisory: a failure to
//! start either is logged and startup continues. Hub config staging and named
//! pipe creation follow the same rule.

use crate::config::ServicesConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Starts fire-and-forget system daemons
#[async_trait::async_trait]
pub trait ServiceLauncher: Send + Sync {
    /// Bring up the configured services. Never fails.
    async fn bring_up(&self, config: &ServicesConfig);
}

/// Real launcher for dbus-daemon and avahi-daemon
#[derive(Debug, Default)]
pub struct SystemServices;

impl SystemServices {
    pub fn new() -> Self {
        Self
    }

    async fn dbus_running() -> bool {
        Command::new("pgrep")
            .arg("dbus-daemon")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn start_message_bus(runtime_dir: &Path) {
        if let Err(e) = std::fs::create_dir_all(runtime_dir) {
            tracing::error!("Failed to create {:?}: {}", runtime_dir, e);
            return;
        }

        if Self::dbus_running().await {
            tracing::info!("dbus-daemon already running");
            return;
        }

        let pid_path = runtime_dir.join("pid");
        if pid_path.exists() {
            tracing::warn!("Removing stale {:?}", pid_path);
            if let Err(e) = std::fs::remove_file(&pid_path) {
                tracing::warn!("Failed to remove stale pid file: {}", e);
            }
        }

        let Ok(binary) = which::which("dbus-daemon") else {
            tracing::error!("dbus-daemon not found in PATH");
            return;
        };

        // dbus-daemon forks into the background itself
        match Command::new(binary).arg("--system").status().await {
            Ok(status) if status.success() => tracing::info!("Started dbus-daemon"),
            Ok(status) => tracing::error!("dbus-daemon exited with {:?}", status.code()),
            Err(e) => tracing::error!("Error while starting dbus-daemon: {}", e),
        }
    }

    fn start_discovery() {
        let Ok(binary) = which::which("avahi-daemon") else {
            tracing::error!("avahi-daemon not found in PATH");
            return;
        };

        // Not awaited: the daemon lives for the container's lifetime
        match Command::new(binary)
            .arg("--no-chroot")
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => tracing::info!("Started avahi-daemon (pid {:?})", child.id()),
            Err(e) => tracing::error!("Error while starting avahi-daemon: {}", e),
        }
    }
}

#[async_trait::async_trait]
impl ServiceLauncher for SystemServices {
    async fn bring_up(&self, config: &ServicesConfig) {
        if !config.enabled {
            tracing::debug!("System services disabled");
            return;
        }
        if config.dbus {
            Self::start_message_bus(&config.dbus_runtime_dir).await;
        }
        if config.avahi {
            Self::start_discovery();
        }
    }
}

/// Copy `default` to `target` unless `target` already exists.
///
/// Returns true when a copy was made.
pub fn stage_config(target: &Path, default: &Path) -> std::io::Result<bool> {
    if target.exists() {
        tracing::debug!("Using existing hub config {:?}", target);
        return Ok(false);
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(default, target)?;
    tracing::info!("Copied default config {:?} to {:?}", default, target);
    Ok(true)
}

/// Create missing named pipes. Returns the paths that were created.
pub fn ensure_fifos(paths: &[PathBuf]) -> Vec<PathBuf> {
    use nix::sys::stat::Mode;

    let mut created = Vec::new();
    for path in paths {
        if path.exists() {
            tracing::debug!("Pipe {:?} already exists", path);
            continue;
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create {:?}: {}", parent, e);
                continue;
            }
        }
        match nix::unistd::mkfifo(path.as_path(), Mode::from_bits_truncate(0o666)) {
            Ok(()) => {
                tracing::info!("Created pipe {:?}", path);
                created.push(path.clone());
            }
            Err(e) => tracing::error!("Failed to create pipe {:?}: {}", path, e),
        }
    }
    created
}
