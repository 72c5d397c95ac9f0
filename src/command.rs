//! Command vectors for the hub, client and visualizer processes
//!
//! A [`CommandVector`] is built fresh for every launch and never mutated
//! afterwards. Passthrough args from EXTRA_ARGS are filtered so they cannot
//! override flags the builder sets itself.

use crate::backend::AudioBackend;
use crate::config::{HubConfig, Role, VisualizerConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Program, arguments and launch environment for one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandVector {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dir: Option<PathBuf>,
}

impl CommandVector {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Number of times `flag` appears as its own token or as `flag=...`
    pub fn count_flag(&self, flag: &str) -> usize {
        self.args
            .iter()
            .filter(|a| *a == flag || a.starts_with(&format!("{}=", flag)))
            .count()
    }

    /// Blocking std command, used for exec hand-off
    pub fn to_std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Async tokio command, used by the supervisor
    pub fn to_tokio_command(&self) -> tokio::process::Command {
        tokio::process::Command::from(self.to_std_command())
    }
}

impl std::fmt::Display for CommandVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// Flags always set by the builder (player and the legacy sound flag)
const ALWAYS_CONTROLLED: &[&str] = &["--player", "--sound"];

/// Target flags, controlled when the builder emits a host
const TARGET_FLAGS: &[&str] = &["-h", "--host"];

/// Port flags, controlled when the target is a URI carrying its own port
const PORT_FLAGS: &[&str] = &["-p", "--port"];

/// Device flags, controlled when the builder picks a device
const DEVICE_FLAGS: &[&str] = &["--soundcard", "-s"];

/// Identity flag, controlled when a client id is configured
const IDENTITY_FLAGS: &[&str] = &["--hostID"];

/// Drop passthrough args that collide with `controlled` flags.
///
/// Handles both `--flag value` and `--flag=value`. Positional server URIs
/// (`tcp://...`) are dropped only when `owns_target` is set.
pub fn filter_extra_args(extra: &[String], controlled: &[&str], owns_target: bool) -> Vec<String> {
    let mut kept = Vec::with_capacity(extra.len());
    let mut iter = extra.iter().peekable();

    while let Some(arg) = iter.next() {
        let (flag, has_inline_value) = match arg.split_once('=') {
            Some((flag, _)) if flag.starts_with('-') => (flag, true),
            _ => (arg.as_str(), false),
        };

        if controlled.contains(&flag) {
            tracing::warn!("Ignoring passthrough '{}': roleboot sets {} itself", arg, flag);
            if !has_inline_value && iter.peek().is_some_and(|next| !next.starts_with('-')) {
                iter.next();
            }
            continue;
        }

        if owns_target && !arg.starts_with('-') && arg.contains("://") {
            tracing::warn!("Ignoring passthrough server URI '{}'", arg);
            continue;
        }

        kept.push(arg.clone());
    }

    kept
}

/// Inputs for [`build_client_command`]
#[derive(Debug, Clone)]
pub struct ClientRequest<'a> {
    pub role: Role,
    pub backend: &'a AudioBackend,
    /// Hub host or URI; None lets the client discover it
    pub host: Option<&'a str>,
    pub client_id: Option<&'a str>,
    /// Appended to the client id in the visualizer topology
    pub client_id_suffix: &'a str,
    pub extra_args: &'a [String],
}

/// Build the playback client's command vector
pub fn build_client_command(binary: &Path, request: &ClientRequest<'_>) -> CommandVector {
    let backend = request.backend;
    let mut args = Vec::new();

    args.push("--player".to_string());
    args.push(match backend.options {
        Some(ref options) => format!("{}:{}", backend.kind.player_name(), options),
        None => backend.kind.player_name().to_string(),
    });

    let mut controlled: Vec<&str> = ALWAYS_CONTROLLED.to_vec();

    if let Some(ref device) = backend.device {
        args.push("--soundcard".to_string());
        args.push(device.clone());
        controlled.extend_from_slice(DEVICE_FLAGS);
    }

    if let Some(id) = request.client_id.filter(|id| !id.is_empty()) {
        let id = match request.role {
            Role::EndpointWithVisualizer => format!("{}{}", id, request.client_id_suffix),
            _ => id.to_string(),
        };
        tracing::info!("Using client id: {}", id);
        args.push("--hostID".to_string());
        args.push(id);
        controlled.extend_from_slice(IDENTITY_FLAGS);
    }

    let host = request.host.filter(|h| !h.is_empty());
    if let Some(host) = host {
        controlled.extend_from_slice(TARGET_FLAGS);
        if host.contains("://") {
            controlled.extend_from_slice(PORT_FLAGS);
        }
    }

    args.extend(filter_extra_args(request.extra_args, &controlled, host.is_some()));

    match host {
        Some(host) if host.contains("://") => args.push(host.to_string()),
        Some(host) => {
            args.push("-h".to_string());
            args.push(host.to_string());
        }
        None => tracing::info!("No HOST set, client will use discovery"),
    }

    CommandVector::new(binary, args)
}

/// Build the hub's command vector
pub fn build_hub_command(hub: &HubConfig, extra_args: &[String]) -> CommandVector {
    let mut args = vec!["-c".to_string(), hub.config_path.display().to_string()];
    args.extend(filter_extra_args(extra_args, &["-c", "--config"], false));
    CommandVector::new(&hub.binary, args)
}

/// Build the visualizer's command vector
///
/// `inherited_path` is the orchestrator's PATH; the venv's bin directory is
/// prepended to it.
pub fn build_visualizer_command(
    visualizer: &VisualizerConfig,
    inherited_path: Option<&str>,
) -> CommandVector {
    let args = vec![
        "--host".to_string(),
        visualizer.host.clone(),
        "--port".to_string(),
        visualizer.port.to_string(),
    ];
    let mut cmd = CommandVector::new(&visualizer.binary, args);

    if let Some(ref venv) = visualizer.venv {
        let bin = venv.join("bin").display().to_string();
        let path = match inherited_path.filter(|p| !p.is_empty()) {
            Some(path) => format!("{}:{}", bin, path),
            None => bin,
        };
        cmd.env.push(("VIRTUAL_ENV".to_string(), venv.display().to_string()));
        cmd.env.push(("PATH".to_string(), path));
    }
    cmd.current_dir = visualizer.working_dir.clone();

    cmd
}
