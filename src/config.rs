//! Configuration loading and types for roleboot
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (/etc/roleboot/config.toml or --config)
//! 3. Container environment (ROLE, HOST, SOUND_BACKEND, ...)
//! 4. CLI arguments (highest priority)
//!
//! The environment is read exactly once, through a lookup closure handed to
//! [`load_config`]. Everything downstream receives the finished [`Config`].

use crate::error::RolebootError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default location of the optional config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/roleboot/config.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# roleboot configuration
#
# Location: /etc/roleboot/config.toml
# Every value can also be set through the container environment
# (ROLE, HOST, SOUND_BACKEND, DEVICE_NAME, CLIENT_ID, LOOPBACK_NUMBER, ...)

# Topology to run: "server", "client", "ledfx_client" or "ledfx"
role = "server"

# Hub address for clients. Leave unset to use discovery.
# host = "192.168.1.10"

# PulseAudio socket; its presence selects the pulse backend
session_socket = "/run/user/1000/pulse/native"

# Extra flags passed through to the hub or client
extra_args = []

[player]
binary = "/usr/bin/snapclient"
# backend = "alsa"          # alsa, pulse or pipewire; unset = auto-detect
# options = "buffer_time=100"
# device = "USB Audio"      # description substring or explicit hw:/plughw: id
# client_id = "kitchen"

[hub]
binary = "/usr/bin/snapserver"
config_path = "/config/snapserver.conf"
default_config = "/etc/snapserver.conf"
pipes = ["/tmp/snapfifo"]

[loopback]
index = 10
sample_rate = 44100
format = "S16_LE"
channels = 2
bridge_config_path = "/etc/asound.conf"
settle_ms = 1000
proc_root = "/proc/asound"
readiness_attempts = 20
readiness_interval_ms = 500

[visualizer]
binary = "/ledfx/venv/bin/ledfx"
working_dir = "/ledfx"
venv = "/ledfx/venv"
host = "0.0.0.0"
port = 8888
client_id_suffix = "-ledfx"

[supervisor]
cooldown_secs = 5
backoff_multiplier = 1.0
max_cooldown_secs = 300
# max_restarts = 10         # unset = restart forever
teardown_timeout_secs = 10

[services]
enabled = true
dbus = true
avahi = true
dbus_runtime_dir = "/run/dbus"
"#;

/// Runtime topology, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Audio distribution hub (snapserver)
    #[default]
    Hub,
    /// Playback endpoint (snapclient)
    Endpoint,
    /// Playback endpoint feeding a visualizer through a loopback card
    EndpointWithVisualizer,
    /// Visualizer alone
    Visualizer,
}

impl Role {
    /// Canonical ROLE value
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hub => "server",
            Role::Endpoint => "client",
            Role::EndpointWithVisualizer => "ledfx_client",
            Role::Visualizer => "ledfx",
        }
    }
}

impl FromStr for Role {
    type Err = RolebootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role = s.trim().to_lowercase();
        let visual = role.contains("ledfx") || role.contains("visual");
        let client = role.contains("client") || role.contains("endpoint");

        match role.as_str() {
            "server" | "hub" => Ok(Role::Hub),
            "client" | "endpoint" => Ok(Role::Endpoint),
            _ if visual && client => Ok(Role::EndpointWithVisualizer),
            _ if visual => Ok(Role::Visualizer),
            _ => Err(RolebootError::Config(format!(
                "Invalid ROLE '{}'. Expected server, client, ledfx_client or ledfx",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = RolebootError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub role: Role,

    /// Hub address; None means the client falls back to discovery
    #[serde(default)]
    pub host: Option<String>,

    /// Session mixer socket whose presence selects the pulse backend
    #[serde(default = "default_session_socket")]
    pub session_socket: PathBuf,

    /// Passthrough flags for the hub or client (EXTRA_ARGS)
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub loopback: LoopbackConfig,

    #[serde(default)]
    pub visualizer: VisualizerConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    /// PATH inherited from the container, prefixed for the visualizer venv
    #[serde(skip)]
    pub inherited_path: Option<String>,
}

/// Playback client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub binary: PathBuf,

    /// Backend name: alsa, pulse or pipewire (None = auto-detect)
    pub backend: Option<String>,

    /// Raw key=value,... options appended to the player flag
    pub options: Option<String>,

    /// Device hint: a description substring or an explicit hw:/plughw: id
    pub device: Option<String>,

    /// Client identity (--hostID)
    pub client_id: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/snapclient"),
            backend: None,
            options: None,
            device: None,
            client_id: None,
        }
    }
}

/// Distribution hub configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    pub binary: PathBuf,

    /// Where the hub reads its config from (staged on first start)
    pub config_path: PathBuf,

    /// Packaged default copied to `config_path` when absent
    pub default_config: PathBuf,

    /// Named pipes created for local audio input
    pub pipes: Vec<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/snapserver"),
            config_path: PathBuf::from("/config/snapserver.conf"),
            default_config: PathBuf::from("/etc/snapserver.conf"),
            pipes: vec![PathBuf::from("/tmp/snapfifo")],
        }
    }
}

/// Virtual loopback card and bridge configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// ALSA card index for snd-aloop
    pub index: u32,

    pub sample_rate: u32,

    /// ALSA sample format name (S16_LE = 16-bit little endian)
    pub format: String,

    pub channels: u32,

    /// Global ALSA config that redirects the default device
    pub bridge_config_path: PathBuf,

    /// Pause after loading the module before re-checking (ms)
    pub settle_ms: u64,

    /// Root of the kernel's ALSA procfs tree
    pub proc_root: PathBuf,

    pub readiness_attempts: u32,

    pub readiness_interval_ms: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            index: 10,
            sample_rate: 44100,
            format: "S16_LE".to_string(),
            channels: 2,
            bridge_config_path: PathBuf::from("/etc/asound.conf"),
            settle_ms: 1000,
            proc_root: PathBuf::from("/proc/asound"),
            readiness_attempts: 20,
            readiness_interval_ms: 500,
        }
    }
}

/// Visualizer process configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub binary: PathBuf,

    pub working_dir: Option<PathBuf>,

    /// Python virtualenv the visualizer lives in; exported as VIRTUAL_ENV
    pub venv: Option<PathBuf>,

    pub host: String,

    pub port: u16,

    /// Appended to CLIENT_ID for the internal feeder client
    pub client_id_suffix: String,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/ledfx/venv/bin/ledfx"),
            working_dir: Some(PathBuf::from("/ledfx")),
            venv: Some(PathBuf::from("/ledfx/venv")),
            host: "0.0.0.0".to_string(),
            port: 8888,
            client_id_suffix: "-ledfx".to_string(),
        }
    }
}

/// Restart policy for the endpoint + visualizer pair
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub cooldown_secs: u64,

    /// Cool-down growth per consecutive restart (1.0 = constant)
    pub backoff_multiplier: f64,

    pub max_cooldown_secs: u64,

    /// None restarts forever
    pub max_restarts: Option<u32>,

    /// Grace period between SIGTERM and SIGKILL
    pub teardown_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5,
            backoff_multiplier: 1.0,
            max_cooldown_secs: 300,
            max_restarts: None,
            teardown_timeout_secs: 10,
        }
    }
}

/// Background system services
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub enabled: bool,
    pub dbus: bool,
    pub avahi: bool,
    pub dbus_runtime_dir: PathBuf,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dbus: true,
            avahi: true,
            dbus_runtime_dir: PathBuf::from("/run/dbus"),
        }
    }
}

fn default_session_socket() -> PathBuf {
    PathBuf::from("/run/user/1000/pulse/native")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::default(),
            host: None,
            session_socket: default_session_socket(),
            extra_args: vec![],
            player: PlayerConfig::default(),
            hub: HubConfig::default(),
            loopback: LoopbackConfig::default(),
            visualizer: VisualizerConfig::default(),
            supervisor: SupervisorConfig::default(),
            services: ServicesConfig::default(),
            inherited_path: None,
        }
    }
}

impl Config {
    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, RolebootError> {
        toml::to_string_pretty(self)
            .map_err(|e| RolebootError::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// Load configuration from file, then overlay the environment
///
/// `lookup` is consulted for environment variables; pass
/// `|k| std::env::var(k).ok()` at the process boundary.
pub fn load_config<F>(path: Option<&Path>, lookup: F) -> Result<Config, RolebootError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();

    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if config_path.exists() {
        tracing::debug!("Loading config from {:?}", config_path);
        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| RolebootError::Config(format!("Failed to read config: {}", e)))?;

        config = toml::from_str(&contents)
            .map_err(|e| RolebootError::Config(format!("Invalid config: {}", e)))?;
    } else if path.is_some() {
        return Err(RolebootError::Config(format!(
            "Config file not found: {:?}",
            config_path
        )));
    } else {
        tracing::debug!("Config file not found at {:?}, using defaults", config_path);
    }

    apply_env(&mut config, lookup)?;

    Ok(config)
}

/// Overlay container environment variables onto a config
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<(), RolebootError>
where
    F: Fn(&str) -> Option<String>,
{
    // Empty values count as unset, so `HOST=` in a compose file means discovery
    let get = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| lookup(*k))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    };

    if let Some(role) = get(&["ROLE"]) {
        config.role = role.parse()?;
    }
    if let Some(host) = get(&["HOST"]) {
        config.host = Some(host);
    }
    if let Some(backend) = get(&["SOUND_BACKEND", "PLAYER_BACKEND"]) {
        config.player.backend = Some(backend.to_lowercase());
    }
    if let Some(options) = get(&["PLAYER_OPTIONS"]) {
        config.player.options = Some(options);
    }
    if let Some(device) = get(&["DEVICE_NAME", "ALSA_DEVICE"]) {
        config.player.device = Some(device);
    }
    if let Some(client_id) = get(&["CLIENT_ID"]) {
        config.player.client_id = Some(client_id);
    }
    if let Some(index) = get(&["LOOPBACK_NUMBER", "LOOPBACK_INDEX"]) {
        config.loopback.index = index.parse().map_err(|_| {
            RolebootError::Config(format!("LOOPBACK_NUMBER must be a card index, got '{}'", index))
        })?;
    }
    if let Some(extra) = get(&["EXTRA_ARGS"]) {
        config.extra_args = extra.split_whitespace().map(String::from).collect();
    }
    if let Some(socket) = get(&["PULSE_SERVER"]) {
        let socket = socket.strip_prefix("unix:").unwrap_or(&socket);
        config.session_socket = PathBuf::from(socket);
    }
    if let Some(path) = get(&["PATH"]) {
        config.inherited_path = Some(path);
    }

    Ok(())
}
