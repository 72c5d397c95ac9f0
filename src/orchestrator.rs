//! Role orchestration
//!
//! Maps the configured [`Role`] onto a process topology:
//!
//! | Role                     | Preparation                        | Terminal action        |
//! |--------------------------|------------------------------------|------------------------|
//! | `Hub`                    | stage config, pipes, services      | hand off to snapserver |
//! | `Endpoint`               | services, resolve backend          | hand off to snapclient |
//! | `EndpointWithVisualizer` | services, loopback, bridge config  | supervise client+ledfx |
//! | `Visualizer`             | services                           | hand off to ledfx      |
//!
//! A hand-off replaces the roleboot process image, so whatever the hub or
//! client exits with becomes the container's exit status. Supervision keeps
//! roleboot alive as the parent of both processes.

use crate::backend::{self, AudioBackend, BackendKind, BackendRequest};
use crate::command::{self, ClientRequest, CommandVector};
use crate::config::{Config, Role};
use crate::devices::AudioHost;
use crate::error::{RolebootError, Result};
use crate::loopback::{self, BridgeConfig, PLAYBACK_SUBDEVICE};
use crate::services::{self, ServiceLauncher};
use crate::supervisor::{GroupSupervisor, PairCommands, ProcessLauncher, ReadinessGate, RestartPolicy};
use std::sync::Arc;
use std::time::Duration;

/// What the orchestrator does once preparation is finished
#[derive(Debug)]
pub enum TerminalAction {
    /// Replace this process with the command; never supervised
    HandOff(CommandVector),
    /// Stay resident and supervise a process pair
    Supervise(GroupPlan),
}

impl TerminalAction {
    /// JSON description for `roleboot plan --json`
    pub fn summary(&self) -> serde_json::Value {
        match self {
            TerminalAction::HandOff(command) => serde_json::json!({
                "action": "hand_off",
                "command": command,
            }),
            TerminalAction::Supervise(plan) => {
                let commands = plan.commands();
                serde_json::json!({
                    "action": "supervise",
                    "backend": plan.backend,
                    "primary": commands.primary,
                    "secondary": commands.secondary,
                    "readiness_card": plan.readiness.as_ref().map(|g| g.card),
                    "cooldown_secs": plan.policy.cooldown.as_secs_f64(),
                    "max_restarts": plan.policy.max_restarts,
                })
            }
        }
    }
}

impl std::fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalAction::HandOff(command) => write!(f, "hand off: {}", command),
            TerminalAction::Supervise(plan) => {
                let commands = plan.commands();
                write!(
                    f,
                    "supervise:\n  primary:   {}\n  secondary: {}",
                    commands.primary, commands.secondary
                )
            }
        }
    }
}

/// Everything needed to (re)build and supervise the client + visualizer pair
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub config: Arc<Config>,
    /// Backend of the internal feeder client
    pub backend: AudioBackend,
    pub readiness: Option<ReadinessGate>,
    pub policy: RestartPolicy,
}

impl GroupPlan {
    /// Build fresh command vectors for one launch attempt
    pub fn commands(&self) -> PairCommands {
        build_pair(&self.config, &self.backend)
    }

    pub fn into_supervisor(self, launcher: Arc<dyn ProcessLauncher>) -> GroupSupervisor {
        let readiness = self.readiness.clone();
        let policy = self.policy.clone();
        let supervisor = GroupSupervisor::new(launcher, Box::new(move || self.commands()), policy);
        match readiness {
            Some(gate) => supervisor.with_readiness(gate),
            None => supervisor,
        }
    }
}

/// Client feeding the loopback plus the visualizer reading from it
pub fn build_pair(config: &Config, backend: &AudioBackend) -> PairCommands {
    let primary = command::build_client_command(
        &config.player.binary,
        &ClientRequest {
            role: Role::EndpointWithVisualizer,
            backend,
            host: config.host.as_deref(),
            client_id: config.player.client_id.as_deref(),
            client_id_suffix: &config.visualizer.client_id_suffix,
            extra_args: &config.extra_args,
        },
    );
    let secondary =
        command::build_visualizer_command(&config.visualizer, config.inherited_path.as_deref());

    PairCommands { primary, secondary }
}

/// Drives preparation and picks the terminal action for the configured role
pub struct Orchestrator {
    config: Arc<Config>,
    host: Arc<dyn AudioHost>,
    services: Arc<dyn ServiceLauncher>,
}

impl Orchestrator {
    pub fn new(config: Config, host: Arc<dyn AudioHost>, services: Arc<dyn ServiceLauncher>) -> Self {
        Self {
            config: Arc::new(config),
            host,
            services,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn resolve_backend(&self) -> AudioBackend {
        let player = &self.config.player;
        let request = BackendRequest {
            explicit: player.backend.as_deref(),
            device_hint: player.device.as_deref(),
            options: player.options.as_deref(),
            session_socket_present: self.config.session_socket.exists(),
        };
        backend::resolve(&request, self.host.as_ref()).await
    }

    /// The feeder client always writes raw to the loopback's playback side
    fn feeder_backend(&self) -> AudioBackend {
        AudioBackend::new(BackendKind::RawHardware)
            .with_options(self.config.player.options.clone())
            .with_device(loopback::loopback_device(
                self.config.loopback.index,
                PLAYBACK_SUBDEVICE,
            ))
    }

    fn group_plan(&self) -> GroupPlan {
        let lb = &self.config.loopback;
        GroupPlan {
            config: self.config.clone(),
            backend: self.feeder_backend(),
            readiness: Some(ReadinessGate {
                proc_root: lb.proc_root.clone(),
                card: lb.index,
                attempts: lb.readiness_attempts,
                interval: Duration::from_millis(lb.readiness_interval_ms),
            }),
            policy: RestartPolicy::from(&self.config.supervisor),
        }
    }

    /// Resolve the terminal action without preparing anything
    pub async fn plan(&self) -> TerminalAction {
        let config = &self.config;
        match config.role {
            Role::Hub => TerminalAction::HandOff(command::build_hub_command(
                &config.hub,
                &config.extra_args,
            )),
            Role::Endpoint => {
                let backend = self.resolve_backend().await;
                TerminalAction::HandOff(command::build_client_command(
                    &config.player.binary,
                    &ClientRequest {
                        role: Role::Endpoint,
                        backend: &backend,
                        host: config.host.as_deref(),
                        client_id: config.player.client_id.as_deref(),
                        client_id_suffix: &config.visualizer.client_id_suffix,
                        extra_args: &config.extra_args,
                    },
                ))
            }
            Role::EndpointWithVisualizer => TerminalAction::Supervise(self.group_plan()),
            Role::Visualizer => TerminalAction::HandOff(command::build_visualizer_command(
                &config.visualizer,
                config.inherited_path.as_deref(),
            )),
        }
    }

    fn prepare_hub(&self) {
        let hub = &self.config.hub;
        if let Err(e) = services::stage_config(&hub.config_path, &hub.default_config) {
            tracing::error!(
                "Failed to stage {:?} from {:?}: {}",
                hub.config_path,
                hub.default_config,
                e
            );
        }
        services::ensure_fifos(&hub.pipes);
    }

    async fn prepare_bridge(&self) -> Result<()> {
        let lb = &self.config.loopback;
        loopback::ensure_loopback(
            self.host.as_ref(),
            lb.index,
            Duration::from_millis(lb.settle_ms),
        )
        .await?;

        let bridge = BridgeConfig::capture_side(lb.index, lb.sample_rate, &lb.format, lb.channels);
        loopback::write_bridge_config(&lb.bridge_config_path, &bridge)?;
        Ok(())
    }

    /// Prepare the host for the configured role and return the terminal action
    pub async fn dispatch(&self) -> Result<TerminalAction> {
        let role = self.config.role;
        tracing::info!("Starting role: {}", role);

        if role == Role::Hub {
            self.prepare_hub();
        }

        self.services.bring_up(&self.config.services).await;

        if role == Role::EndpointWithVisualizer {
            self.prepare_bridge().await?;
        }

        let action = self.plan().await;
        tracing::info!("Terminal action: {}", action);
        Ok(action)
    }
}

/// Replace the current process image with `command`.
///
/// Only returns if exec failed.
pub fn hand_off(command: &CommandVector) -> RolebootError {
    use std::os::unix::process::CommandExt;

    tracing::info!("Handing off to: {}", command);
    let err = command.to_std_command().exec();
    RolebootError::Launch(format!("exec {:?} failed: {}", command.program, err))
}
