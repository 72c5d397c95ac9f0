//! Process group supervisor
//!
//! Keeps a primary/secondary pair (endpoint client + visualizer) alive as a
//! unit. Whenever either member exits, for any reason, both are torn down and
//! relaunched after a cool-down. An interrupt tears both down and stops.
//!
//! ```text
//!   Idle ──▶ Starting ──▶ Running ──(any exit)──▶ Restarting ──▶ Starting
//!               │            │                        │
//!               └────────────┴──────(interrupt)───────┴──▶ Terminated
//! ```
//!
//! Launch order within `Starting` is primary, optional readiness wait,
//! secondary. The secondary is never launched before the primary's launch
//! call has returned.

use crate::command::CommandVector;
use crate::error::SupervisorError;
use crate::readiness;
use crate::state::GroupState;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a member process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl std::fmt::Display for MemberExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// A launched member of the group
#[async_trait::async_trait]
pub trait GroupMember: Send {
    /// OS process id, if any
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Must be cancel-safe.
    async fn wait(&mut self) -> std::io::Result<MemberExit>;

    /// Stop the process and reap it. SIGTERM first, SIGKILL after `grace`.
    /// A no-op for members that already exited.
    async fn terminate(&mut self, grace: Duration);
}

/// Spawns group members
#[async_trait::async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, command: &CommandVector) -> Result<Box<dyn GroupMember>, SupervisorError>;
}

/// Launcher backed by real OS processes
#[derive(Debug, Default)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for OsLauncher {
    async fn launch(&self, command: &CommandVector) -> Result<Box<dyn GroupMember>, SupervisorError> {
        tracing::info!("Launching: {}", command);

        let child = command
            .to_tokio_command()
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        Ok(Box::new(OsMember {
            name: command.program.display().to_string(),
            child,
            exited: None,
        }))
    }
}

/// A real child process
pub struct OsMember {
    name: String,
    child: tokio::process::Child,
    exited: Option<MemberExit>,
}

impl OsMember {
    fn record(&mut self, status: std::process::ExitStatus) -> MemberExit {
        use std::os::unix::process::ExitStatusExt;

        let exit = MemberExit {
            code: status.code(),
            signal: status.signal(),
        };
        self.exited = Some(exit);
        exit
    }
}

#[async_trait::async_trait]
impl GroupMember for OsMember {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<MemberExit> {
        if let Some(exit) = self.exited {
            return Ok(exit);
        }
        let status = self.child.wait().await?;
        Ok(self.record(status))
    }

    async fn terminate(&mut self, grace: Duration) {
        if self.exited.is_some() {
            return;
        }

        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            tracing::debug!("Sending SIGTERM to {} (pid {})", self.name, pid);
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!("Failed to signal {}: {}", self.name, e);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                let exit = self.record(status);
                tracing::debug!("{} stopped ({})", self.name, exit);
            }
            Ok(Err(e)) => tracing::warn!("Failed to reap {}: {}", self.name, e),
            Err(_) => {
                tracing::warn!(
                    "{} ignored SIGTERM for {:.0}s, killing",
                    self.name,
                    grace.as_secs_f32()
                );
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to kill {}: {}", self.name, e);
                }
                self.exited = Some(MemberExit::default());
            }
        }
    }
}

/// Restart timing for the pair
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Delay before the first restart
    pub cooldown: Duration,
    /// Growth factor per restart (1.0 keeps the delay constant)
    pub backoff_multiplier: f64,
    pub max_cooldown: Duration,
    /// None restarts forever
    pub max_restarts: Option<u32>,
    /// SIGTERM → SIGKILL grace period during teardown
    pub teardown_timeout: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            max_cooldown: Duration::from_secs(300),
            max_restarts: None,
            teardown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&crate::config::SupervisorConfig> for RestartPolicy {
    fn from(config: &crate::config::SupervisorConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(config.cooldown_secs),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
            max_cooldown: Duration::from_secs(config.max_cooldown_secs),
            max_restarts: config.max_restarts,
            teardown_timeout: Duration::from_secs(config.teardown_timeout_secs),
        }
    }
}

impl RestartPolicy {
    /// Cool-down before restart number `restart` (1-based)
    ///
    /// Multipliers below 1.0 or non-finite are treated as 1.0.
    pub fn cooldown_for(&self, restart: u32) -> Duration {
        let multiplier = match self.backoff_multiplier {
            m if m.is_finite() && m >= 1.0 => m,
            _ => 1.0,
        };
        let exponent = restart.saturating_sub(1).min(64) as i32;
        let secs = self.cooldown.as_secs_f64() * multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(self.max_cooldown))
            .unwrap_or(self.max_cooldown)
    }
}

/// Gate between launching the primary and the secondary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessGate {
    pub proc_root: PathBuf,
    pub card: u32,
    pub attempts: u32,
    pub interval: Duration,
}

/// The two command vectors for one launch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCommands {
    pub primary: CommandVector,
    pub secondary: CommandVector,
}

/// Builds fresh commands for every launch attempt
pub type CommandFactory = Box<dyn Fn() -> PairCommands + Send + Sync>;

/// Summary returned when the supervisor stops on interrupt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub restarts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Primary,
    Secondary,
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Member::Primary => write!(f, "primary"),
            Member::Secondary => write!(f, "secondary"),
        }
    }
}

enum Wake {
    Exited(Member, std::io::Result<MemberExit>),
    Interrupted,
}

/// Supervises a primary/secondary process pair
pub struct GroupSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    factory: CommandFactory,
    readiness: Option<ReadinessGate>,
    policy: RestartPolicy,
    state: GroupState,
    restarts: u32,
}

impl GroupSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, factory: CommandFactory, policy: RestartPolicy) -> Self {
        Self {
            launcher,
            factory,
            readiness: None,
            policy,
            state: GroupState::Idle,
            restarts: 0,
        }
    }

    /// Wait for audio on a loopback card before launching the secondary
    pub fn with_readiness(mut self, gate: ReadinessGate) -> Self {
        self.readiness = Some(gate);
        self
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn transition(&mut self, next: GroupState) {
        tracing::debug!("Supervisor: {} -> {}", self.state, next);
        self.state = next;
    }

    async fn teardown(&self, primary: &mut dyn GroupMember, secondary: Option<&mut Box<dyn GroupMember>>) {
        let grace = self.policy.teardown_timeout;
        match secondary {
            Some(secondary) => {
                tokio::join!(primary.terminate(grace), secondary.terminate(grace));
            }
            None => primary.terminate(grace).await,
        }
    }

    /// Run until `shutdown` resolves or the restart limit is hit.
    ///
    /// Spawn failures are returned immediately after tearing down whatever
    /// was already running.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<SupervisorReport, SupervisorError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut attempt = 0u32;

        loop {
            self.transition(GroupState::Starting { attempt });
            let commands = (self.factory)();

            let mut primary = match self.launcher.launch(&commands.primary).await {
                Ok(member) => member,
                Err(e) => {
                    self.transition(GroupState::Terminated);
                    return Err(e);
                }
            };

            let mut early_wake = None;
            if let Some(gate) = self.readiness.clone() {
                tokio::select! {
                    _ = readiness::wait_for_live(&gate.proc_root, gate.card, gate.attempts, gate.interval) => {}
                    res = primary.wait() => early_wake = Some(Wake::Exited(Member::Primary, res)),
                    _ = &mut shutdown => early_wake = Some(Wake::Interrupted),
                }
            }

            let mut secondary: Option<Box<dyn GroupMember>> = None;
            let wake = match early_wake {
                Some(wake) => wake,
                None => match self.launcher.launch(&commands.secondary).await {
                    Err(e) => {
                        self.teardown(primary.as_mut(), None).await;
                        self.transition(GroupState::Terminated);
                        return Err(e);
                    }
                    Ok(member) => {
                        let second = secondary.insert(member);
                        self.transition(GroupState::Running {
                            since: Instant::now(),
                            pids: (primary.id(), second.id()),
                        });
                        tracing::info!("Process group running");

                        tokio::select! {
                            res = primary.wait() => Wake::Exited(Member::Primary, res),
                            res = second.wait() => Wake::Exited(Member::Secondary, res),
                            _ = &mut shutdown => Wake::Interrupted,
                        }
                    }
                },
            };

            match wake {
                Wake::Interrupted => {
                    tracing::info!("Interrupted, stopping process group");
                    self.teardown(primary.as_mut(), secondary.as_mut()).await;
                    self.transition(GroupState::Terminated);
                    return Ok(SupervisorReport {
                        restarts: self.restarts,
                    });
                }
                Wake::Exited(member, res) => {
                    match res {
                        Ok(exit) => tracing::warn!("{} process exited ({}), restarting pair", member, exit),
                        Err(e) => tracing::warn!("Lost track of {} process ({}), restarting pair", member, e),
                    }
                    self.teardown(primary.as_mut(), secondary.as_mut()).await;
                }
            }

            self.restarts += 1;
            if let Some(max) = self.policy.max_restarts {
                if self.restarts > max {
                    tracing::error!("Restart limit of {} reached", max);
                    self.transition(GroupState::Terminated);
                    return Err(SupervisorError::RestartLimit(max));
                }
            }

            let cooldown = self.policy.cooldown_for(self.restarts);
            self.transition(GroupState::Restarting {
                attempt: self.restarts,
                cooldown,
            });
            tracing::info!(
                "Restart #{} in {:.1}s",
                self.restarts,
                cooldown.as_secs_f32()
            );

            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {}
                _ = &mut shutdown => {
                    tracing::info!("Interrupted during cool-down");
                    self.transition(GroupState::Terminated);
                    return Ok(SupervisorReport {
                        restarts: self.restarts,
                    });
                }
            }

            attempt += 1;
        }
    }
}

/// Install SIGINT/SIGTERM handlers; the returned future resolves on either
pub fn interrupt_signal() -> Result<impl Future<Output = ()>, SupervisorError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| SupervisorError::Signal(e.to_string()))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| SupervisorError::Signal(e.to_string()))?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    })
}
