//! End-to-end role tests against fake audio hosts and real child processes
//!
//! The audio layer is faked so these run without ALSA, kernel modules or
//! root. Supervisor tests spawn `sh` and `sleep` to exercise real signals.

use roleboot::command::CommandVector;
use roleboot::config::{self, Config, Role, ServicesConfig};
use roleboot::devices::AudioHost;
use roleboot::error::{RolebootError, SupervisorError};
use roleboot::orchestrator::{Orchestrator, TerminalAction};
use roleboot::services::ServiceLauncher;
use roleboot::state::GroupState;
use roleboot::supervisor::{GroupSupervisor, OsLauncher, PairCommands, RestartPolicy};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const NO_CARDS: &str = "**** List of PLAYBACK Hardware Devices ****\n";

/// Audio host whose loopback appears once loaded
struct LoopbackHost {
    hardware: Mutex<String>,
    loads: AtomicUsize,
}

impl LoopbackHost {
    fn new() -> Self {
        Self {
            hardware: Mutex::new(NO_CARDS.to_string()),
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl AudioHost for LoopbackHost {
    async fn list_pcms(&self) -> std::io::Result<String> {
        Ok("default\n    Default Audio Device\n".to_string())
    }

    async fn list_hardware(&self) -> std::io::Result<String> {
        Ok(self.hardware.lock().unwrap().clone())
    }

    async fn load_loopback(&self, index: u32) -> Result<(), String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut hw = self.hardware.lock().unwrap();
        hw.push_str(&format!(
            "card {i}: Loopback [Loopback], device 0: Loopback PCM [Loopback PCM]\n\
             card {i}: Loopback [Loopback], device 1: Loopback PCM [Loopback PCM]\n",
            i = index
        ));
        Ok(())
    }
}

struct NoServices;

#[async_trait::async_trait]
impl ServiceLauncher for NoServices {
    async fn bring_up(&self, _config: &ServicesConfig) {}
}

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

/// Config rooted in a temp dir, then overlaid with `vars`
fn config_in(dir: &Path, vars: &[(&str, &str)]) -> Config {
    let file = dir.join("roleboot.toml");
    let toml = format!(
        r#"
session_socket = "{d}/pulse/native"

[hub]
config_path = "{d}/config/snapserver.conf"
default_config = "{d}/etc/snapserver.conf"
pipes = ["{d}/tmp/snapfifo"]

[loopback]
bridge_config_path = "{d}/etc/asound.conf"
proc_root = "{d}/proc/asound"
settle_ms = 0

[services]
enabled = false
"#,
        d = dir.display()
    );
    std::fs::write(&file, toml).unwrap();
    config::load_config(Some(&file), env(vars)).unwrap()
}

#[tokio::test]
async fn server_role_stages_config_and_hands_off() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("etc")).unwrap();
    std::fs::write(dir.path().join("etc/snapserver.conf"), "[stream]\n").unwrap();

    let config = config_in(dir.path(), &[("ROLE", "server"), ("EXTRA_ARGS", "--logging.sink stdout")]);
    let orch = Orchestrator::new(config, Arc::new(LoopbackHost::new()), Arc::new(NoServices));

    let TerminalAction::HandOff(cmd) = orch.dispatch().await.unwrap() else {
        panic!("server must hand off");
    };

    let staged = dir.path().join("config/snapserver.conf");
    assert_eq!(std::fs::read_to_string(&staged).unwrap(), "[stream]\n");
    assert_eq!(
        cmd.args,
        vec![
            "-c".to_string(),
            staged.display().to_string(),
            "--logging.sink".to_string(),
            "stdout".to_string()
        ]
    );
    assert!(dir.path().join("tmp/snapfifo").exists());
}

#[tokio::test]
async fn visualizer_role_bridges_loopback_then_supervises() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = config_in(
        dir.path(),
        &[("ROLE", "ledfx_client"), ("LOOPBACK_NUMBER", "10"), ("HOST", "hub")],
    );
    let host = Arc::new(LoopbackHost::new());
    let orch = Orchestrator::new(config, host.clone(), Arc::new(NoServices));

    let TerminalAction::Supervise(plan) = orch.dispatch().await.unwrap() else {
        panic!("ledfx_client must supervise");
    };
    assert_eq!(host.loads.load(Ordering::SeqCst), 1);

    let bridge = std::fs::read_to_string(dir.path().join("etc/asound.conf")).unwrap();
    assert!(bridge.contains("pcm \"hw:10,1\""));
    assert!(bridge.contains("rate 44100"));
    assert!(bridge.contains("format S16_LE"));
    assert!(bridge.contains("channels 2"));

    let commands = plan.commands();
    assert_eq!(commands.primary.count_flag("--soundcard"), 1);
    assert!(commands
        .primary
        .args
        .windows(2)
        .any(|w| w == ["--soundcard", "hw:10,0"]));
    assert_eq!(commands.primary.args.last().map(String::as_str), Some("hub"));
    assert!(commands.secondary.argv()[0].ends_with("ledfx"));

    // Second start with the card already loaded
    let config = config_in(dir.path(), &[("ROLE", "ledfx_client"), ("LOOPBACK_NUMBER", "10")]);
    let orch = Orchestrator::new(config, host.clone(), Arc::new(NoServices));
    orch.dispatch().await.unwrap();
    assert_eq!(host.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("empty.toml");
    std::fs::write(&file, "").unwrap();

    let err = config::load_config(Some(&file), env(&[("ROLE", "karaoke")])).unwrap_err();
    assert!(matches!(err, RolebootError::Config(_)));
    assert_eq!(Role::default(), Role::Hub);
}

fn sh(script: &str) -> CommandVector {
    CommandVector::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

fn quick_policy(max_restarts: Option<u32>) -> RestartPolicy {
    RestartPolicy {
        cooldown: Duration::from_millis(50),
        max_restarts,
        teardown_timeout: Duration::from_secs(2),
        ..RestartPolicy::default()
    }
}

#[tokio::test]
async fn supervisor_tears_down_survivor_when_primary_exits() {
    let factory = Box::new(|| PairCommands {
        primary: sh("exit 3"),
        secondary: sh("exec sleep 30"),
    });
    let mut group = GroupSupervisor::new(Arc::new(OsLauncher::new()), factory, quick_policy(Some(0)));

    let started = Instant::now();
    let err = group.run(std::future::pending::<()>()).await.unwrap_err();

    assert!(matches!(err, SupervisorError::RestartLimit(0)));
    assert!(matches!(group.state(), GroupState::Terminated));
    // The sleeping secondary was signalled, not waited out
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn supervisor_restarts_until_interrupted() {
    let factory = Box::new(|| PairCommands {
        primary: sh("exec sleep 30"),
        secondary: sh("exit 1"),
    });
    let mut group = GroupSupervisor::new(Arc::new(OsLauncher::new()), factory, quick_policy(None));

    let report = group
        .run(tokio::time::sleep(Duration::from_millis(700)))
        .await
        .unwrap();

    assert!(report.restarts >= 1);
    assert!(matches!(group.state(), GroupState::Terminated));
}

#[tokio::test]
async fn supervisor_reports_spawn_failure() {
    let factory = Box::new(|| PairCommands {
        primary: CommandVector::new("/nonexistent/roleboot-client", vec![]),
        secondary: sh("exit 0"),
    });
    let mut group = GroupSupervisor::new(Arc::new(OsLauncher::new()), factory, quick_policy(None));

    let err = group.run(std::future::pending::<()>()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn { .. }));
}
