//! ALSA device enumeration
//!
//! Wraps `aplay -L` (PCM names) and `aplay -l` (hardware playback devices)
//! and parses their output. The [`AudioHost`] trait is the seam between the
//! orchestrator and the OS audio layer; [`AlsaHost`] shells out to the real
//! tools.

use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

/// A PCM entry from `aplay -L`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmDevice {
    /// PCM name, e.g. `hw:CARD=Device,DEV=0`
    pub name: String,
    /// First description line, e.g. `USB Audio Device, USB Audio`
    pub description: String,
}

impl PcmDevice {
    /// Whether this entry addresses hardware directly (hw: or plughw:)
    pub fn is_hardware(&self) -> bool {
        self.name.starts_with("hw:") || self.name.starts_with("plughw:")
    }
}

/// A hardware playback device from `aplay -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareDevice {
    pub card: u32,
    pub card_id: String,
    pub card_name: String,
    pub device: u32,
    pub device_name: String,
}

impl HardwareDevice {
    /// Text searched for markers (card and device names)
    pub fn description(&self) -> String {
        format!("{} [{}], {}", self.card_id, self.card_name, self.device_name)
    }
}

/// OS audio layer operations needed by the orchestrator
#[async_trait::async_trait]
pub trait AudioHost: Send + Sync {
    /// Raw `aplay -L` output
    async fn list_pcms(&self) -> std::io::Result<String>;

    /// Raw `aplay -l` output
    async fn list_hardware(&self) -> std::io::Result<String>;

    /// Load the snd-aloop module at the given card index
    async fn load_loopback(&self, index: u32) -> Result<(), String>;
}

/// Real ALSA host using aplay and modprobe
#[derive(Debug, Default)]
pub struct AlsaHost;

impl AlsaHost {
    pub fn new() -> Self {
        Self
    }

    async fn aplay(flag: &str) -> std::io::Result<String> {
        let output = Command::new("aplay")
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(std::io::Error::other(format!(
                "aplay {} exited with {:?}: {}",
                flag,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl AudioHost for AlsaHost {
    async fn list_pcms(&self) -> std::io::Result<String> {
        Self::aplay("-L").await
    }

    async fn list_hardware(&self) -> std::io::Result<String> {
        Self::aplay("-l").await
    }

    async fn load_loopback(&self, index: u32) -> Result<(), String> {
        let output = Command::new("modprobe")
            .args(["snd-aloop", &format!("index={}", index)])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to run modprobe: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "modprobe exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ))
        }
    }
}

/// Parse `aplay -L` output
///
/// Names start at column 0; the first indented line after a name is its
/// description. Further indented lines are ignored.
pub fn parse_pcm_list(text: &str) -> Vec<PcmDevice> {
    let mut devices = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !line.starts_with(char::is_whitespace) {
            if let Some(name) = pending.take() {
                devices.push(PcmDevice {
                    name,
                    description: String::new(),
                });
            }
            pending = Some(line.trim().to_string());
        } else if let Some(name) = pending.take() {
            devices.push(PcmDevice {
                name,
                description: line.trim().to_string(),
            });
        }
    }

    if let Some(name) = pending {
        devices.push(PcmDevice {
            name,
            description: String::new(),
        });
    }

    devices
}

fn hardware_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^card (\d+): (\S+) \[(.*?)\], device (\d+): (.*?)(?: \[.*\])?$")
            .expect("hardware line regex is valid")
    })
}

/// Parse `aplay -l` output
pub fn parse_hardware_list(text: &str) -> Vec<HardwareDevice> {
    let re = hardware_line_regex();

    text.lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim_end())?;
            Some(HardwareDevice {
                card: caps[1].parse().ok()?,
                card_id: caps[2].to_string(),
                card_name: caps[3].to_string(),
                device: caps[4].parse().ok()?,
                device_name: caps[5].to_string(),
            })
        })
        .collect()
}

/// Find the first hw:/plughw: PCM whose description contains `hint`
/// (case-insensitive)
pub fn find_hardware_pcm<'a>(devices: &'a [PcmDevice], hint: &str) -> Option<&'a PcmDevice> {
    let hint = hint.to_lowercase();
    devices
        .iter()
        .filter(|d| d.is_hardware())
        .find(|d| d.description.to_lowercase().contains(&hint))
}

/// Log the PCM device list. Failures are logged, never returned.
pub async fn log_devices(host: &dyn AudioHost) {
    match host.list_pcms().await {
        Ok(text) => {
            let devices = parse_pcm_list(&text);
            tracing::info!("Available ALSA devices ({}):", devices.len());
            for device in &devices {
                tracing::info!("  {:<40} {}", device.name, device.description);
            }
        }
        Err(e) => tracing::error!("Failed to list ALSA devices: {}", e),
    }
}
