//! Loopback bridge setup
//!
//! The visualizer topology needs a snd-aloop card: the internal client plays
//! into sub-device 0 and the visualizer captures from sub-device 1. The
//! visualizer only knows how to open the default device, so a global ALSA
//! config redirects `default` to the capture side.

use crate::devices::{self, AudioHost};
use crate::error::BridgeError;
use std::path::Path;
use std::time::Duration;

/// Text identifying a snd-aloop card in `aplay -l`
pub const LOOPBACK_MARKER: &str = "Loopback";

/// Sub-device the endpoint client writes to
pub const PLAYBACK_SUBDEVICE: u32 = 0;

/// Sub-device the visualizer reads from
pub const CAPTURE_SUBDEVICE: u32 = 1;

/// ALSA name of a loopback sub-device
pub fn loopback_device(card: u32, subdevice: u32) -> String {
    format!("hw:{},{}", card, subdevice)
}

/// Card indexes listed with the loopback marker
async fn loopback_cards(host: &dyn AudioHost) -> Vec<u32> {
    let text = match host.list_hardware().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to list hardware devices: {}", e);
            return Vec::new();
        }
    };

    let mut cards: Vec<u32> = devices::parse_hardware_list(&text)
        .into_iter()
        .filter(|d| d.description().contains(LOOPBACK_MARKER))
        .map(|d| d.card)
        .collect();
    cards.dedup();
    cards
}

/// Ok when the loopback sits on `index`, WrongIndex when it sits elsewhere
fn check_index(cards: &[u32], index: u32) -> Option<Result<(), BridgeError>> {
    if cards.contains(&index) {
        return Some(Ok(()));
    }
    cards.first().map(|&found| {
        Err(BridgeError::WrongIndex {
            expected: index,
            found,
        })
    })
}

/// Make sure a loopback card exists at `index`, loading snd-aloop if not.
///
/// Idempotent: when the card is already listed nothing is loaded. A
/// loopback on another index is an error, since the module can only be
/// loaded once and every consumer addresses `hw:<index>,*`.
pub async fn ensure_loopback(
    host: &dyn AudioHost,
    index: u32,
    settle: Duration,
) -> Result<(), BridgeError> {
    if let Some(result) = check_index(&loopback_cards(host).await, index) {
        if result.is_ok() {
            tracing::info!("Loopback card {} already present", index);
        }
        return result;
    }

    tracing::info!("Loading snd-aloop at card index {}", index);
    host.load_loopback(index)
        .await
        .map_err(|reason| BridgeError::LoadFailed { index, reason })?;

    tokio::time::sleep(settle).await;

    match check_index(&loopback_cards(host).await, index) {
        Some(Ok(())) => {
            tracing::info!("Loopback card {} loaded", index);
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => Err(BridgeError::MarkerMissing(index)),
    }
}

/// Routing rule sending the default device to a loopback sub-device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub card: u32,
    pub subdevice: u32,
    pub sample_rate: u32,
    pub format: String,
    pub channels: u32,
}

impl BridgeConfig {
    /// Route the default device to the capture side of `card`
    pub fn capture_side(card: u32, sample_rate: u32, format: &str, channels: u32) -> Self {
        Self {
            card,
            subdevice: CAPTURE_SUBDEVICE,
            sample_rate,
            format: format.to_string(),
            channels,
        }
    }

    /// ALSA device the default is redirected to
    pub fn target(&self) -> String {
        loopback_device(self.card, self.subdevice)
    }

    /// Render as an asound.conf
    pub fn render(&self) -> String {
        format!(
            r#"# Generated by roleboot on every start. Local edits are overwritten.
pcm.!default {{
    type plug
    slave {{
        pcm "{target}"
        rate {rate}
        format {format}
        channels {channels}
    }}
}}

ctl.!default {{
    type hw
    card {card}
}}
"#,
            target = self.target(),
            rate = self.sample_rate,
            format = self.format,
            channels = self.channels,
            card = self.card,
        )
    }
}

/// Overwrite `path` with the rendered bridge config
pub fn write_bridge_config(path: &Path, bridge: &BridgeConfig) -> Result<(), BridgeError> {
    let to_err = |source| BridgeError::WriteConfig {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    std::fs::write(path, bridge.render()).map_err(to_err)?;

    tracing::info!(
        "Bridge config written to {:?}: default -> {} ({} Hz, {}, {} ch)",
        path,
        bridge.target(),
        bridge.sample_rate,
        bridge.format,
        bridge.channels
    );
    Ok(())
}
