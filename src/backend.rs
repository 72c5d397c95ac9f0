//! Audio backend resolution
//!
//! Turns the configured hints into a concrete player backend and device:
//! 1. An explicit backend name always wins
//! 2. A live PulseAudio socket selects pulse with device "default"
//! 3. Otherwise ALSA, with the device hint matched against `aplay -L`
//!
//! Resolution never fails. An unmatched hint leaves the device unset and the
//! client picks its own default.

use crate::devices::{self, AudioHost};
use serde::Serialize;

/// Player backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendKind {
    /// Direct ALSA hardware access
    RawHardware,
    /// PulseAudio user session mixer
    SessionMixer,
    /// PipeWire graph
    NetworkGraph,
}

impl BackendKind {
    /// Name used in the client's `--player` flag
    pub fn player_name(&self) -> &'static str {
        match self {
            BackendKind::RawHardware => "alsa",
            BackendKind::SessionMixer => "pulse",
            BackendKind::NetworkGraph => "pipewire",
        }
    }

    /// Parse a backend name; accepts player names and variant names
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();

        match normalized.as_str() {
            "alsa" | "rawhardware" | "hw" => Some(BackendKind::RawHardware),
            "pulse" | "pulseaudio" | "sessionmixer" => Some(BackendKind::SessionMixer),
            "pipewire" | "networkgraph" => Some(BackendKind::NetworkGraph),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.player_name())
    }
}

/// A resolved backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioBackend {
    pub kind: BackendKind,
    /// Raw key=value,... player options
    pub options: Option<String>,
    /// hw:/plughw: id or named sink; None = client default
    pub device: Option<String>,
}

impl AudioBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            options: None,
            device: None,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_options(mut self, options: Option<String>) -> Self {
        self.options = options.filter(|o| !o.is_empty());
        self
    }
}

/// Inputs to [`resolve`]
#[derive(Debug, Clone, Default)]
pub struct BackendRequest<'a> {
    pub explicit: Option<&'a str>,
    pub device_hint: Option<&'a str>,
    pub options: Option<&'a str>,
    pub session_socket_present: bool,
}

/// Whether a hint is already a usable ALSA device name
fn is_device_descriptor(hint: &str) -> bool {
    ["hw:", "plughw:", "default", "sysdefault"]
        .iter()
        .any(|prefix| hint.starts_with(prefix))
}

/// Resolve a backend and device from configuration hints
pub async fn resolve(request: &BackendRequest<'_>, host: &dyn AudioHost) -> AudioBackend {
    let hint = request.device_hint.map(str::trim).filter(|h| !h.is_empty());
    let options = request.options.map(String::from);

    let explicit = request.explicit.and_then(|name| {
        let kind = BackendKind::from_name(name);
        if kind.is_none() {
            tracing::warn!("Unknown SOUND_BACKEND '{}', auto-detecting", name);
        }
        kind
    });

    let kind = match explicit {
        Some(kind) => {
            tracing::info!("Using SOUND_BACKEND override: {}", kind);
            kind
        }
        None if request.session_socket_present => {
            tracing::info!("Auto-detected audio backend: pulse (session socket present)");
            BackendKind::SessionMixer
        }
        None => {
            tracing::info!("Auto-detected audio backend: alsa");
            BackendKind::RawHardware
        }
    };

    let backend = AudioBackend::new(kind).with_options(options);

    match kind {
        BackendKind::SessionMixer => backend.with_device("default"),
        BackendKind::RawHardware => match hint {
            Some(hint) if is_device_descriptor(hint) => backend.with_device(hint),
            Some(hint) => match resolve_alsa_device(hint, host).await {
                Some(device) => backend.with_device(device),
                None => backend,
            },
            None => backend,
        },
        BackendKind::NetworkGraph => match hint {
            Some(hint) => backend.with_device(hint),
            None => backend,
        },
    }
}

/// Match a description substring against hw:/plughw: PCMs
async fn resolve_alsa_device(hint: &str, host: &dyn AudioHost) -> Option<String> {
    let text = match host.list_pcms().await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to resolve ALSA device: {}", e);
            return None;
        }
    };

    let pcms = devices::parse_pcm_list(&text);
    match devices::find_hardware_pcm(&pcms, hint) {
        Some(device) => {
            tracing::info!("Resolved device '{}' to: {}", hint, device.name);
            Some(device.name.clone())
        }
        None => {
            tracing::warn!("No ALSA device matches '{}', using client default", hint);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHost, USB_PCMS};
    use std::sync::atomic::Ordering;

    fn host() -> FakeHost {
        FakeHost::new(USB_PCMS, "")
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(BackendKind::from_name("ALSA"), Some(BackendKind::RawHardware));
        assert_eq!(BackendKind::from_name("pulse"), Some(BackendKind::SessionMixer));
        assert_eq!(BackendKind::from_name("SessionMixer"), Some(BackendKind::SessionMixer));
        assert_eq!(BackendKind::from_name("network_graph"), Some(BackendKind::NetworkGraph));
        assert_eq!(BackendKind::from_name("pipewire"), Some(BackendKind::NetworkGraph));
        assert_eq!(BackendKind::from_name("oss"), None);
    }

    #[tokio::test]
    async fn test_explicit_backend_wins_over_hint_and_socket() {
        let host = host();
        let request = BackendRequest {
            explicit: Some("SessionMixer"),
            device_hint: Some("USB"),
            options: None,
            session_socket_present: false,
        };
        let backend = resolve(&request, &host).await;
        assert_eq!(backend.kind, BackendKind::SessionMixer);
        assert_eq!(backend.device.as_deref(), Some("default"));
        assert_eq!(host.pcm_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_alsa_ignores_session_socket() {
        let request = BackendRequest {
            explicit: Some("alsa"),
            device_hint: Some("usb audio"),
            options: Some("buffer_time=100"),
            session_socket_present: true,
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.kind, BackendKind::RawHardware);
        assert_eq!(backend.device.as_deref(), Some("hw:CARD=Device,DEV=0"));
        assert_eq!(backend.options.as_deref(), Some("buffer_time=100"));
    }

    #[tokio::test]
    async fn test_session_socket_selects_pulse() {
        let request = BackendRequest {
            session_socket_present: true,
            device_hint: Some("USB"),
            ..Default::default()
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.kind, BackendKind::SessionMixer);
        assert_eq!(backend.device.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn test_fallback_to_alsa_with_hint_match() {
        let request = BackendRequest {
            device_hint: Some("hdmi"),
            ..Default::default()
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.kind, BackendKind::RawHardware);
        assert_eq!(backend.device.as_deref(), Some("hw:CARD=PCH,DEV=3"));
    }

    #[tokio::test]
    async fn test_unmatched_hint_leaves_device_unset() {
        let request = BackendRequest {
            device_hint: Some("Bluetooth"),
            ..Default::default()
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.kind, BackendKind::RawHardware);
        assert_eq!(backend.device, None);
    }

    #[tokio::test]
    async fn test_no_hint_skips_enumeration() {
        let host = host();
        let backend = resolve(&BackendRequest::default(), &host).await;
        assert_eq!(backend, AudioBackend::new(BackendKind::RawHardware));
        assert_eq!(host.pcm_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_descriptor_used_verbatim() {
        let host = host();
        let request = BackendRequest {
            device_hint: Some("plughw:1,0"),
            ..Default::default()
        };
        let backend = resolve(&request, &host).await;
        assert_eq!(backend.device.as_deref(), Some("plughw:1,0"));
        assert_eq!(host.pcm_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_explicit_backend_falls_back_to_inference() {
        let request = BackendRequest {
            explicit: Some("jack"),
            session_socket_present: true,
            ..Default::default()
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.kind, BackendKind::SessionMixer);
    }

    #[tokio::test]
    async fn test_empty_options_dropped() {
        let request = BackendRequest {
            options: Some(""),
            ..Default::default()
        };
        let backend = resolve(&request, &host()).await;
        assert_eq!(backend.options, None);
    }
}
