//! Bounded readiness polling
//!
//! [`poll_until`] is a generic attempts × interval retry around a boolean
//! probe. [`wait_for_live`] uses it to watch the loopback card's playback
//! `hw_params` file in procfs, which reads `closed` until a writer opens the
//! device and then lists the negotiated rate, format and channels.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Call `probe` up to `attempts` times, sleeping `interval` between calls.
///
/// Returns true as soon as the probe succeeds; no further calls are made.
pub async fn poll_until<F>(attempts: u32, interval: Duration, mut probe: F) -> bool
where
    F: FnMut() -> bool,
{
    for attempt in 1..=attempts {
        if probe() {
            tracing::debug!("Probe succeeded on attempt {}/{}", attempt, attempts);
            return true;
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    false
}

/// procfs path of the playback sub-device's hw_params for a card
pub fn hw_params_path(proc_root: &Path, card: u32) -> PathBuf {
    proc_root
        .join(format!("card{}", card))
        .join("pcm0p")
        .join("sub0")
        .join("hw_params")
}

/// Whether hw_params content describes an open stream
pub fn is_stream_live(content: &str) -> bool {
    let content = content.trim();
    !content.is_empty() && content != "closed" && content.contains("rate:")
}

/// Probe a hw_params file once
pub fn probe_hw_params(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(content) => is_stream_live(&content),
        Err(e) => {
            tracing::trace!("hw_params not readable at {:?}: {}", path, e);
            false
        }
    }
}

/// Wait for audio to start flowing into loopback card `card`.
///
/// Returns false when the attempts run out; callers carry on regardless.
pub async fn wait_for_live(
    proc_root: &Path,
    card: u32,
    max_attempts: u32,
    poll_interval: Duration,
) -> bool {
    let path = hw_params_path(proc_root, card);
    tracing::info!(
        "Waiting for audio on loopback card {} ({} x {}ms)",
        card,
        max_attempts,
        poll_interval.as_millis()
    );

    let live = poll_until(max_attempts, poll_interval, || probe_hw_params(&path)).await;
    if live {
        tracing::info!("Loopback card {} is live", card);
    } else {
        tracing::warn!(
            "No audio on loopback card {} after {} attempts, starting anyway",
            card,
            max_attempts
        );
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const LIVE_PARAMS: &str = "\
access: RW_INTERLEAVED
format: S16_LE
subformat: STD
channels: 2
rate: 44100 (44100/1)
period_size: 1024
buffer_size: 4096
";

    #[tokio::test]
    async fn test_poll_until_stops_on_success() {
        let calls = Cell::new(0);
        let ok = poll_until(10, Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            calls.get() >= 3
        })
        .await;
        assert!(ok);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_poll_until_exhausts_attempts() {
        let calls = Cell::new(0);
        let ok = poll_until(4, Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            false
        })
        .await;
        assert!(!ok);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_poll_until_zero_attempts() {
        assert!(!poll_until(0, Duration::from_millis(1), || true).await);
    }

    #[test]
    fn test_is_stream_live() {
        assert!(is_stream_live(LIVE_PARAMS));
        assert!(!is_stream_live("closed\n"));
        assert!(!is_stream_live(""));
        assert!(!is_stream_live("access: RW_INTERLEAVED\n"));
    }

    #[test]
    fn test_hw_params_path() {
        let path = hw_params_path(Path::new("/proc/asound"), 10);
        assert_eq!(path, PathBuf::from("/proc/asound/card10/pcm0p/sub0/hw_params"));
    }

    #[test]
    fn test_probe_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!probe_hw_params(&dir.path().join("missing")));
    }

    #[tokio::test]
    async fn test_wait_for_live_flips_after_polls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = hw_params_path(dir.path(), 10);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "closed\n").unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(&writer_path, LIVE_PARAMS).unwrap();
        });

        let live = wait_for_live(dir.path(), 10, 200, Duration::from_millis(5)).await;
        writer.await.unwrap();
        assert!(live);
    }

    #[tokio::test]
    async fn test_wait_for_live_gives_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let live = wait_for_live(dir.path(), 10, 3, Duration::from_millis(1)).await;
        assert!(!live);
    }
}
