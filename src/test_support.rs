//! Fakes shared by unit tests

use crate::devices::AudioHost;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const USB_PCMS: &str = "\
default
    Default Audio Device
hw:CARD=Device,DEV=0
    USB Audio Device, USB Audio
plughw:CARD=Device,DEV=0
    USB Audio Device, USB Audio
hw:CARD=PCH,DEV=3
    HDA Intel PCH, HDMI 0
";

pub const PCH_ONLY: &str = "\
card 0: PCH [HDA Intel PCH], device 0: ALC892 Analog [ALC892 Analog]
  Subdevices: 1/1
";

/// In-memory audio host. `load_loopback` appends a Loopback card to the
/// hardware list unless `load_works` is false, and errors when `load_fails`.
pub struct FakeHost {
    pub pcms: String,
    pub hardware: Mutex<String>,
    pub load_works: bool,
    pub load_fails: bool,
    pub loads: AtomicUsize,
    pub pcm_queries: AtomicUsize,
}

impl FakeHost {
    pub fn new(pcms: &str, hardware: &str) -> Self {
        Self {
            pcms: pcms.to_string(),
            hardware: Mutex::new(hardware.to_string()),
            load_works: true,
            load_fails: false,
            loads: AtomicUsize::new(0),
            pcm_queries: AtomicUsize::new(0),
        }
    }

    pub fn broken_loader(mut self) -> Self {
        self.load_works = false;
        self
    }

    /// Loader that errors out, like modprobe without the module available
    pub fn failing_loader(mut self) -> Self {
        self.load_fails = true;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioHost for FakeHost {
    async fn list_pcms(&self) -> std::io::Result<String> {
        self.pcm_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.pcms.clone())
    }

    async fn list_hardware(&self) -> std::io::Result<String> {
        Ok(self.hardware.lock().unwrap().clone())
    }

    async fn load_loopback(&self, index: u32) -> Result<(), String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.load_fails {
            return Err("modprobe: FATAL: Module snd-aloop not found".to_string());
        }
        if self.load_works {
            let mut hardware = self.hardware.lock().unwrap();
            hardware.push_str(&format!(
                "card {index}: Loopback [Loopback], device 0: Loopback PCM [Loopback PCM]\n\
                 card {index}: Loopback [Loopback], device 1: Loopback PCM [Loopback PCM]\n"
            ));
        }
        Ok(())
    }
}
