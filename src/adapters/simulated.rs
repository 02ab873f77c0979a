//! In-memory drivers for tests and the `--simulation` profile.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::core::button::ButtonInput;
use crate::core::connectivity::NetworkAdapter;
use crate::core::credentials::WifiCredentials;
use crate::core::error::NetworkError;
use crate::core::hardware::{HardwareEvent, ReaderDevice, StorageAdapter};
use crate::core::indicator::{LedStrip, Rgb};

enum Injected {
    Attach(ReaderDevice),
    Detach,
}

/// Test/demo controller that injects attach/detach events.
#[derive(Clone)]
pub struct StorageController {
    tx: mpsc::UnboundedSender<Injected>,
    fail_next_mount: Arc<AtomicBool>,
}

impl StorageController {
    pub fn attach_device(&self, id: &str, capacity_mb: u64) {
        let device = ReaderDevice {
            id: id.to_string(),
            label: format!("READER_{}", id),
            node: PathBuf::from(format!("/tmp/sim_reader_{}", id)),
            capacity: capacity_mb * 1024 * 1024,
            filesystem: "vfat".to_string(),
        };
        let _ = self.tx.send(Injected::Attach(device));
    }

    pub fn detach_device(&self) {
        let _ = self.tx.send(Injected::Detach);
    }

    /// Make the next mount call fail, to exercise the error path.
    pub fn fail_next_mount(&self) {
        self.fail_next_mount.store(true, Ordering::SeqCst);
    }
}

/// Storage driver whose events come from a [`StorageController`] and whose
/// "medium" is just the reader root directory on the host filesystem.
pub struct SimulatedStorage {
    // wrapped so start(), which takes &self, can move the receiver out
    injected_rx: Mutex<Option<mpsc::UnboundedReceiver<Injected>>>,
    fail_next_mount: Arc<AtomicBool>,
}

impl SimulatedStorage {
    pub fn new() -> (Self, StorageController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fail_next_mount = Arc::new(AtomicBool::new(false));

        (
            Self {
                injected_rx: Mutex::new(Some(rx)),
                fail_next_mount: Arc::clone(&fail_next_mount),
            },
            StorageController {
                tx,
                fail_next_mount,
            },
        )
    }
}

impl StorageAdapter for SimulatedStorage {
    fn start(&self, events: mpsc::Sender<HardwareEvent>) {
        let mut rx = self
            .injected_rx
            .lock()
            .unwrap()
            .take()
            .expect("SimulatedStorage::start() called twice");

        tokio::spawn(async move {
            while let Some(injected) = rx.recv().await {
                let event = match injected {
                    Injected::Attach(device) => HardwareEvent::DeviceAttached(device),
                    Injected::Detach => HardwareEvent::DeviceDetached,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
    }

    fn stop(&self) {}

    fn mount(&self, device: &ReaderDevice, root: &Path) -> anyhow::Result<()> {
        if self.fail_next_mount.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated mount failure for {}", device.id);
        }
        std::fs::create_dir_all(root)?;
        debug!(id = %device.id, root = %root.display(), "simulated mount");
        Ok(())
    }

    fn unmount(&self, root: &Path) -> anyhow::Result<()> {
        debug!(root = %root.display(), "simulated unmount");
        Ok(())
    }
}

/// Wi-Fi control plane with scripted behavior.
pub struct SimulatedNetwork {
    join_delay: Duration,
    join_succeeds: bool,
    access_point: Mutex<Option<(String, String)>>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            join_delay: Duration::from_millis(200),
            join_succeeds: true,
            access_point: Mutex::new(None),
        }
    }

    pub fn refusing_joins() -> Self {
        Self {
            join_delay: Duration::from_millis(200),
            join_succeeds: false,
            access_point: Mutex::new(None),
        }
    }

    /// The SSID/password pair from the last `start_access_point` call.
    pub fn advertised(&self) -> Option<(String, String)> {
        self.access_point.lock().unwrap().clone()
    }
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkAdapter for SimulatedNetwork {
    fn join(&self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        std::thread::sleep(self.join_delay);
        if self.join_succeeds {
            Ok(())
        } else {
            Err(NetworkError::JoinFailed {
                ssid: credentials.network_name.clone(),
                reason: "simulated join refusal".to_string(),
            })
        }
    }

    fn start_access_point(&self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        *self.access_point.lock().unwrap() = Some((ssid.to_string(), password.to_string()));
        Ok(())
    }
}

/// LED strip that records frames instead of driving hardware.
pub struct SimulatedStrip {
    shared: Arc<StripShared>,
    staged: Vec<Rgb>,
}

struct StripShared {
    pixels: Mutex<Vec<Rgb>>,
    refreshes: AtomicU64,
}

/// Read side of a [`SimulatedStrip`], for assertions.
#[derive(Clone)]
pub struct StripProbe {
    shared: Arc<StripShared>,
}

impl SimulatedStrip {
    pub fn new(len: usize) -> (Self, StripProbe) {
        let shared = Arc::new(StripShared {
            pixels: Mutex::new(vec![Rgb::OFF; len]),
            refreshes: AtomicU64::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
                staged: vec![Rgb::OFF; len],
            },
            StripProbe { shared },
        )
    }
}

impl LedStrip for SimulatedStrip {
    fn len(&self) -> usize {
        self.staged.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.staged.get_mut(index) {
            *pixel = color;
        }
    }

    fn refresh(&mut self) {
        *self.shared.pixels.lock().unwrap() = self.staged.clone();
        self.shared.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

impl StripProbe {
    pub fn frame(&self) -> Vec<Rgb> {
        self.shared.pixels.lock().unwrap().clone()
    }

    pub fn refresh_count(&self) -> u64 {
        self.shared.refreshes.load(Ordering::Relaxed)
    }
}

/// Button whose level is flipped by a [`ButtonProbe`].
pub struct SimulatedButton {
    pressed: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct ButtonProbe {
    pressed: Arc<AtomicBool>,
}

impl SimulatedButton {
    pub fn new() -> (Self, ButtonProbe) {
        let pressed = Arc::new(AtomicBool::new(false));
        (
            Self {
                pressed: Arc::clone(&pressed),
            },
            ButtonProbe { pressed },
        )
    }
}

impl ButtonInput for SimulatedButton {
    fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}

impl ButtonProbe {
    pub fn press(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.pressed.store(false, Ordering::SeqCst);
    }
}
