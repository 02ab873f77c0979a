use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

/// Attach/detach notifications delivered by the storage driver.
#[derive(Debug, Clone)]
pub enum HardwareEvent {
    DeviceAttached(ReaderDevice),
    DeviceDetached,
}

/// Handle describing an attached mass-storage device.
#[derive(Debug, Clone)]
pub struct ReaderDevice {
    pub id: String,
    pub label: String,
    /// Block node backing the device (a plain directory in simulation).
    pub node: PathBuf,
    pub capacity: u64,
    pub filesystem: String,
}

pub trait StorageAdapter: Send + Sync {
    /// Start listening for attach/detach events.
    /// Spawns internal tasks that send events to the provided channel.
    fn start(&self, events: mpsc::Sender<HardwareEvent>);

    /// Stop the monitor gracefully.
    fn stop(&self);

    /// Mount the device's filesystem at `root`.
    /// NOTE: performs blocking I/O and should be called from a blocking
    /// context (e.g., via spawn_blocking).
    fn mount(&self, device: &ReaderDevice, root: &Path) -> anyhow::Result<()>;

    /// Unmount whatever is mounted at `root`. Blocking as well.
    fn unmount(&self, root: &Path) -> anyhow::Result<()>;
}
