//! Linux storage driver: udev monitoring plus mount(2)/umount(2).
//!
//! Watches block partitions on the USB bus and reports them as reader
//! attach/detach events. Mounting goes through `nix::mount` with the
//! filesystem type udev probed for the partition.

use std::os::fd::BorrowedFd;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use nix::mount::{MsFlags, mount, umount};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::hardware::{HardwareEvent, ReaderDevice, StorageAdapter};

/// How long each poll waits before re-checking the stop flag.
const MONITOR_POLL_MS: u16 = 500;

pub struct LinuxStorage {
    stop: Arc<AtomicBool>,
}

impl LinuxStorage {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for LinuxStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for LinuxStorage {
    fn start(&self, events: mpsc::Sender<HardwareEvent>) {
        let stop = Arc::clone(&self.stop);
        std::thread::spawn(move || {
            if let Err(e) = monitor_loop(events, stop) {
                error!(error = %e, "udev monitor stopped");
            }
        });
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn mount(&self, device: &ReaderDevice, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("failed to create mount point {}", root.display()))?;

        mount(
            Some(device.node.as_path()),
            root,
            Some(device.filesystem.as_str()),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            None::<&str>,
        )
        .with_context(|| {
            format!(
                "mount {} ({}) at {} failed",
                device.node.display(),
                device.filesystem,
                root.display()
            )
        })?;

        info!(node = %device.node.display(), root = %root.display(), "mounted reader");
        Ok(())
    }

    fn unmount(&self, root: &Path) -> Result<()> {
        umount(root).with_context(|| format!("umount {} failed", root.display()))?;
        info!(root = %root.display(), "unmounted reader");
        Ok(())
    }
}

fn monitor_loop(events: mpsc::Sender<HardwareEvent>, stop: Arc<AtomicBool>) -> Result<()> {
    let socket = udev::MonitorBuilder::new()
        .context("failed to create udev monitor")?
        .match_subsystem_devtype("block", "partition")
        .context("failed to filter udev monitor")?
        .listen()
        .context("failed to listen on udev monitor")?;

    info!("udev monitor listening for reader partitions");

    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("udev monitor stopping");
            return Ok(());
        }

        // SAFETY: the socket outlives the borrowed fd for the poll call
        let fd = unsafe { BorrowedFd::borrow_raw(socket.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::from(MONITOR_POLL_MS))
            .context("poll on udev monitor failed")?;
        if ready == 0 {
            continue;
        }

        for event in socket.iter() {
            let Some(mapped) = map_event(&event) else {
                continue;
            };
            if events.blocking_send(mapped).is_err() {
                return Ok(());
            }
        }
    }
}

fn map_event(event: &udev::Event) -> Option<HardwareEvent> {
    // only USB mass storage is a reader candidate
    let on_usb = event
        .property_value("ID_BUS")
        .is_some_and(|bus| bus == "usb");

    match event.event_type() {
        udev::EventType::Add if on_usb => {
            let device = reader_from_udev(event)?;
            info!(id = %device.id, label = %device.label, "usb partition appeared");
            Some(HardwareEvent::DeviceAttached(device))
        }
        udev::EventType::Remove if on_usb => {
            info!("usb partition disappeared");
            Some(HardwareEvent::DeviceDetached)
        }
        _ => None,
    }
}

fn reader_from_udev(event: &udev::Event) -> Option<ReaderDevice> {
    let node = event.devnode()?.to_path_buf();

    let filesystem = event
        .property_value("ID_FS_TYPE")
        .and_then(|v| v.to_str())
        .unwrap_or("vfat")
        .to_string();

    let id = event
        .property_value("ID_FS_UUID")
        .and_then(|v| v.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| node.display().to_string());

    let label = event
        .property_value("ID_FS_LABEL")
        .and_then(|v| v.to_str())
        .unwrap_or("reader")
        .to_string();

    // sysfs reports capacity in 512-byte sectors
    let capacity = event
        .attribute_value("size")
        .and_then(|v| v.to_str())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|sectors| sectors * 512)
        .unwrap_or_else(|| {
            warn!(node = %node.display(), "no size attribute for partition");
            0
        });

    Some(ReaderDevice {
        id,
        label,
        node,
        capacity,
        filesystem,
    })
}
