//! Removable-device session.
//!
//! A single event loop owns the connection state machine
//! (`Absent → Mounting → Present → Unmounting → Absent`). Attach/detach
//! events from the storage adapter and eject commands from the button or
//! API are serialized through the same loop, so no callback ever mutates
//! session state directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::DeviceError;
use crate::core::hardware::{HardwareEvent, ReaderDevice, StorageAdapter};
use crate::core::indicator::{IndicatorHandle, IndicatorState};

/// Connection status of the removable reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

enum SessionCommand {
    Eject(oneshot::Sender<Result<(), DeviceError>>),
}

/// Cloneable handle for querying the session and requesting ejection.
#[derive(Clone)]
pub struct ReaderSession {
    present: Arc<AtomicBool>,
    commands: mpsc::Sender<SessionCommand>,
}

impl ReaderSession {
    /// Spawn the session event loop. Returns the handle plus the sender the
    /// storage adapter should deliver hardware events to.
    pub fn spawn(
        adapter: Arc<dyn StorageAdapter>,
        reader_root: PathBuf,
        indicator: IndicatorHandle,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<HardwareEvent>) {
        let (hw_tx, hw_rx) = mpsc::channel(32);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let present = Arc::new(AtomicBool::new(false));

        let state = SessionLoop {
            adapter,
            reader_root,
            indicator,
            present: Arc::clone(&present),
            device: None,
        };
        tokio::spawn(state.run(hw_rx, cmd_rx, cancel));

        (
            Self {
                present,
                commands: cmd_tx,
            },
            hw_tx,
        )
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_present() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    /// Unmount and release the device. Calling this while nothing is
    /// connected is reported as an error rather than silently ignored.
    pub async fn request_eject(&self) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Eject(reply_tx))
            .await
            .map_err(|_| DeviceError::SessionClosed)?;
        reply_rx.await.map_err(|_| DeviceError::SessionClosed)?
    }
}

struct SessionLoop {
    adapter: Arc<dyn StorageAdapter>,
    reader_root: PathBuf,
    indicator: IndicatorHandle,
    present: Arc<AtomicBool>,
    device: Option<ReaderDevice>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut hw_rx: mpsc::Receiver<HardwareEvent>,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = hw_rx.recv() => match event {
                    Some(HardwareEvent::DeviceAttached(device)) => self.handle_attach(device).await,
                    Some(HardwareEvent::DeviceDetached) => self.handle_detach().await,
                    None => break,
                },
                command = cmd_rx.recv() => match command {
                    Some(SessionCommand::Eject(reply)) => {
                        let result = self.handle_eject().await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
            }
        }

        // leave no stale mount behind on shutdown
        if self.device.is_some() {
            let _ = self.unmount().await;
        }
    }

    async fn handle_attach(&mut self, device: ReaderDevice) {
        if self.device.is_some() {
            debug!(id = %device.id, "duplicate attach ignored");
            return;
        }

        info!(id = %device.id, label = %device.label, "reader attached, mounting");

        let adapter = Arc::clone(&self.adapter);
        let root = self.reader_root.clone();
        let dev = device.clone();
        let mounted =
            tokio::task::spawn_blocking(move || adapter.mount(&dev, &root)).await;

        match mounted {
            Ok(Ok(())) => {
                info!(root = %self.reader_root.display(), "reader mounted");
                self.device = Some(device);
                self.present.store(true, Ordering::Release);
                self.indicator.set(IndicatorState::DeviceConnected);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "mount failed, reader stays disconnected");
                self.indicator.set(IndicatorState::Error);
            }
            Err(e) => {
                warn!(error = %e, "mount task failed");
                self.indicator.set(IndicatorState::Error);
            }
        }
    }

    async fn handle_detach(&mut self) {
        if self.device.is_none() {
            debug!("duplicate detach ignored");
            return;
        }

        info!("reader detached, unmounting");
        if let Err(e) = self.unmount().await {
            // the medium is already gone, so a failed unmount is expected noise
            debug!(error = %e, "unmount after detach failed");
        }

        if self.indicator.current() != IndicatorState::Error {
            self.indicator.set(IndicatorState::Idle);
        }
    }

    async fn handle_eject(&mut self) -> Result<(), DeviceError> {
        if self.device.is_none() {
            return Err(DeviceError::NotConnected);
        }

        info!("eject requested, unmounting reader");
        match self.unmount().await {
            Ok(()) => {
                self.indicator.set(IndicatorState::EjectFeedback);
                Ok(())
            }
            Err(e) => {
                self.indicator.set(IndicatorState::Error);
                Err(e)
            }
        }
    }

    /// Shared unmount path for detach and eject. Clears the connection
    /// state even if the driver reports a failure on a yanked medium.
    async fn unmount(&mut self) -> Result<(), DeviceError> {
        let adapter = Arc::clone(&self.adapter);
        let root = self.reader_root.clone();
        let result = tokio::task::spawn_blocking(move || adapter.unmount(&root)).await;

        self.device = None;
        self.present.store(false, Ordering::Release);

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeviceError::UnmountFailed {
                root: self.reader_root.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(DeviceError::UnmountFailed {
                root: self.reader_root.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
