//! Chunked file copy between the two mounted roots.
//!
//! At most one transfer is in flight; the busy check and the `active` flag
//! are set under a single lock. Progress readers always see a snapshot of
//! the last fully written chunk. Cancellation is cooperative: the flag is
//! checked at every chunk boundary, and a cancelled transfer removes its
//! partial destination file. A failed write does NOT remove the partial
//! file; only cancellation cleans up.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::TransferError;
use crate::logging::LogThrottle;

/// Bytes copied per chunk. Progress updates and cancellation checks happen
/// at this granularity.
const CHUNK_SIZE: usize = 64 * 1024;

/// Minimum interval between progress log lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a transfer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Success,
    Cancelled,
    Failed(String),
}

/// Live view of the current (or just-finished) transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSession {
    pub filename: String,
    pub bytes_transferred: u64,
    /// 0 means the size could not be determined; consumers treat that as
    /// indeterminate rather than computing a percentage.
    pub total_bytes: u64,
    pub active: bool,
    pub outcome: Outcome,
    pub cancel_requested: bool,
}

/// A copy request between two mounted roots.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub filename: String,
}

#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    session: Mutex<Option<TransferSession>>,
    chunk_size: usize,
    /// Per-chunk pause, used by the simulation profile to make transfers
    /// observable on the indicator.
    throttle: Option<Duration>,
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::with_tuning(CHUNK_SIZE, None)
    }

    pub fn with_tuning(chunk_size: usize, throttle: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                session: Mutex::new(None),
                chunk_size: chunk_size.max(1),
                throttle,
            }),
        }
    }

    /// Copy `filename` from the source root to the destination root.
    ///
    /// Non-reentrant: returns [`TransferError::Busy`] without touching the
    /// running session if a transfer is already active. The copy itself runs
    /// on the blocking pool on behalf of the calling context.
    pub async fn start(&self, request: TransferRequest) -> Result<(), TransferError> {
        {
            let mut slot = self.inner.session.lock().unwrap();
            if slot.as_ref().is_some_and(|s| s.active) {
                return Err(TransferError::Busy);
            }
            *slot = Some(TransferSession {
                filename: request.filename.clone(),
                bytes_transferred: 0,
                total_bytes: 0,
                active: true,
                outcome: Outcome::Pending,
                cancel_requested: false,
            });
        }

        info!(
            file = %request.filename,
            from = %request.source_root.display(),
            to = %request.dest_root.display(),
            "transfer started"
        );

        let inner = Arc::clone(&self.inner);
        let result = match tokio::task::spawn_blocking(move || inner.copy(&request)).await {
            Ok(result) => result,
            Err(e) => Err(TransferError::WriteError(io::Error::other(e))),
        };

        let mut slot = self.inner.session.lock().unwrap();
        if let Some(session) = slot.as_mut() {
            session.active = false;
            session.outcome = match &result {
                Ok(()) => Outcome::Success,
                Err(TransferError::Cancelled) => Outcome::Cancelled,
                Err(e) => Outcome::Failed(e.to_string()),
            };
        }

        result
    }

    /// Request cancellation of the running transfer. Takes effect at the
    /// next chunk boundary. Returns whether a transfer was active.
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.session.lock().unwrap();
        match slot.as_mut() {
            Some(session) if session.active => {
                session.cancel_requested = true;
                true
            }
            _ => false,
        }
    }

    /// Non-blocking snapshot of the transfer state.
    ///
    /// While a transfer runs this returns its live session. Once finished,
    /// the final session is handed back exactly once and the engine resets
    /// to idle.
    pub fn progress(&self) -> Option<TransferSession> {
        let mut slot = self.inner.session.lock().unwrap();
        match &*slot {
            Some(session) if session.active => Some(session.clone()),
            Some(_) => slot.take(),
            None => None,
        }
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInner {
    fn copy(&self, request: &TransferRequest) -> Result<(), TransferError> {
        let source_path = request.source_root.join(&request.filename);
        let dest_path = request.dest_root.join(&request.filename);

        let mut source = File::open(&source_path).map_err(|e| {
            if is_device_gone(&e) {
                warn!(path = %source_path.display(), "source vanished, device likely detached");
            }
            TransferError::SourceUnreadable(e)
        })?;

        // best-effort size; 0 stays "unknown"
        let total_bytes = fs::metadata(&source_path).map(|m| m.len()).unwrap_or(0);
        self.update(|s| s.total_bytes = total_bytes);

        let mut dest =
            File::create(&dest_path).map_err(TransferError::DestinationUnwritable)?;

        let throttle = LogThrottle::new(PROGRESS_LOG_INTERVAL);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut copied: u64 = 0;

        loop {
            if self.cancel_requested() {
                info!(file = %request.filename, copied, "transfer cancelled, removing partial file");
                drop(dest);
                if let Err(e) = fs::remove_file(&dest_path) {
                    warn!(path = %dest_path.display(), error = %e, "failed to remove partial file");
                }
                return Err(TransferError::Cancelled);
            }

            let n = source.read(&mut buffer).map_err(|e| {
                if is_device_gone(&e) {
                    warn!(file = %request.filename, "read failed, device likely detached mid-transfer");
                }
                TransferError::SourceUnreadable(e)
            })?;
            if n == 0 {
                break;
            }

            // a failed write leaves the partial file in place
            dest.write_all(&buffer[..n]).map_err(|e| {
                if is_device_gone(&e) {
                    warn!(file = %request.filename, "write failed, device likely detached mid-transfer");
                }
                TransferError::WriteError(e)
            })?;

            copied += n as u64;
            self.update(|s| {
                // the source can grow under us; never report past the total
                s.bytes_transferred = if total_bytes > 0 {
                    copied.min(total_bytes)
                } else {
                    copied
                };
            });

            if throttle.should_log() {
                debug!(file = %request.filename, copied, total_bytes, "transfer progress");
            }

            if let Some(pause) = self.throttle {
                std::thread::sleep(pause);
            }
        }

        dest.sync_all().map_err(TransferError::WriteError)?;
        preserve_mtime(&source_path, &dest_path);

        info!(file = %request.filename, bytes = copied, "transfer complete");
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|s| s.cancel_requested)
    }

    fn update(&self, f: impl FnOnce(&mut TransferSession)) {
        if let Some(session) = self.session.lock().unwrap().as_mut() {
            f(session);
        }
    }
}

/// Keep the book's modification time so reader libraries sort sensibly.
fn preserve_mtime(source: &std::path::Path, dest: &std::path::Path) {
    let Ok(metadata) = fs::metadata(source) else {
        return;
    };
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_mtime(dest, mtime) {
        debug!(dest = %dest.display(), error = %e, "failed to preserve mtime");
    }
}

/// Check if an I/O error indicates the removable medium went away.
fn is_device_gone(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::NotFound | ErrorKind::BrokenPipe | ErrorKind::NotConnected => true,
        _ => {
            if let Some(os_error) = error.raw_os_error() {
                matches!(
                    os_error,
                    libc::EIO | libc::ENODEV | libc::ENXIO | libc::ENOMEDIUM
                )
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(dir: &std::path::Path, filename: &str) -> TransferRequest {
        TransferRequest {
            source_root: dir.join("library"),
            dest_root: dir.join("reader"),
            filename: filename.to_string(),
        }
    }

    fn setup_roots(dir: &std::path::Path) {
        fs::create_dir(dir.join("library")).unwrap();
        fs::create_dir(dir.join("reader")).unwrap();
    }

    #[test]
    fn session_serializes_for_the_status_surface() {
        let session = TransferSession {
            filename: "dune.epub".to_string(),
            bytes_transferred: 512,
            total_bytes: 2048,
            active: true,
            outcome: Outcome::Pending,
            cancel_requested: false,
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["filename"], "dune.epub");
        assert_eq!(value["bytes_transferred"], 512);
        assert_eq!(value["outcome"], "pending");
    }

    #[test]
    fn device_gone_classification() {
        assert!(is_device_gone(&io::Error::from_raw_os_error(libc::EIO)));
        assert!(is_device_gone(&io::Error::from_raw_os_error(libc::ENODEV)));
        assert!(is_device_gone(&io::Error::new(ErrorKind::NotFound, "gone")));
        assert!(!is_device_gone(&io::Error::new(
            ErrorKind::PermissionDenied,
            "denied"
        )));
    }

    #[tokio::test]
    async fn copies_file_and_reports_full_progress() {
        let temp = tempdir().unwrap();
        setup_roots(temp.path());
        let content = vec![7u8; 3000];
        fs::write(temp.path().join("library/book.epub"), &content).unwrap();

        let engine = TransferEngine::with_tuning(1024, None);
        engine
            .start(request(temp.path(), "book.epub"))
            .await
            .unwrap();

        let copied = fs::read(temp.path().join("reader/book.epub")).unwrap();
        assert_eq!(copied, content);

        let session = engine.progress().expect("final session observable once");
        assert!(!session.active);
        assert_eq!(session.outcome, Outcome::Success);
        assert_eq!(session.bytes_transferred, session.total_bytes);
        assert_eq!(session.total_bytes, 3000);

        // the final session is handed back only once
        assert!(engine.progress().is_none());
    }

    #[tokio::test]
    async fn missing_source_is_source_unreadable() {
        let temp = tempdir().unwrap();
        setup_roots(temp.path());

        let engine = TransferEngine::new();
        let err = engine
            .start(request(temp.path(), "absent.epub"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SourceUnreadable(_)));
    }

    #[tokio::test]
    async fn unwritable_destination_leaves_source_untouched() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("library")).unwrap();
        fs::write(temp.path().join("library/book.epub"), b"content").unwrap();
        // destination root does not exist

        let engine = TransferEngine::new();
        let err = engine
            .start(request(temp.path(), "book.epub"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::DestinationUnwritable(_)));
        assert_eq!(
            fs::read(temp.path().join("library/book.epub")).unwrap(),
            b"content"
        );
    }

    #[tokio::test]
    async fn second_start_returns_busy_without_touching_session() {
        let temp = tempdir().unwrap();
        setup_roots(temp.path());
        fs::write(temp.path().join("library/slow.epub"), vec![1u8; 1000]).unwrap();

        let engine = TransferEngine::with_tuning(100, Some(Duration::from_millis(20)));
        let running = {
            let engine = engine.clone();
            let req = request(temp.path(), "slow.epub");
            tokio::spawn(async move { engine.start(req).await })
        };

        // wait for the first transfer to claim the session
        while engine.progress().is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let err = engine
            .start(request(temp.path(), "other.epub"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Busy));

        let session = engine.progress().unwrap();
        assert_eq!(session.filename, "slow.epub");
        assert!(session.active);

        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_removes_partial_destination() {
        let temp = tempdir().unwrap();
        setup_roots(temp.path());
        fs::write(temp.path().join("library/book.epub"), vec![9u8; 1000]).unwrap();

        let engine = TransferEngine::with_tuning(100, Some(Duration::from_millis(20)));
        let running = {
            let engine = engine.clone();
            let req = request(temp.path(), "book.epub");
            tokio::spawn(async move { engine.start(req).await })
        };

        // cancel once at least 400 bytes made it across
        loop {
            if let Some(session) = engine.progress() {
                if session.bytes_transferred >= 400 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(engine.cancel());

        let err = running.await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));

        let session = engine.progress().expect("final session observable");
        assert_eq!(session.outcome, Outcome::Cancelled);
        assert!(!session.active);
        assert!(session.bytes_transferred >= 400 && session.bytes_transferred <= 1000);

        assert!(!temp.path().join("reader/book.epub").exists());
    }

    #[tokio::test]
    async fn cancel_without_active_transfer_is_a_noop() {
        let engine = TransferEngine::new();
        assert!(!engine.cancel());
        assert!(engine.progress().is_none());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_write_is_write_error_and_keeps_partial_file() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("library")).unwrap();
        fs::write(temp.path().join("library/full"), vec![1u8; 4096]).unwrap();

        // /dev/full accepts the open and fails every write with ENOSPC
        let engine = TransferEngine::new();
        let err = engine
            .start(TransferRequest {
                source_root: temp.path().join("library"),
                dest_root: PathBuf::from("/dev"),
                filename: "full".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::WriteError(_)));
        let session = engine.progress().unwrap();
        assert!(matches!(session.outcome, Outcome::Failed(_)));
    }
}
