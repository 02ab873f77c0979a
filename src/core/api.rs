//! Command surface exposed to the request router.
//!
//! Every operation returns plain structured results; the wire format is the
//! router's concern (see `crate::web`).

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::context::AppContext;
use crate::core::error::{DeviceError, TransferError};
use crate::core::indicator::IndicatorState;
use crate::core::transfer::{TransferRequest, TransferSession};

/// File extensions recognized as e-books.
const EBOOK_EXTENSIONS: &[&str] = &["epub", "mobi", "pdf", "txt"];

/// Which of the two mounted roots a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shelf {
    Library,
    Reader,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub reader_connected: bool,
    pub transfer: Option<TransferSession>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("filename must be a plain name, not a path")]
    InvalidFilename,

    #[error("source and destination are the same shelf")]
    SameShelf,

    #[error("failed to list {shelf:?}: {source}")]
    ListFailed {
        shelf: Shelf,
        #[source]
        source: io::Error,
    },
}

/// Dispatches router commands against the shared application state.
#[derive(Clone)]
pub struct CommandHandler {
    ctx: AppContext,
}

impl CommandHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Connection and transfer status in one snapshot.
    ///
    /// A finished transfer is reported exactly once; after that the
    /// `transfer` field drops back to `None`.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            reader_connected: self.ctx.reader.is_present(),
            transfer: self.ctx.transfers.progress(),
        }
    }

    /// List recognized e-books on the given shelf. A disconnected reader
    /// lists as empty rather than failing.
    pub fn list_files(&self, shelf: Shelf) -> Result<Vec<FileEntry>, ApiError> {
        if shelf == Shelf::Reader && !self.ctx.reader.is_present() {
            return Ok(Vec::new());
        }

        let mut entries = scan_shelf(self.root_for(shelf))
            .map_err(|source| ApiError::ListFailed { shelf, source })?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Copy a book between the shelves. Runs to completion (or
    /// cancellation) within the calling request context.
    pub async fn start_transfer(
        &self,
        source: Shelf,
        destination: Shelf,
        filename: &str,
    ) -> Result<(), ApiError> {
        if source == destination {
            return Err(ApiError::SameShelf);
        }
        if !is_plain_filename(filename) {
            return Err(ApiError::InvalidFilename);
        }

        let request = TransferRequest {
            source_root: self.root_for(source).to_path_buf(),
            dest_root: self.root_for(destination).to_path_buf(),
            filename: filename.to_string(),
        };

        // cheap pre-check so a rejected request leaves the indicator alone;
        // the engine's test-and-set stays authoritative
        if self.ctx.transfers.progress().is_some_and(|s| s.active) {
            return Err(TransferError::Busy.into());
        }

        self.ctx.indicator.set(IndicatorState::Transferring);
        let result = self.ctx.transfers.start(request).await;

        // Busy leaves the running transfer (and its indicator) alone
        if !matches!(result, Err(TransferError::Busy)) {
            let next = match &result {
                Ok(()) | Err(TransferError::Cancelled) => {
                    if self.ctx.reader.is_present() {
                        IndicatorState::DeviceConnected
                    } else {
                        IndicatorState::Idle
                    }
                }
                Err(_) => IndicatorState::Error,
            };
            self.ctx.indicator.set(next);
        }

        result.map_err(ApiError::from)
    }

    pub fn transfer_progress(&self) -> Option<TransferSession> {
        self.ctx.transfers.progress()
    }

    /// Returns whether a transfer was active to be cancelled.
    pub fn cancel_transfer(&self) -> bool {
        self.ctx.transfers.cancel()
    }

    pub async fn eject(&self) -> Result<(), ApiError> {
        self.ctx.reader.request_eject().await.map_err(ApiError::from)
    }

    /// Low-power shutdown request: stops the daemon; the platform layer
    /// handles the actual power gating.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.ctx.shutdown.cancel();
    }

    fn root_for(&self, shelf: Shelf) -> &Path {
        match shelf {
            Shelf::Library => &self.ctx.config.library_root,
            Shelf::Reader => &self.ctx.config.reader_root,
        }
    }
}

fn scan_shelf(root: &Path) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_ebook(name) {
            entries.push(FileEntry {
                name: name.to_string(),
                size: metadata.len(),
            });
        }
    }
    Ok(entries)
}

fn is_ebook(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            EBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}
