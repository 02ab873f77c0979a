use std::path::PathBuf;
use thiserror::Error;

/// Errors from the removable-device session.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to mount device at {root}: {reason}")]
    MountFailed { root: PathBuf, reason: String },

    #[error("failed to unmount {root}: {reason}")]
    UnmountFailed { root: PathBuf, reason: String },

    #[error("no device connected")]
    NotConnected,

    #[error("device session is no longer running")]
    SessionClosed,
}

/// Errors surfaced by the transfer engine as result values.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("cannot read source file: {0}")]
    SourceUnreadable(#[source] std::io::Error),

    #[error("cannot open destination file: {0}")]
    DestinationUnwritable(#[source] std::io::Error),

    #[error("write to destination failed: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("a transfer is already in progress")]
    Busy,
}

/// Errors from the Wi-Fi control plane. Never fatal: a failed join routes
/// the device into provisioning mode instead.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("failed to join network `{ssid}`: {reason}")]
    JoinFailed { ssid: String, reason: String },

    #[error("failed to start access point `{ssid}`: {reason}")]
    AccessPointFailed { ssid: String, reason: String },
}

/// Errors from the persisted credential store.
#[derive(Error, Debug)]
pub enum CredentialStoreError {
    #[error("failed to read credential file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write credential file: {0}")]
    Write(#[source] std::io::Error),

    #[error("credential file is malformed: {0}")]
    Malformed(#[from] toml::de::Error),
}
