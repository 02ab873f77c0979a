//! Boot-time connectivity acquisition.
//!
//! One bounded attempt to join with stored credentials, then a
//! deterministic fallback into provisioning mode. There is no retry loop:
//! the device must become reachable one way or the other.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::core::credentials::WifiCredentials;
use crate::core::error::NetworkError;

/// Wi-Fi control plane.
pub trait NetworkAdapter: Send + Sync {
    /// Try to join the given network. Blocks until joined or failed; the
    /// caller applies the overall deadline.
    fn join(&self, credentials: &WifiCredentials) -> Result<(), NetworkError>;

    /// Start the local provisioning access point.
    fn start_access_point(&self, ssid: &str, password: &str) -> Result<(), NetworkError>;
}

/// Operating mode decided at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Library,
    Provisioning,
}

/// How the single join attempt ended.
#[derive(Debug)]
pub enum ProvisioningResult {
    Joined,
    NoCredentials,
    TimedOut,
    JoinFailed(NetworkError),
}

/// Run the boot state machine: try stored credentials once within
/// `join_timeout`, then fall back. Never hangs, never retries.
pub async fn acquire(
    adapter: Arc<dyn NetworkAdapter>,
    stored: Option<WifiCredentials>,
    join_timeout: Duration,
) -> Mode {
    let result = match stored {
        None => ProvisioningResult::NoCredentials,
        Some(credentials) => {
            let ssid = credentials.network_name.clone();
            info!(ssid = %ssid, "trying stored credentials");

            let join = tokio::task::spawn_blocking(move || adapter.join(&credentials));
            match timeout(join_timeout, join).await {
                Ok(Ok(Ok(()))) => ProvisioningResult::Joined,
                Ok(Ok(Err(e))) => ProvisioningResult::JoinFailed(e),
                Ok(Err(e)) => ProvisioningResult::JoinFailed(NetworkError::JoinFailed {
                    ssid,
                    reason: e.to_string(),
                }),
                // the blocking join keeps running in the background; real
                // adapters carry their own internal deadline as well
                Err(_) => ProvisioningResult::TimedOut,
            }
        }
    };

    match result {
        ProvisioningResult::Joined => {
            info!("network joined, entering library mode");
            Mode::Library
        }
        ProvisioningResult::NoCredentials => {
            info!("no stored credentials, entering provisioning mode");
            Mode::Provisioning
        }
        ProvisioningResult::TimedOut => {
            warn!(timeout = ?join_timeout, "join timed out, entering provisioning mode");
            Mode::Provisioning
        }
        ProvisioningResult::JoinFailed(e) => {
            warn!(error = %e, "join failed, entering provisioning mode");
            Mode::Provisioning
        }
    }
}
