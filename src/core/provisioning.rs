//! Credential intake while the device runs its own access point.
//!
//! Submissions arrive from the captive-portal form or from a short-range
//! wireless write (a collaborator feeding the same channel). A valid
//! submission is persisted and the restart token is triggered so the next
//! boot joins with the new credentials; the supervisor brings the daemon
//! back up.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::credentials::{CredentialStore, WifiCredentials};
use crate::core::error::CredentialStoreError;

/// WPA2 lower bound; an empty secret means an open network.
const MIN_SECRET_LEN: usize = 8;

/// A credential submission from the portal or the wireless service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningSubmission {
    pub network_name: String,
    pub secret: String,
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("network name must not be empty")]
    EmptyNetworkName,

    #[error("secret must be empty (open network) or at least {MIN_SECRET_LEN} characters")]
    SecretTooShort,

    #[error(transparent)]
    Store(#[from] CredentialStoreError),

    #[error("provisioning channel is closed")]
    ChannelClosed,
}

type Reply = oneshot::Sender<Result<(), SubmissionError>>;

/// Cloneable intake handle; all submissions funnel through one loop.
#[derive(Clone)]
pub struct ProvisioningChannel {
    tx: mpsc::Sender<(ProvisioningSubmission, Reply)>,
}

impl ProvisioningChannel {
    /// Spawn the intake loop. `restart` is triggered after a successful
    /// save to hand the device off to a fresh boot.
    pub fn spawn(store: Arc<dyn CredentialStore>, restart: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::channel::<(ProvisioningSubmission, Reply)>(8);

        tokio::spawn(async move {
            while let Some((submission, reply)) = rx.recv().await {
                let result = accept(store.as_ref(), &submission);
                let accepted = result.is_ok();
                let _ = reply.send(result);

                if accepted {
                    info!(
                        ssid = %submission.network_name,
                        "credentials saved, restarting to join"
                    );
                    restart.cancel();
                    break;
                }
            }
        });

        Self { tx }
    }

    pub async fn submit(&self, submission: ProvisioningSubmission) -> Result<(), SubmissionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((submission, reply_tx))
            .await
            .map_err(|_| SubmissionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SubmissionError::ChannelClosed)?
    }
}

fn accept(
    store: &dyn CredentialStore,
    submission: &ProvisioningSubmission,
) -> Result<(), SubmissionError> {
    let network_name = submission.network_name.trim();
    let secret = submission.secret.trim();

    if network_name.is_empty() {
        return Err(SubmissionError::EmptyNetworkName);
    }
    if !secret.is_empty() && secret.len() < MIN_SECRET_LEN {
        return Err(SubmissionError::SecretTooShort);
    }

    let credentials = WifiCredentials {
        network_name: network_name.to_string(),
        secret: secret.to_string(),
    };

    if let Err(e) = store.save(&credentials) {
        warn!(error = %e, "failed to persist credentials");
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::FileCredentialStore;
    use tempfile::tempdir;

    fn channel_with_store(
        dir: &std::path::Path,
    ) -> (ProvisioningChannel, Arc<FileCredentialStore>, CancellationToken) {
        let store = Arc::new(FileCredentialStore::new(dir.join("wifi.toml")));
        let restart = CancellationToken::new();
        let channel = ProvisioningChannel::spawn(store.clone(), restart.clone());
        (channel, store, restart)
    }

    #[tokio::test]
    async fn valid_submission_persists_and_triggers_restart() {
        let temp = tempdir().unwrap();
        let (channel, store, restart) = channel_with_store(temp.path());

        channel
            .submit(ProvisioningSubmission {
                network_name: "HomeNet".to_string(),
                secret: "hunter22".to_string(),
            })
            .await
            .unwrap();

        restart.cancelled().await;
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.network_name, "HomeNet");
        assert_eq!(saved.secret, "hunter22");
    }

    #[tokio::test]
    async fn open_network_secret_is_accepted() {
        let temp = tempdir().unwrap();
        let (channel, store, restart) = channel_with_store(temp.path());

        channel
            .submit(ProvisioningSubmission {
                network_name: "CafeNet".to_string(),
                secret: String::new(),
            })
            .await
            .unwrap();

        restart.cancelled().await;
        assert_eq!(store.load().unwrap().unwrap().secret, "");
    }

    #[tokio::test]
    async fn short_secret_is_rejected_without_saving() {
        let temp = tempdir().unwrap();
        let (channel, store, restart) = channel_with_store(temp.path());

        let err = channel
            .submit(ProvisioningSubmission {
                network_name: "HomeNet".to_string(),
                secret: "short".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::SecretTooShort));
        assert_eq!(store.load().unwrap(), None);
        assert!(!restart.is_cancelled());
    }

    #[tokio::test]
    async fn empty_network_name_is_rejected() {
        let temp = tempdir().unwrap();
        let (channel, _store, restart) = channel_with_store(temp.path());

        let err = channel
            .submit(ProvisioningSubmission {
                network_name: "   ".to_string(),
                secret: "hunter22".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::EmptyNetworkName));
        assert!(!restart.is_cancelled());
    }
}
