//! Persisted Wi-Fi credentials.
//!
//! Written by the provisioning channel, read once at boot by the
//! connectivity manager. The file store keeps a single TOML document with
//! owner-only permissions.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::CredentialStoreError;

/// Wi-Fi join credentials. An empty secret means an open network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub network_name: String,
    pub secret: String,
}

pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &WifiCredentials) -> Result<(), CredentialStoreError>;
    fn load(&self) -> Result<Option<WifiCredentials>, CredentialStoreError>;
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// TOML-file-backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, credentials: &WifiCredentials) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(CredentialStoreError::Write)?;
        }

        let content = toml::to_string_pretty(credentials)
            .map_err(|e| CredentialStoreError::Write(std::io::Error::other(e)))?;
        fs::write(&self.path, content).map_err(CredentialStoreError::Write)?;

        // secret material: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(CredentialStoreError::Write)?;
        }

        Ok(())
    }

    fn load(&self) -> Result<Option<WifiCredentials>, CredentialStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialStoreError::Read(e)),
        };

        let credentials = toml::from_str(&content)?;
        Ok(Some(credentials))
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialStoreError::Write(e)),
        }
    }
}
