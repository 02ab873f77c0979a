//! Wi-Fi control plane backed by NetworkManager's `nmcli`.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::core::connectivity::NetworkAdapter;
use crate::core::credentials::WifiCredentials;
use crate::core::error::NetworkError;

const NMCLI_BINARIES: &[&str] = &["/usr/bin/nmcli", "/bin/nmcli", "/usr/sbin/nmcli"];

/// Joins networks and raises the provisioning hotspot through `nmcli`.
pub struct NmcliNetwork {
    /// Wireless interface to pin commands to, when known.
    interface: Option<String>,
}

impl NmcliNetwork {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    fn run(&self, args: Vec<OsString>) -> Result<(), String> {
        let mut full_args = args;
        if let Some(interface) = &self.interface {
            full_args.push(OsString::from("ifname"));
            full_args.push(OsString::from(interface));
        }

        let output = run_external(NMCLI_BINARIES, &full_args)?;
        if output.success {
            Ok(())
        } else {
            Err(output.stderr)
        }
    }
}

impl NetworkAdapter for NmcliNetwork {
    fn join(&self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let mut args = vec![
            OsString::from("dev"),
            OsString::from("wifi"),
            OsString::from("connect"),
            OsString::from(&credentials.network_name),
        ];
        if !credentials.secret.is_empty() {
            args.push(OsString::from("password"));
            args.push(OsString::from(&credentials.secret));
        }

        debug!(ssid = %credentials.network_name, "joining via nmcli");
        self.run(args).map_err(|reason| NetworkError::JoinFailed {
            ssid: credentials.network_name.clone(),
            reason,
        })?;

        info!(ssid = %credentials.network_name, "joined network");
        Ok(())
    }

    fn start_access_point(&self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        let mut args = vec![
            OsString::from("dev"),
            OsString::from("wifi"),
            OsString::from("hotspot"),
            OsString::from("ssid"),
            OsString::from(ssid),
        ];
        if !password.is_empty() {
            args.push(OsString::from("password"));
            args.push(OsString::from(password));
        }

        self.run(args)
            .map_err(|reason| NetworkError::AccessPointFailed {
                ssid: ssid.to_string(),
                reason,
            })?;

        info!(ssid = %ssid, "access point up");
        Ok(())
    }
}

struct ExternalOutput {
    success: bool,
    stderr: String,
}

/// Try each binary in `candidates` until one exists and executes.
fn run_external(candidates: &[&str], args: &[OsString]) -> Result<ExternalOutput, String> {
    for candidate in candidates {
        if !Path::new(candidate).exists() {
            continue;
        }
        let output = Command::new(candidate)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| e.to_string())?;
        return Ok(ExternalOutput {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Err(format!("none of {:?} are available", candidates))
}
