use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/shelfd/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Mount point of the permanently attached book storage.
    pub library_root: PathBuf,
    /// Mount point the removable reader is mounted at while present.
    pub reader_root: PathBuf,
    /// Persisted Wi-Fi credentials.
    pub credentials_path: PathBuf,
    pub http_port: u16,
    /// Access point advertised in provisioning mode.
    pub ap_ssid: String,
    pub ap_password: String,
    /// Bound on the boot-time join attempt with stored credentials.
    pub join_timeout_secs: u64,
    pub led_count: usize,
    /// Directory of per-LED sysfs entries; falls back to a simulated strip
    /// when unset.
    pub leds_dir: Option<PathBuf>,
    /// Sysfs GPIO value file for the eject button; simulated when unset.
    pub button_gpio: Option<PathBuf>,
    pub button_poll_ms: u64,
    pub simulation: bool,
    pub verbose: bool,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("/var/lib/shelfd/library"),
            reader_root: PathBuf::from("/run/shelfd/reader"),
            credentials_path: PathBuf::from("/var/lib/shelfd/wifi.toml"),
            http_port: 80,
            ap_ssid: "Shelf-Setup".to_string(),
            ap_password: "sharebooks".to_string(),
            join_timeout_secs: 20,
            led_count: 8,
            leds_dir: None,
            button_gpio: None,
            button_poll_ms: 25,
            simulation: false,
            verbose: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then the system config file, then `SHELFD_*`
    /// environment variables, then CLI overrides.
    pub fn new<T: Serialize>(cli: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(DEFAULT_CONFIG_PATH))
            .merge(Env::prefixed("SHELFD_"));

        if let Some(cli) = cli {
            figment = figment.merge(Serialized::defaults(cli));
        }

        Ok(figment.extract()?)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms.max(1))
    }
}
