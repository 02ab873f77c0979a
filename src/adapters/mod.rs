//! Driver construction for the two profiles: real hardware and simulation.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::button::ButtonInput;
use crate::core::connectivity::NetworkAdapter;
use crate::core::hardware::StorageAdapter;
use crate::core::indicator::LedStrip;

pub mod gpio;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod net;
pub mod simulated;

pub use simulated::{
    ButtonProbe, SimulatedButton, SimulatedNetwork, SimulatedStorage, SimulatedStrip,
    StorageController, StripProbe,
};

/// The full driver complement the orchestrator runs against.
pub struct DriverSet {
    pub storage: Arc<dyn StorageAdapter>,
    pub network: Arc<dyn NetworkAdapter>,
    pub strip: Box<dyn LedStrip>,
    pub button: Box<dyn ButtonInput>,
}

pub fn drivers(config: &AppConfig) -> Result<DriverSet> {
    if config.simulation {
        return Ok(simulation_drivers(config));
    }
    hardware_drivers(config)
}

fn simulation_drivers(config: &AppConfig) -> DriverSet {
    let (storage, controller) = SimulatedStorage::new();
    let (button, presser) = SimulatedButton::new();
    let (strip, _probe) = SimulatedStrip::new(config.led_count);

    // interactive control over stdin: `attach [id]`, `detach`, `press`
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lines() {
            let Ok(line) = line else { break };
            let parts: Vec<&str> = line.trim().split_whitespace().collect();
            match parts.first().copied() {
                Some("attach") => controller.attach_device(parts.get(1).unwrap_or(&"sim0"), 512),
                Some("detach") => controller.detach_device(),
                Some("press") => {
                    presser.press();
                    std::thread::sleep(std::time::Duration::from_millis(150));
                    presser.release();
                }
                Some(other) => {
                    eprintln!("(simulator) unknown command {other:?}; use attach/detach/press")
                }
                None => {}
            }
        }
    });

    info!("simulation drivers active; control via stdin (attach/detach/press)");
    DriverSet {
        storage: Arc::new(storage),
        network: Arc::new(SimulatedNetwork::new()),
        strip: Box::new(strip),
        button: Box::new(button),
    }
}

#[cfg(target_os = "linux")]
fn hardware_drivers(config: &AppConfig) -> Result<DriverSet> {
    let strip: Box<dyn LedStrip> = match &config.leds_dir {
        Some(dir) => Box::new(gpio::SysfsLedStrip::discover(dir, config.led_count)?),
        None => {
            warn!("no leds_dir configured, indicator runs against a simulated strip");
            Box::new(SimulatedStrip::new(config.led_count).0)
        }
    };

    let button: Box<dyn ButtonInput> = match &config.button_gpio {
        Some(path) => Box::new(gpio::SysfsButton::new(path.clone(), true)),
        None => {
            warn!("no button_gpio configured, eject is API-only");
            Box::new(SimulatedButton::new().0)
        }
    };

    Ok(DriverSet {
        storage: Arc::new(linux::LinuxStorage::new()),
        network: Arc::new(net::NmcliNetwork::new(None)),
        strip,
        button,
    })
}

#[cfg(not(target_os = "linux"))]
fn hardware_drivers(_config: &AppConfig) -> Result<DriverSet> {
    anyhow::bail!("hardware drivers are linux-only; run with --simulation")
}
