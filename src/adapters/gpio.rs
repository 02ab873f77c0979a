//! Sysfs-backed button and LED drivers.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::core::button::ButtonInput;
use crate::core::indicator::{LedStrip, Rgb};

/// Reads a sysfs GPIO `value` file ("0"/"1") for the eject button.
pub struct SysfsButton {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsButton {
    pub fn new(value_path: PathBuf, active_low: bool) -> Self {
        Self {
            value_path,
            active_low,
        }
    }
}

impl ButtonInput for SysfsButton {
    fn is_pressed(&self) -> bool {
        // a missing or unreadable line reads as released
        let Ok(raw) = fs::read_to_string(&self.value_path) else {
            return false;
        };
        let high = raw.trim() == "1";
        high != self.active_low
    }
}

/// Drives a row of `/sys/class/leds/<name>/brightness` entries.
///
/// Single-channel LEDs cannot show color, so each pixel is collapsed to its
/// brightest channel.
pub struct SysfsLedStrip {
    led_dirs: Vec<PathBuf>,
    staged: Vec<Rgb>,
}

impl SysfsLedStrip {
    /// One LED per subdirectory of `base`, in name order.
    pub fn discover(base: &std::path::Path, max_leds: usize) -> std::io::Result<Self> {
        let mut led_dirs: Vec<PathBuf> = fs::read_dir(base)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join("brightness").exists())
            .collect();
        led_dirs.sort();
        led_dirs.truncate(max_leds);

        let count = led_dirs.len();
        Ok(Self {
            led_dirs,
            staged: vec![Rgb::OFF; count],
        })
    }
}

impl LedStrip for SysfsLedStrip {
    fn len(&self) -> usize {
        self.led_dirs.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.staged.get_mut(index) {
            *pixel = color;
        }
    }

    fn refresh(&mut self) {
        for (dir, pixel) in self.led_dirs.iter().zip(&self.staged) {
            let brightness = pixel.r.max(pixel.g).max(pixel.b);
            if let Err(e) = fs::write(dir.join("brightness"), brightness.to_string()) {
                debug!(led = %dir.display(), error = %e, "failed to write brightness");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn button_reads_value_file() {
        let temp = tempdir().unwrap();
        let value = temp.path().join("value");

        fs::write(&value, "0\n").unwrap();
        let button = SysfsButton::new(value.clone(), false);
        assert!(!button.is_pressed());

        fs::write(&value, "1\n").unwrap();
        assert!(button.is_pressed());
    }

    #[test]
    fn active_low_button_inverts() {
        let temp = tempdir().unwrap();
        let value = temp.path().join("value");

        fs::write(&value, "1\n").unwrap();
        let button = SysfsButton::new(value.clone(), true);
        assert!(!button.is_pressed());

        fs::write(&value, "0\n").unwrap();
        assert!(button.is_pressed());
    }

    #[test]
    fn missing_value_file_reads_released() {
        let button = SysfsButton::new(PathBuf::from("/nonexistent/value"), false);
        assert!(!button.is_pressed());
    }

    #[test]
    fn strip_writes_brightness_per_led() {
        let temp = tempdir().unwrap();
        for name in ["led0", "led1"] {
            let dir = temp.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("brightness"), "0").unwrap();
        }

        let mut strip = SysfsLedStrip::discover(temp.path(), 8).unwrap();
        assert_eq!(strip.len(), 2);

        strip.set_pixel(0, Rgb::new(10, 200, 30));
        strip.set_pixel(1, Rgb::OFF);
        strip.refresh();

        assert_eq!(
            fs::read_to_string(temp.path().join("led0/brightness")).unwrap(),
            "200"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("led1/brightness")).unwrap(),
            "0"
        );
    }
}
