//! Linux sysfs GPIO (`/sys/class/gpio`).
//!
//! sysfs GPIO is deprecated since Linux 4.8 but is still what the Andino
//! board images ship with.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use crate::traits::PinDriver;
use crate::{HardwareError, Result};

const EXPORT_RETRIES: usize = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SysfsPins {
    base: PathBuf,
}

impl SysfsPins {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.base.join(format!("gpio{pin}"))
    }

    fn write_attr(&self, path: &Path, value: &str) -> Result<()> {
        trace!(path = %path.display(), value, "sysfs write");
        fs::write(path, value).map_err(|e| {
            HardwareError::gpio(format!("write {value:?} to {}: {e}", path.display()))
        })
    }

    /// Export `pin` unless the kernel already did.
    fn ensure_exported(&self, pin: u32) -> Result<()> {
        let dir = self.pin_dir(pin);
        if dir.exists() {
            return Ok(());
        }
        self.write_attr(&self.base.join("export"), &pin.to_string())?;
        // udev needs a moment to create the pin directory
        for _ in 0..EXPORT_RETRIES {
            if dir.exists() {
                debug!(pin, "GPIO exported");
                return Ok(());
            }
            std::thread::sleep(EXPORT_RETRY_DELAY);
        }
        Err(HardwareError::open_failed(format!(
            "GPIO {pin} did not appear under {}",
            self.base.display()
        )))
    }
}

impl Default for SysfsPins {
    fn default() -> Self {
        Self::new(andino_core::constants::DEFAULT_GPIO_BASE_PATH)
    }
}

impl PinDriver for SysfsPins {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn setup_input(&self, pin: u32) -> Result<()> {
        self.ensure_exported(pin)?;
        self.write_attr(&self.pin_dir(pin).join("direction"), "in")
    }

    fn setup_output(&self, pin: u32, level: bool) -> Result<()> {
        self.ensure_exported(pin)?;
        // "high"/"low" sets direction and initial level without a glitch
        let direction = if level { "high" } else { "low" };
        self.write_attr(&self.pin_dir(pin).join("direction"), direction)
    }

    fn read(&self, pin: u32) -> Result<bool> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path).map_err(|e| {
            HardwareError::gpio(format!("read {}: {e}", path.display()))
        })?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(HardwareError::bad_reading(format!(
                "GPIO {pin} value {other:?}"
            ))),
        }
    }

    fn write(&self, pin: u32, level: bool) -> Result<()> {
        self.write_attr(&self.pin_dir(pin).join("value"), if level { "1" } else { "0" })
    }

    fn release(&self, pin: u32) -> Result<()> {
        if !self.pin_dir(pin).exists() {
            return Ok(());
        }
        self.write_attr(&self.base.join("unexport"), &pin.to_string())
    }
}
