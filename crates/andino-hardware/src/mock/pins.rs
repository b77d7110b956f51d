//! In-memory GPIO.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::traits::PinDriver;
use crate::{HardwareError, Result, lock};

#[derive(Debug, Default)]
struct PinBank {
    levels: HashMap<u32, bool>,
    outputs: HashSet<u32>,
    exported: HashSet<u32>,
    releases: HashMap<u32, usize>,
}

/// Pins that live in a shared map.
///
/// Clones share state, so a test keeps one clone to drive input levels and
/// observe outputs while the emulator owns another.
///
/// ```
/// use andino_hardware::mock::MockPins;
/// use andino_hardware::PinDriver;
///
/// let pins = MockPins::new();
/// pins.setup_output(5, false).unwrap();
/// pins.write(5, true).unwrap();
/// assert!(pins.level(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPins {
    bank: Arc<Mutex<PinBank>>,
}

impl MockPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the level an input will read.
    pub fn set_level(&self, pin: u32, level: bool) {
        lock(&self.bank).levels.insert(pin, level);
    }

    /// Current level of `pin`; unset pins read low.
    pub fn level(&self, pin: u32) -> bool {
        lock(&self.bank).levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn is_output(&self, pin: u32) -> bool {
        lock(&self.bank).outputs.contains(&pin)
    }

    /// How many times `pin` was released.
    pub fn release_count(&self, pin: u32) -> usize {
        lock(&self.bank).releases.get(&pin).copied().unwrap_or(0)
    }
}

impl PinDriver for MockPins {
    fn name(&self) -> &str {
        "mock"
    }

    fn setup_input(&self, pin: u32) -> Result<()> {
        let mut bank = lock(&self.bank);
        bank.outputs.remove(&pin);
        bank.exported.insert(pin);
        Ok(())
    }

    fn setup_output(&self, pin: u32, level: bool) -> Result<()> {
        let mut bank = lock(&self.bank);
        bank.outputs.insert(pin);
        bank.exported.insert(pin);
        bank.levels.insert(pin, level);
        Ok(())
    }

    fn read(&self, pin: u32) -> Result<bool> {
        let bank = lock(&self.bank);
        if !bank.exported.contains(&pin) {
            return Err(HardwareError::not_running(format!("pin {pin}")));
        }
        Ok(bank.levels.get(&pin).copied().unwrap_or(false))
    }

    fn write(&self, pin: u32, level: bool) -> Result<()> {
        let mut bank = lock(&self.bank);
        if !bank.outputs.contains(&pin) {
            return Err(HardwareError::invalid_argument(format!("pin {pin} is not an output")));
        }
        bank.levels.insert(pin, level);
        Ok(())
    }

    fn release(&self, pin: u32) -> Result<()> {
        let mut bank = lock(&self.bank);
        bank.exported.remove(&pin);
        bank.outputs.remove(&pin);
        *bank.releases.entry(pin).or_default() += 1;
        Ok(())
    }
}
