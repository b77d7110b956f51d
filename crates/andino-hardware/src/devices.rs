//! Enum wrappers for device dispatch.
//!
//! The device traits use native `async fn` and are not object-safe, so
//! `Box<dyn HardwareBackend>` is not an option. These enums give concrete
//! dispatch instead: the server is generic over nothing and holds exactly one
//! wrapper per device kind, chosen at startup.
//!
//! ```
//! use andino_hardware::devices::AnyKeypad;
//! use andino_hardware::mock::MockKeypad;
//! use andino_hardware::event_channel;
//!
//! let (events, _rx) = event_channel(8);
//! let (keypad, _handle) = MockKeypad::new(events);
//! let keypad = AnyKeypad::Mock(keypad);
//! ```

use andino_core::EmulatorSettings;

use crate::emulator::EmulatorBackend;
use crate::mock::{MockDisplay, MockKeypad, MockOled};
use crate::serial::SerialBackend;
use crate::traits::{HardwareBackend, KeypadRfid, OledPanel, TouchDisplay};
use crate::Result;

/// The active I/O backend.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyBackend {
    /// X1 controller on a serial port.
    Serial(SerialBackend),
    /// GPIO emulation of the X1 command set.
    Emulator(EmulatorBackend),
}

impl AnyBackend {
    /// Runtime settings worth persisting; only the emulator has any.
    pub fn emulator_settings(&self) -> Option<EmulatorSettings> {
        match self {
            Self::Emulator(b) => Some(b.settings()),
            Self::Serial(_) => None,
        }
    }

    pub fn as_emulator(&self) -> Option<&EmulatorBackend> {
        match self {
            Self::Emulator(b) => Some(b),
            Self::Serial(_) => None,
        }
    }
}

impl From<SerialBackend> for AnyBackend {
    fn from(backend: SerialBackend) -> Self {
        Self::Serial(backend)
    }
}

impl From<EmulatorBackend> for AnyBackend {
    fn from(backend: EmulatorBackend) -> Self {
        Self::Emulator(backend)
    }
}

impl HardwareBackend for AnyBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Serial(b) => b.name(),
            Self::Emulator(b) => b.name(),
        }
    }

    async fn start(&self) -> Result<()> {
        match self {
            Self::Serial(b) => b.start().await,
            Self::Emulator(b) => b.start().await,
        }
    }

    async fn stop(&self) -> Result<()> {
        match self {
            Self::Serial(b) => b.stop().await,
            Self::Emulator(b) => b.stop().await,
        }
    }

    fn is_running(&self) -> bool {
        match self {
            Self::Serial(b) => b.is_running(),
            Self::Emulator(b) => b.is_running(),
        }
    }

    fn supports_temperature(&self) -> bool {
        match self {
            Self::Serial(b) => b.supports_temperature(),
            Self::Emulator(b) => b.supports_temperature(),
        }
    }

    async fn reset(&self) -> Result<String> {
        match self {
            Self::Serial(b) => b.reset().await,
            Self::Emulator(b) => b.reset().await,
        }
    }

    async fn info(&self) -> Result<String> {
        match self {
            Self::Serial(b) => b.info().await,
            Self::Emulator(b) => b.info().await,
        }
    }

    async fn hardware(&self, mode: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.hardware(mode).await,
            Self::Emulator(b) => b.hardware(mode).await,
        }
    }

    async fn set_polling(&self, ms: u64) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_polling(ms).await,
            Self::Emulator(b) => b.set_polling(ms).await,
        }
    }

    async fn set_skip(&self, count: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_skip(count).await,
            Self::Emulator(b) => b.set_skip(count).await,
        }
    }

    async fn set_edge_detection(&self, pull_up: bool) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_edge_detection(pull_up).await,
            Self::Emulator(b) => b.set_edge_detection(pull_up).await,
        }
    }

    async fn set_send_time(&self, ms: u64) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_send_time(ms).await,
            Self::Emulator(b) => b.set_send_time(ms).await,
        }
    }

    async fn set_broadcast_on_change(&self, enabled: bool) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_broadcast_on_change(enabled).await,
            Self::Emulator(b) => b.set_broadcast_on_change(enabled).await,
        }
    }

    async fn set_change_pattern(&self, pattern: &[bool]) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_change_pattern(pattern).await,
            Self::Emulator(b) => b.set_change_pattern(pattern).await,
        }
    }

    async fn get_counters(&self, mode: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.get_counters(mode).await,
            Self::Emulator(b) => b.get_counters(mode).await,
        }
    }

    async fn set_debounce(&self, ms: u64) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_debounce(ms).await,
            Self::Emulator(b) => b.set_debounce(ms).await,
        }
    }

    async fn set_power(&self, value: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_power(value).await,
            Self::Emulator(b) => b.set_power(value).await,
        }
    }

    async fn set_send_relays_status(&self, enabled: bool) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_send_relays_status(enabled).await,
            Self::Emulator(b) => b.set_send_relays_status(enabled).await,
        }
    }

    async fn set_relay(&self, relay: u8, on: bool) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_relay(relay, on).await,
            Self::Emulator(b) => b.set_relay(relay, on).await,
        }
    }

    async fn pulse_relay(&self, relay: u8, ms: u64) -> Result<String> {
        match self {
            Self::Serial(b) => b.pulse_relay(relay, ms).await,
            Self::Emulator(b) => b.pulse_relay(relay, ms).await,
        }
    }

    async fn set_temp_broadcast_timer(&self, ms: u64) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_temp_broadcast_timer(ms).await,
            Self::Emulator(b) => b.set_temp_broadcast_timer(ms).await,
        }
    }

    async fn get_temp(&self) -> Result<String> {
        match self {
            Self::Serial(b) => b.get_temp().await,
            Self::Emulator(b) => b.get_temp().await,
        }
    }

    async fn set_bus(&self, count: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.set_bus(count).await,
            Self::Emulator(b) => b.set_bus(count).await,
        }
    }

    async fn get_addresses(&self, bus: u32) -> Result<String> {
        match self {
            Self::Serial(b) => b.get_addresses(bus).await,
            Self::Emulator(b) => b.get_addresses(bus).await,
        }
    }
}

/// Keypad/RFID controller.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyKeypad {
    Mock(MockKeypad),
}

impl KeypadRfid for AnyKeypad {
    async fn start(&self) -> Result<()> {
        match self {
            Self::Mock(device) => device.start().await,
        }
    }

    async fn stop(&self) -> Result<()> {
        match self {
            Self::Mock(device) => device.stop().await,
        }
    }

    async fn buzz(&self, ms: u64) -> Result<()> {
        match self {
            Self::Mock(device) => device.buzz(ms).await,
        }
    }
}

/// Touch display.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyDisplay {
    Mock(MockDisplay),
}

impl TouchDisplay for AnyDisplay {
    async fn start(&self) -> Result<()> {
        match self {
            Self::Mock(device) => device.start().await,
        }
    }

    async fn stop(&self) -> Result<()> {
        match self {
            Self::Mock(device) => device.stop().await,
        }
    }

    async fn set_page(&self, page: &str) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_page(page).await,
        }
    }

    async fn set_text(&self, object: &str, text: &str) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_text(object, text).await,
        }
    }

    async fn set_attr(&self, object: &str, attribute: &str, value: &str) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_attr(object, attribute, value).await,
        }
    }

    async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Mock(device) => device.send_raw(bytes).await,
        }
    }
}

/// OLED panel.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyOled {
    Mock(MockOled),
}

impl OledPanel for AnyOled {
    async fn set_mode(&self, mode: &str, arg: Option<&str>) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_mode(mode, arg).await,
        }
    }

    async fn set_text(&self, lines: &[Vec<String>]) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_text(lines).await,
        }
    }
}
