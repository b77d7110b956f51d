//! Hardware device trait definitions.
//!
//! [`HardwareBackend`] is the command surface shared by the serial controller
//! and the GPIO emulator. Every command returns the confirmation line that is
//! echoed to clients. The peripheral traits cover the optional keypad/RFID
//! controller, touch display and OLED panel.
//!
//! All async traits use native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT) and are therefore not object-safe; see [`devices`](crate::devices)
//! for the enum wrappers used for dispatch. [`PinDriver`] is synchronous and
//! used as a trait object.

#![allow(async_fn_in_trait)]

use std::fmt;

use crate::HardwareError;
use crate::error::Result;

/// Command surface of an I/O controller.
///
/// Exactly one backend serves a server instance. Methods take `&self`:
/// commands from several client connections may be in flight at once and
/// implementations synchronise internally.
///
/// Optional capabilities have default bodies that fail with
/// [`HardwareError::Unsupported`], so callers never need to know which
/// variant they talk to.
///
/// # Examples
///
/// ```no_run
/// use andino_hardware::traits::HardwareBackend;
/// use andino_hardware::Result;
///
/// async fn close_gate<B: HardwareBackend>(backend: &B) -> Result<String> {
///     backend.pulse_relay(1, 500).await
/// }
/// ```
pub trait HardwareBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Acquire I/O resources and start background work.
    async fn start(&self) -> Result<()>;

    /// Stop background work and release I/O resources exactly once.
    async fn stop(&self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// `RESET`
    async fn reset(&self) -> Result<String>;

    /// `INFO`
    async fn info(&self) -> Result<String>;

    /// `HARD <mode>`
    async fn hardware(&self, mode: u32) -> Result<String>;

    /// `POLL <ms>`: hold time before an active input counts.
    async fn set_polling(&self, ms: u64) -> Result<String>;

    /// `SKIP <n>`
    async fn set_skip(&self, count: u32) -> Result<String>;

    /// `EDGE <0|1>`: input polarity.
    async fn set_edge_detection(&self, pull_up: bool) -> Result<String>;

    /// `SEND <ms>`: periodic status broadcast, `0` disables.
    async fn set_send_time(&self, ms: u64) -> Result<String>;

    /// `CHNG <0|1>`
    async fn set_broadcast_on_change(&self, enabled: bool) -> Result<String>;

    /// `CHNP <bits>`: inputs that trigger a broadcast on change.
    async fn set_change_pattern(&self, pattern: &[bool]) -> Result<String> {
        let _ = pattern;
        Err(HardwareError::unsupported("CHNP"))
    }

    /// `CNTR <mode>`: counter snapshot; `0` counters only, `1` adds inputs,
    /// `2` adds relays.
    async fn get_counters(&self, mode: u32) -> Result<String>;

    /// `DEBO <ms>`
    async fn set_debounce(&self, ms: u64) -> Result<String>;

    /// `POWR <n>`
    async fn set_power(&self, value: u32) -> Result<String>;

    /// `REL? <0|1>`: include relay states in status broadcasts.
    async fn set_send_relays_status(&self, enabled: bool) -> Result<String>;

    /// `REL<n> <0|1>`, `relay` is 1-based.
    async fn set_relay(&self, relay: u8, on: bool) -> Result<String>;

    /// `RPU<n> <ms>`, `relay` is 1-based.
    async fn pulse_relay(&self, relay: u8, ms: u64) -> Result<String>;

    /// Whether the temperature family is available.
    fn supports_temperature(&self) -> bool {
        false
    }

    /// `SENDT <ms>`
    async fn set_temp_broadcast_timer(&self, ms: u64) -> Result<String> {
        let _ = ms;
        Err(HardwareError::unsupported("SENDT"))
    }

    /// `TEMP`
    async fn get_temp(&self) -> Result<String> {
        Err(HardwareError::unsupported("TEMP"))
    }

    /// `TBUS <n>`
    async fn set_bus(&self, count: u32) -> Result<String> {
        let _ = count;
        Err(HardwareError::unsupported("TBUS"))
    }

    /// `ADDRT <n>`
    async fn get_addresses(&self, bus: u32) -> Result<String> {
        let _ = bus;
        Err(HardwareError::unsupported("ADDRT"))
    }
}

/// Keypad with RFID reader and buzzer.
///
/// Scans and key presses are published as [`DeviceEvent`](crate::DeviceEvent)s
/// on the channel handed to the device at construction.
pub trait KeypadRfid: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Sound the buzzer for `ms` milliseconds.
    async fn buzz(&self, ms: u64) -> Result<()>;
}

/// Touch display driven by page/object commands.
pub trait TouchDisplay: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn set_page(&self, page: &str) -> Result<()>;

    async fn set_text(&self, object: &str, text: &str) -> Result<()>;

    async fn set_attr(&self, object: &str, attribute: &str, value: &str) -> Result<()>;

    /// Write raw bytes to the display.
    async fn send_raw(&self, bytes: &[u8]) -> Result<()>;
}

/// Small text panel.
pub trait OledPanel: Send + Sync {
    async fn set_mode(&self, mode: &str, arg: Option<&str>) -> Result<()>;

    /// Show one or more lines of cells.
    async fn set_text(&self, lines: &[Vec<String>]) -> Result<()>;
}

/// Digital pin access used by the emulator.
///
/// Implementations are synchronous: a pin read is a single short syscall or a
/// memory access, cheap enough to run on the scanning task.
pub trait PinDriver: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn setup_input(&self, pin: u32) -> Result<()>;

    /// Configure `pin` as output and drive it to `level`.
    fn setup_output(&self, pin: u32, level: bool) -> Result<()>;

    fn read(&self, pin: u32) -> Result<bool>;

    fn write(&self, pin: u32, level: bool) -> Result<()>;

    /// Return the pin to the system.
    fn release(&self, pin: u32) -> Result<()>;
}
