//! Protocol-wide constants.
//!
//! The wire protocol is newline-delimited text. Asynchronous events carry a
//! four digit sequence right after the broadcast sentinel:
//!
//! ```text
//! :002A@R{04A1B2C3}     tagged event (RFID scan)
//! :002B{0,3}{1,0}{0,1}  generic hardware broadcast (status string)
//! ```
//!
//! ```
//! use andino_core::constants::*;
//!
//! assert_eq!(BROADCAST_SENTINEL, ':');
//! assert_eq!(REPLY_ERROR, "ERROR");
//! ```

// Wire format

/// First character of every asynchronous broadcast line.
pub const BROADCAST_SENTINEL: char = ':';

/// Number of hex digits used to render the broadcast sequence.
pub const SEQUENCE_WIDTH: usize = 4;

/// Reply sent to all clients when a command fails in a recoverable way.
pub const REPLY_ERROR: &str = "ERROR";

/// Reply sent right before the server shuts itself down.
pub const REPLY_CRITICAL: &str = "ERROR CRITICAL SERVICE CLOSED";

/// Reply to `DISP` while the touch display is disabled.
pub const REPLY_DISPLAY_DISABLED: &str = "ERROR DISPLAY DISABLED";

/// Upper bound for a single inbound line, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 4096;

// TCP

pub const DEFAULT_TCP_PORT: u16 = 9999;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_MAX_CONNECTIONS: usize = 32;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2000;

// Hardware

/// Relays addressable through `RELn` / `RPUn`.
pub const MAX_RELAYS: u8 = 8;

/// Hex counters wrap modulo this value.
pub const COUNTER_MODULUS: u32 = 0xFFFF;

/// Capacity of the channel carrying device events to the broadcaster.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyAMA0";
pub const DEFAULT_BAUD_RATE: u32 = 38400;
pub const DEFAULT_SERIAL_READ_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_SERIAL_READ_SIZE: usize = 1024;

pub const DEFAULT_GPIO_BASE_PATH: &str = "/sys/class/gpio";
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 5;
pub const DEFAULT_SHUTDOWN_SCRIPT: &str = "sudo shutdown -h now";
pub const DEFAULT_SHUTDOWN_HOLD_MS: u64 = 5000;

/// Suffix of the overlay file written by [`crate::ConfigStore::save`].
pub const SAVED_CONFIG_SUFFIX: &str = "_saved";
