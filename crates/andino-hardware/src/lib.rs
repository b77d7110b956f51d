//! Hardware layer of the Andino terminal server.
//!
//! This crate provides the Hardware Capability Interface shared by the two
//! I/O backends, plus the peripheral interfaces the dispatcher talks to:
//!
//! - [`SerialBackend`]: an X1 controller attached to a serial port. Commands
//!   are confirmed by the controller; `:`-prefixed lines are broadcasts.
//! - [`EmulatorBackend`]: the same command set emulated on local GPIO through
//!   a [`PinDriver`] ([`sysfs::SysfsPins`] on a board, [`mock::MockPins`] in
//!   tests and simulation).
//!
//! # Design Philosophy
//!
//! - **Async-first**: device traits use native `async fn` (Edition 2024
//!   RPITIT). They are not object-safe, so the [`devices`] module provides
//!   enum wrappers for dispatch.
//! - **Push events**: anything a device reports unasked is a [`DeviceEvent`]
//!   on one shared channel. Backends never format wire lines themselves.
//! - **Error-aware**: every operation returns [`Result`]; the dispatcher
//!   classifies [`HardwareError`]s into recoverable and critical failures.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig};
//! use andino_hardware::devices::AnyBackend;
//! use andino_hardware::mock::MockPins;
//! use andino_hardware::{EmulatorBackend, HardwareBackend, event_channel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> andino_hardware::Result<()> {
//! let (events, _rx) = event_channel(64);
//! let backend = AnyBackend::Emulator(EmulatorBackend::new(
//!     Arc::new(MockPins::new()),
//!     IoConfig::default(),
//!     EmulatorSettings::default(),
//!     &ShutdownConfig::default(),
//!     events,
//! ));
//!
//! backend.start().await?;
//! assert_eq!(backend.info().await?, "ANDINO IO");
//! backend.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod devices;
pub mod emulator;
pub mod error;
pub mod mock;
pub mod serial;
pub mod status;
pub mod sysfs;
pub mod traits;
pub mod types;
pub mod watchdog;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use devices::{AnyBackend, AnyDisplay, AnyKeypad, AnyOled};
pub use emulator::EmulatorBackend;
pub use error::{HardwareError, Result};
pub use serial::{ConfirmationQueue, SerialBackend, ShutdownField};
pub use traits::{HardwareBackend, KeypadRfid, OledPanel, PinDriver, TouchDisplay};
pub use types::{DeviceEvent, EventReceiver, EventSender, event_channel};
pub use watchdog::{CommandShutdown, ShutdownAction, ShutdownWatchdog};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
