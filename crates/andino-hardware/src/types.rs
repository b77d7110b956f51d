//! Common types shared by backends and peripherals.

use tokio::sync::mpsc;

/// Something a device reports without being asked.
///
/// Every backend and peripheral publishes on one shared channel; the server
/// numbers and formats each event before fanning it out to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceEvent {
    /// Generic hardware broadcast, e.g. a status string `{0,3}{1,0}`.
    Broadcast(String),
    /// RFID card scanned.
    Rfid(String),
    /// Function button pressed (`F1`..`F6`).
    FunctionButton(String),
    /// Numeric keypad button pressed.
    NumberButton(String),
    /// Raw touch report from the display.
    DisplayTouch(Vec<u8>),
    /// Text report from the display.
    DisplayText(String),
}

/// Sending half of the device event channel.
pub type EventSender = mpsc::Sender<DeviceEvent>;

/// Receiving half of the device event channel.
pub type EventReceiver = mpsc::Receiver<DeviceEvent>;

/// Create the shared device event channel.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}
