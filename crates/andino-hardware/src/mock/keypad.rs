//! Mock keypad with RFID reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::traits::KeypadRfid;
use crate::{DeviceEvent, EventSender, HardwareError, Result, lock};

#[derive(Debug, Default)]
struct KeypadState {
    running: AtomicBool,
    buzzes: Mutex<Vec<u64>>,
}

/// Keypad/RFID controller driven by a [`MockKeypadHandle`].
///
/// ```
/// use andino_hardware::mock::MockKeypad;
/// use andino_hardware::{DeviceEvent, KeypadRfid, event_channel};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> andino_hardware::Result<()> {
/// let (tx, mut rx) = event_channel(8);
/// let (keypad, handle) = MockKeypad::new(tx);
///
/// keypad.start().await?;
/// handle.scan_card("0012345678").await?;
/// assert_eq!(rx.recv().await, Some(DeviceEvent::Rfid("0012345678".into())));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockKeypad {
    state: Arc<KeypadState>,
}

impl MockKeypad {
    pub fn new(events: EventSender) -> (Self, MockKeypadHandle) {
        let state = Arc::new(KeypadState::default());
        let handle = MockKeypadHandle {
            state: Arc::clone(&state),
            events,
        };
        (Self { state }, handle)
    }
}

impl KeypadRfid for MockKeypad {
    async fn start(&self) -> Result<()> {
        self.state.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.running.store(false, Ordering::Release);
        Ok(())
    }

    async fn buzz(&self, ms: u64) -> Result<()> {
        debug!(ms, "Mock buzzer");
        lock(&self.state.buzzes).push(ms);
        Ok(())
    }
}

/// Drives a [`MockKeypad`] and inspects its buzzer.
#[derive(Debug, Clone)]
pub struct MockKeypadHandle {
    state: Arc<KeypadState>,
    events: EventSender,
}

impl MockKeypadHandle {
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Buzz durations requested so far.
    pub fn buzzes(&self) -> Vec<u64> {
        lock(&self.state.buzzes).clone()
    }

    pub async fn scan_card(&self, uid: &str) -> Result<()> {
        self.emit(DeviceEvent::Rfid(uid.to_string())).await
    }

    /// Press function button `F<n>`.
    pub async fn press_function(&self, n: u8) -> Result<()> {
        self.emit(DeviceEvent::FunctionButton(format!("F{n}"))).await
    }

    /// Press a numeric keypad key.
    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.emit(DeviceEvent::NumberButton(key.to_string())).await
    }

    async fn emit(&self, event: DeviceEvent) -> Result<()> {
        if !self.is_running() {
            return Err(HardwareError::not_running("keypad"));
        }
        self.events
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("event channel closed"))
    }
}
