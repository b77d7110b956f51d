//! Mock touch display.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::traits::TouchDisplay;
use crate::{DeviceEvent, EventSender, HardwareError, Result, lock};

/// A call the display received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Page(String),
    Text { object: String, text: String },
    Attr { object: String, attribute: String, value: String },
    Raw(Vec<u8>),
}

#[derive(Debug, Default)]
struct DisplayState {
    running: AtomicBool,
    calls: Mutex<Vec<DisplayCall>>,
}

#[derive(Debug)]
pub struct MockDisplay {
    state: Arc<DisplayState>,
}

impl MockDisplay {
    pub fn new(events: EventSender) -> (Self, MockDisplayHandle) {
        let state = Arc::new(DisplayState::default());
        let handle = MockDisplayHandle {
            state: Arc::clone(&state),
            events,
        };
        (Self { state }, handle)
    }

    fn record(&self, call: DisplayCall) -> Result<()> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(HardwareError::not_running("display"));
        }
        lock(&self.state.calls).push(call);
        Ok(())
    }
}

impl TouchDisplay for MockDisplay {
    async fn start(&self) -> Result<()> {
        self.state.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.running.store(false, Ordering::Release);
        Ok(())
    }

    async fn set_page(&self, page: &str) -> Result<()> {
        self.record(DisplayCall::Page(page.to_string()))
    }

    async fn set_text(&self, object: &str, text: &str) -> Result<()> {
        self.record(DisplayCall::Text {
            object: object.to_string(),
            text: text.to_string(),
        })
    }

    async fn set_attr(&self, object: &str, attribute: &str, value: &str) -> Result<()> {
        self.record(DisplayCall::Attr {
            object: object.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    }

    async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.record(DisplayCall::Raw(bytes.to_vec()))
    }
}

/// Touches the mock display and reads back what it was told to show.
#[derive(Debug, Clone)]
pub struct MockDisplayHandle {
    state: Arc<DisplayState>,
    events: EventSender,
}

impl MockDisplayHandle {
    pub fn calls(&self) -> Vec<DisplayCall> {
        lock(&self.state.calls).clone()
    }

    /// Report a raw touch event.
    pub async fn touch(&self, bytes: &[u8]) -> Result<()> {
        self.emit(DeviceEvent::DisplayTouch(bytes.to_vec())).await
    }

    /// Report a text event.
    pub async fn text(&self, text: &str) -> Result<()> {
        self.emit(DeviceEvent::DisplayText(text.to_string())).await
    }

    async fn emit(&self, event: DeviceEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("event channel closed"))
    }
}
