//! Command dispatch and the failure policy.
//!
//! ```text
//! line ──▶ parse_line ──┬─ Empty ─────────▶ broadcast ""
//!                       ├─ Unknown ───────▶ log, drop
//!                       └─ Command ──▶ execute ──┬─ Ok(reply) ──▶ broadcast reply
//!                                               └─ Err / panic ─▶ broadcast ERROR family
//!                                                                  (Critical: stop server)
//! ```
//!
//! Connections dispatch concurrently. The dispatcher holds no lock of its
//! own; the sequence counter is atomic and each backend serialises access to
//! its own confirmation queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use andino_hardware::{
    AnyBackend, AnyDisplay, AnyKeypad, AnyOled, DeviceEvent, HardwareBackend, KeypadRfid,
    OledPanel, TouchDisplay,
};
use andino_network::{Broadcaster, ClientHandle, LineHandler};
use andino_protocol::{
    Command, DisplayCommand, EventTag, Line, OledCommand, Sequencer, Verb, parse_bit_pattern,
    parse_line,
};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{DispatchError, FailureClass};

/// The devices one server instance drives. Optional peripherals are `None`
/// when their feature flag is off.
#[derive(Debug)]
pub(crate) struct Devices {
    pub(crate) backend: AnyBackend,
    pub(crate) keypad: Option<AnyKeypad>,
    pub(crate) display: Option<AnyDisplay>,
    pub(crate) oled: Option<AnyOled>,
}

/// Routes command lines to the devices and formats device events.
///
/// Cheap to clone; clones share the devices, the sequence counter and the
/// outbound broadcaster.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    devices: Arc<Devices>,
    temperature: bool,
    sequencer: Arc<Sequencer>,
    out: Broadcaster,
    fatal: CancellationToken,
}

type Outcome = Result<Option<String>, DispatchError>;

impl Dispatcher {
    pub(crate) fn new(
        devices: Arc<Devices>,
        temperature: bool,
        sequencer: Arc<Sequencer>,
        out: Broadcaster,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            devices,
            temperature,
            sequencer,
            out,
            fatal,
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Handle one inbound line and broadcast the outcome.
    ///
    /// Returns the line that was broadcast, if any.
    pub async fn dispatch(&self, line: &str, client: &ClientHandle) -> Option<String> {
        let command = match parse_line(line) {
            Line::Empty => {
                self.out.send_line_to_all("").await;
                return Some(String::new());
            }
            Line::Unknown(verb) => {
                warn!(client = %client, verb = %verb, "Unknown verb, line dropped");
                return None;
            }
            Line::Command(command) => command,
        };

        trace!(client = %client, verb = %command.verb, args = ?command.args, "Dispatching");
        let outcome = AssertUnwindSafe(self.execute(&command))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::from_panic(panic)));

        match outcome {
            Ok(Some(reply)) => {
                self.out.send_line_to_all(&reply).await;
                Some(reply)
            }
            Ok(None) => None,
            Err(e) => Some(self.fail(&e, &command, client).await),
        }
    }

    async fn fail(&self, e: &DispatchError, command: &Command, client: &ClientHandle) -> String {
        let class = e.class();
        match class {
            FailureClass::Critical => error!(
                client = %client,
                verb = %command.verb,
                error = %e,
                "Critical failure, closing service"
            ),
            _ => warn!(
                client = %client,
                verb = %command.verb,
                args = ?command.args,
                class = ?class,
                error = %e,
                "Command failed"
            ),
        }

        let reply = e.reply();
        self.out.send_line_to_all(reply).await;
        if class == FailureClass::Critical {
            self.fatal.cancel();
        }
        reply.to_string()
    }

    async fn execute(&self, cmd: &Command) -> Outcome {
        let backend = &self.devices.backend;
        let reply = match cmd.verb {
            Verb::Reset => backend.reset().await?,
            Verb::Ping => "PING".to_string(),
            Verb::Info => backend.info().await?,
            Verb::Hard => backend.hardware(cmd.parse_arg(0)?).await?,
            Verb::Poll => backend.set_polling(cmd.parse_arg(0)?).await?,
            Verb::Skip => backend.set_skip(cmd.parse_arg(0)?).await?,
            Verb::Edge => backend.set_edge_detection(cmd.flag(0)?).await?,
            Verb::Send => backend.set_send_time(cmd.parse_arg(0)?).await?,
            Verb::Chng => backend.set_broadcast_on_change(cmd.flag(0)?).await?,
            Verb::Chnp => {
                let pattern = parse_bit_pattern(cmd.arg(0)?)?;
                backend.set_change_pattern(&pattern).await?
            }
            Verb::Cntr => backend.get_counters(cmd.parse_arg(0)?).await?,
            Verb::Debo => backend.set_debounce(cmd.parse_arg(0)?).await?,
            Verb::Powr => backend.set_power(cmd.parse_arg(0)?).await?,
            Verb::RelayStatus => backend.set_send_relays_status(cmd.flag(0)?).await?,
            Verb::Relay(n) => backend.set_relay(n, cmd.flag(0)?).await?,
            Verb::RelayPulse(n) => backend.pulse_relay(n, cmd.parse_arg(0)?).await?,
            Verb::Tbus => self.thermometer()?.set_bus(cmd.parse_arg(0)?).await?,
            Verb::Addrt => self.thermometer()?.get_addresses(cmd.parse_arg(0)?).await?,
            Verb::Sendt => {
                self.thermometer()?
                    .set_temp_broadcast_timer(cmd.parse_arg(0)?)
                    .await?
            }
            Verb::Temp => self.thermometer()?.get_temp().await?,
            Verb::Buzz => {
                let keypad = self.devices.keypad.as_ref().ok_or(DispatchError::Disabled("keypad"))?;
                let ms: u64 = cmd.parse_arg(0)?;
                keypad.buzz(ms).await?;
                format!("BUZZ {ms}")
            }
            Verb::Disp => {
                let display = self.devices.display.as_ref().ok_or(DispatchError::DisplayDisabled)?;
                match DisplayCommand::parse(cmd)? {
                    DisplayCommand::Page(page) => display.set_page(&page).await?,
                    DisplayCommand::Text { object, text } => display.set_text(&object, &text).await?,
                    DisplayCommand::Attr {
                        object,
                        attribute,
                        value,
                    } => display.set_attr(&object, &attribute, &value).await?,
                    DisplayCommand::Raw(bytes) => display.send_raw(&bytes).await?,
                }
                format!("DISP {}", cmd.args_line())
            }
            Verb::Oled => {
                let oled = self.devices.oled.as_ref().ok_or(DispatchError::Disabled("oled"))?;
                match OledCommand::parse(cmd)? {
                    OledCommand::Mode { mode, arg } => oled.set_mode(&mode, arg.as_deref()).await?,
                    OledCommand::Text(lines) => oled.set_text(&lines).await?,
                }
                format!("OLED {}", cmd.args_line())
            }
            Verb::Sys => {
                debug!(args = ?cmd.args, "SYS ignored");
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    /// The backend, if temperature commands are enabled and supported.
    fn thermometer(&self) -> Result<&AnyBackend, DispatchError> {
        let backend = &self.devices.backend;
        if self.temperature && backend.supports_temperature() {
            Ok(backend)
        } else {
            Err(DispatchError::Disabled("temperature"))
        }
    }

    /// Number and broadcast a device event. Returns the line sent.
    pub async fn publish(&self, event: &DeviceEvent) -> Option<String> {
        let line = format_event(&self.sequencer, event)?;
        self.out.send_line_to_all(&line).await;
        Some(line)
    }
}

impl LineHandler for Dispatcher {
    async fn on_message(&self, line: String, client: ClientHandle) {
        self.dispatch(&line, &client).await;
    }
}

/// Format `event` as a numbered broadcast line.
///
/// Returns `None` for event kinds this server does not forward.
pub fn format_event(sequencer: &Sequencer, event: &DeviceEvent) -> Option<String> {
    let line = match event {
        DeviceEvent::Broadcast(payload) => sequencer.raw(payload),
        DeviceEvent::Rfid(uid) => sequencer.tagged(EventTag::Rfid, uid),
        DeviceEvent::FunctionButton(button) => sequencer.tagged(EventTag::Function, button),
        DeviceEvent::NumberButton(key) => sequencer.tagged(EventTag::Number, key),
        DeviceEvent::DisplayTouch(bytes) => sequencer.tagged(EventTag::Display, &hex_upper(bytes)),
        DeviceEvent::DisplayText(text) => sequencer.tagged(EventTag::Display, text),
        other => {
            debug!(event = ?other, "Event not forwarded");
            return None;
        }
    };
    Some(line)
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
