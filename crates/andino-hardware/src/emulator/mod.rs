//! GPIO emulator of the controller protocol.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────── scan task (every scan_interval) ────────────┐
//! PinDriver ─▶ │ InputDevice::sample ─▶ held    ─▶ counter += 1           │
//!              │                     └▶ changed ─▶ status broadcast       │──▶ event channel
//!              │ power-fail input    ─▶ ShutdownWatchdog                  │
//!              └──────────────────────────────────────────────────────────┘
//!              ┌──────────── status task (every send_interval) ──────────┐
//!              │ full status broadcast while SEND is enabled             │──▶ event channel
//!              └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutable state lives behind one mutex that is never held across an
//! `.await`. Settings changed through commands are kept in memory only;
//! [`EmulatorBackend::settings`] hands a snapshot to whoever persists them.

mod input;
mod relay;

pub use input::{InputDevice, Sample};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::status::format_status;
use crate::traits::{HardwareBackend, PinDriver};
use crate::watchdog::{CommandShutdown, ShutdownAction, ShutdownWatchdog};
use crate::{DeviceEvent, EventSender, HardwareError, Result, lock};
use relay::RelayBank;

struct EmulatorState {
    settings: EmulatorSettings,
    inputs: Vec<InputDevice>,
    power: Option<InputDevice>,
    relays: RelayBank,
}

struct Shared {
    pins: Arc<dyn PinDriver>,
    io: IoConfig,
    events: EventSender,
    state: Mutex<EmulatorState>,
    running: AtomicBool,
    watchdog: Option<ShutdownWatchdog>,
}

#[derive(Default)]
struct Tasks {
    scan: Option<JoinHandle<()>>,
    status: Option<JoinHandle<()>>,
}

/// I/O board emulating the X1 command set on local GPIO.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig};
/// use andino_hardware::mock::MockPins;
/// use andino_hardware::{EmulatorBackend, HardwareBackend, event_channel};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> andino_hardware::Result<()> {
/// let pins = MockPins::new();
/// let (events, _rx) = event_channel(64);
/// let io = EmulatorBackend::new(
///     Arc::new(pins.clone()),
///     IoConfig::default(),
///     EmulatorSettings::default(),
///     &ShutdownConfig::default(),
///     events,
/// );
///
/// io.start().await?;
/// assert_eq!(io.set_relay(1, true).await?, "REL1 1");
/// assert!(pins.level(5));
/// io.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct EmulatorBackend {
    shared: Arc<Shared>,
    tasks: Mutex<Tasks>,
}

impl std::fmt::Debug for EmulatorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatorBackend")
            .field("pins", &self.shared.pins.name())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl EmulatorBackend {
    pub fn new(
        pins: Arc<dyn PinDriver>,
        io: IoConfig,
        settings: EmulatorSettings,
        shutdown: &ShutdownConfig,
        events: EventSender,
    ) -> Self {
        let action: Arc<dyn ShutdownAction> = Arc::new(CommandShutdown::new(&shutdown.script));
        Self::with_shutdown_action(pins, io, settings, shutdown, events, action)
    }

    /// Like [`new`](Self::new) with a custom action for the power-fail input.
    pub fn with_shutdown_action(
        pins: Arc<dyn PinDriver>,
        io: IoConfig,
        settings: EmulatorSettings,
        shutdown: &ShutdownConfig,
        events: EventSender,
        action: Arc<dyn ShutdownAction>,
    ) -> Self {
        let watchdog = (shutdown.enabled && io.pin_power_fail.is_some())
            .then(|| ShutdownWatchdog::new(Duration::from_millis(shutdown.hold_ms), action));
        let relays = RelayBank::new(&io.relay_pins, |i| io.relay_active_high(i));
        let state = EmulatorState {
            settings,
            inputs: Vec::new(),
            power: None,
            relays,
        };

        Self {
            shared: Arc::new(Shared {
                pins,
                io,
                events,
                state: Mutex::new(state),
                running: AtomicBool::new(false),
                watchdog,
            }),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Snapshot of the runtime settings.
    pub fn settings(&self) -> EmulatorSettings {
        lock(&self.shared.state).settings.clone()
    }

    /// Current status string per the broadcast flags.
    pub fn generate_broadcast_string(&self) -> String {
        self.shared.status_string()
    }

    pub fn counters(&self) -> Vec<u32> {
        lock(&self.shared.state)
            .inputs
            .iter()
            .map(InputDevice::counter)
            .collect()
    }

    pub fn relay_states(&self) -> Vec<bool> {
        lock(&self.shared.state).relays.states()
    }

    pub fn input_count(&self) -> usize {
        self.shared.io.input_pins.len()
    }

    /// A shutdown is pending on the power-fail input.
    pub fn shutdown_pending(&self) -> bool {
        self.shared
            .watchdog
            .as_ref()
            .is_some_and(ShutdownWatchdog::is_armed)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HardwareError::not_running("io"))
        }
    }

    /// (Re)start or stop the periodic status task per the current settings.
    fn reschedule_status(&self) {
        let mut tasks = lock(&self.tasks);
        if let Some(previous) = tasks.status.take() {
            previous.abort();
        }
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }
        let (enabled, interval_ms) = {
            let state = lock(&self.shared.state);
            (state.settings.send_broadcast, state.settings.send_interval_ms)
        };
        if enabled && interval_ms > 0 {
            let shared = Arc::clone(&self.shared);
            tasks.status = Some(tokio::spawn(status_loop(
                shared,
                Duration::from_millis(interval_ms),
            )));
        }
    }

    fn update_settings<R>(&self, f: impl FnOnce(&mut EmulatorState) -> R) -> R {
        f(&mut lock(&self.shared.state))
    }
}

impl Shared {
    fn status_string(&self) -> String {
        let state = lock(&self.state);
        let counters: Vec<u32> = state.inputs.iter().map(InputDevice::counter).collect();
        let inputs: Vec<bool> = if state.inputs.is_empty() {
            vec![false; self.io.input_pins.len()]
        } else {
            state.inputs.iter().map(InputDevice::is_active).collect()
        };
        let relays = state.relays.states();
        format_status(
            state.settings.send_counter.then_some(counters.as_slice()),
            &inputs,
            state.settings.send_relays.then_some(relays.as_slice()),
        )
    }

    /// Sample every input once. Returns the status broadcasts to emit.
    fn scan_once(&self, now: Instant, runtime: &Handle) -> Vec<String> {
        let mut reports = 0usize;
        {
            let mut state = lock(&self.state);
            let send_on_change = state.settings.send_on_change;
            let EmulatorState {
                settings,
                inputs,
                power,
                ..
            } = &mut *state;

            for (i, input) in inputs.iter_mut().enumerate() {
                let level = match self.pins.read(input.pin()) {
                    Ok(level) => level,
                    Err(e) => {
                        trace!(pin = input.pin(), error = %e, "Input read failed");
                        continue;
                    }
                };
                let sample = input.sample(level, now);
                if sample.held {
                    debug!(input = i, counter = input.counter(), "Input held");
                }
                if let Some(active) = sample.changed {
                    debug!(input = i, active, "Input changed");
                    if send_on_change && settings.reports_change(i) {
                        reports += 1;
                    }
                }
            }

            if let (Some(power), Some(dog)) = (power.as_mut(), self.watchdog.as_ref())
                && let Ok(level) = self.pins.read(power.pin())
                && let Some(active) = power.sample(level, now).changed
            {
                dog.update(active, runtime);
            }
        }

        (0..reports).map(|_| self.status_string()).collect()
    }

    async fn publish(&self, line: String) {
        if self.events.send(DeviceEvent::Broadcast(line)).await.is_err() {
            debug!("Event channel closed, broadcast dropped");
        }
    }
}

async fn scan_loop(shared: Arc<Shared>, period: Duration) {
    let runtime = Handle::current();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        let now = ticker.tick().await;
        for line in shared.scan_once(now, &runtime) {
            shared.publish(line).await;
        }
    }
}

async fn status_loop(shared: Arc<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let line = shared.status_string();
        shared.publish(line).await;
    }
}

impl HardwareBackend for EmulatorBackend {
    fn name(&self) -> &'static str {
        "io"
    }

    async fn start(&self) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let shared = &self.shared;
        let io = &shared.io;

        {
            let mut state = lock(&shared.state);
            let debounce = Duration::from_millis(state.settings.debounce_ms);
            let hold = Duration::from_millis(state.settings.polling_ms);
            let edge = state.settings.edge_pull_up;

            let mut inputs = Vec::with_capacity(io.input_pins.len());
            for (i, &pin) in io.input_pins.iter().enumerate() {
                shared.pins.setup_input(pin)?;
                let pull_up = edge.unwrap_or_else(|| io.pull_up(i));
                inputs.push(InputDevice::new(pin, pull_up, debounce, hold));
            }
            state.inputs = inputs;

            state.power = match io.pin_power_fail {
                Some(pin) if shared.watchdog.is_some() => {
                    shared.pins.setup_input(pin)?;
                    let hold = shared
                        .watchdog
                        .as_ref()
                        .map(ShutdownWatchdog::delay)
                        .unwrap_or_default();
                    Some(InputDevice::new(pin, true, debounce, hold))
                }
                _ => None,
            };

            state.relays.setup(&shared.pins, |i| io.relay_start(i))?;
        }

        shared.running.store(true, Ordering::Release);
        let scan_period = Duration::from_millis(io.scan_interval_ms.max(1));
        lock(&self.tasks).scan = Some(tokio::spawn(scan_loop(Arc::clone(shared), scan_period)));
        self.reschedule_status();

        info!(
            pins = shared.pins.name(),
            inputs = io.input_pins.len(),
            relays = io.relay_pins.len(),
            "I/O emulator started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let (scan, status) = {
            let mut tasks = lock(&self.tasks);
            (tasks.scan.take(), tasks.status.take())
        };
        for task in [scan, status].into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }

        if let Some(dog) = &self.shared.watchdog {
            dog.cancel();
        }

        let pins = {
            let mut state = lock(&self.shared.state);
            state.relays.abort_pulses();
            let mut pins: Vec<u32> = state.inputs.drain(..).map(|i| i.pin()).collect();
            pins.extend(state.power.take().map(|p| p.pin()));
            pins.extend(state.relays.pins());
            pins
        };
        for pin in pins {
            if let Err(e) = self.shared.pins.release(pin) {
                warn!(pin, error = %e, "Failed to release pin");
            }
        }

        info!("I/O emulator stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    async fn reset(&self) -> Result<String> {
        self.update_settings(|state| state.inputs.iter_mut().for_each(InputDevice::reset_counter));
        Ok("RESET".into())
    }

    async fn info(&self) -> Result<String> {
        Ok("ANDINO IO".into())
    }

    async fn hardware(&self, mode: u32) -> Result<String> {
        if mode == 1 {
            Ok("HARD 1".into())
        } else {
            Err(HardwareError::invalid_argument(format!("hardware mode {mode}")))
        }
    }

    async fn set_polling(&self, ms: u64) -> Result<String> {
        self.update_settings(|state| {
            state.settings.polling_ms = ms;
            let hold = Duration::from_millis(ms);
            state.inputs.iter_mut().for_each(|i| i.set_hold(hold));
        });
        Ok(format!("POLL {ms}"))
    }

    async fn set_skip(&self, count: u32) -> Result<String> {
        self.update_settings(|state| state.settings.skip = count);
        Ok(format!("SKIP {count}"))
    }

    async fn set_edge_detection(&self, pull_up: bool) -> Result<String> {
        self.update_settings(|state| {
            state.settings.edge_pull_up = Some(pull_up);
            state.inputs.iter_mut().for_each(|i| i.set_pull_up(pull_up));
        });
        Ok(format!("EDGE {}", u8::from(pull_up)))
    }

    async fn set_send_time(&self, ms: u64) -> Result<String> {
        self.update_settings(|state| {
            if ms == 0 {
                state.settings.send_broadcast = false;
            } else {
                state.settings.send_broadcast = true;
                state.settings.send_interval_ms = ms;
            }
        });
        self.reschedule_status();
        Ok(format!("SEND {ms}"))
    }

    async fn set_broadcast_on_change(&self, enabled: bool) -> Result<String> {
        self.update_settings(|state| state.settings.send_on_change = enabled);
        Ok(format!("CHNG {}", u8::from(enabled)))
    }

    async fn set_change_pattern(&self, pattern: &[bool]) -> Result<String> {
        let inputs = self.input_count();
        if pattern.len() != inputs {
            return Err(HardwareError::invalid_argument(format!(
                "change pattern needs {inputs} bits, got {}",
                pattern.len()
            )));
        }
        self.update_settings(|state| state.settings.change_pattern = pattern.to_vec());
        let bits: String = pattern.iter().map(|&b| if b { '1' } else { '0' }).collect();
        Ok(format!("CHNP {bits}"))
    }

    async fn get_counters(&self, mode: u32) -> Result<String> {
        let state = lock(&self.shared.state);
        let counters: Vec<u32> = state.inputs.iter().map(InputDevice::counter).collect();
        let inputs: Vec<bool> = state.inputs.iter().map(InputDevice::is_active).collect();
        let relays = state.relays.states();

        let mut out = crate::status::format_block(counters.iter().map(|c| format!("{c:x}")));
        if mode > 0 {
            out.push_str(&crate::status::format_block(inputs.iter().map(|&i| u8::from(i))));
        }
        if mode > 1 {
            out.push_str(&crate::status::format_block(relays.iter().map(|&r| u8::from(r))));
        }
        Ok(out)
    }

    async fn set_debounce(&self, ms: u64) -> Result<String> {
        self.update_settings(|state| {
            state.settings.debounce_ms = ms;
            let debounce = Duration::from_millis(ms);
            state.inputs.iter_mut().for_each(|i| i.set_debounce(debounce));
        });
        Ok(format!("DEBO {ms}"))
    }

    async fn set_power(&self, _value: u32) -> Result<String> {
        Err(HardwareError::unsupported("POWR"))
    }

    async fn set_send_relays_status(&self, enabled: bool) -> Result<String> {
        self.update_settings(|state| state.settings.send_relays = enabled);
        Ok(format!("REL? {}", u8::from(enabled)))
    }

    async fn set_relay(&self, relay: u8, on: bool) -> Result<String> {
        self.ensure_running()?;
        let mut state = lock(&self.shared.state);
        let index = state.relays.index(relay)?;
        state.relays.set(&self.shared.pins, index, on)?;
        Ok(format!("REL{relay} {}", u8::from(on)))
    }

    async fn pulse_relay(&self, relay: u8, ms: u64) -> Result<String> {
        self.ensure_running()?;
        let mut state = lock(&self.shared.state);
        let index = state.relays.index(relay)?;
        let generation = state.relays.set(&self.shared.pins, index, true)?;

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let mut state = lock(&shared.state);
            match state.relays.end_pulse(&shared.pins, index, generation) {
                Ok(true) => {}
                Ok(false) => debug!(relay, "Relay switched during pulse, left as is"),
                Err(e) => warn!(relay, error = %e, "Failed to end relay pulse"),
            }
        });
        state.relays.attach_pulse(index, task);
        Ok(format!("RPU{relay} {ms}"))
    }
}

impl Drop for EmulatorBackend {
    fn drop(&mut self) {
        let tasks = lock(&self.tasks);
        for task in [&tasks.scan, &tasks.status].into_iter().flatten() {
            task.abort();
        }
    }
}
