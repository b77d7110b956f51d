//! Backend for the serial-attached X1 controller.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────── reader thread ────────────────┐
//! serial RX ──▶   │ bytes ─▶ split '\n' ─▶ strip '\r'             │
//!                 │   ":SEQQ<payload>" ─▶ DeviceEvent::Broadcast  │──▶ event channel
//!                 │   anything else    ─▶ ConfirmationQueue       │
//!                 └───────────────────────────────────────────────┘
//!                                               │ notify
//! send_with_confirm(cmd) ── write cmd\r\n ──▶ wait (timeout) ──▶ oldest line
//! ```
//!
//! The reader is an OS thread because serial I/O is blocking. Waiters are
//! woken by the reader through [`tokio::sync::Notify`]; nothing polls. Only
//! one command is outstanding at a time, so confirmations cannot be handed
//! to the wrong caller.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use andino_core::{SerialConfig, ShutdownConfig, TextEncoding};
use andino_protocol::{status_blocks, strip_broadcast_header};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

use crate::traits::HardwareBackend;
use crate::watchdog::{CommandShutdown, ShutdownWatchdog};
use crate::{DeviceEvent, EventSender, HardwareError, Result, lock};

/// Lines received from the controller that are not broadcasts.
#[derive(Debug, Default)]
pub struct ConfirmationQueue {
    lines: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl ConfirmationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and wake a waiter.
    pub fn push(&self, line: String) {
        lock(&self.lines).push_back(line);
        self.notify.notify_one();
    }

    /// Remove and return the oldest line.
    pub fn pop(&self) -> Option<String> {
        lock(&self.lines).pop_front()
    }

    /// Wait up to `timeout` for a line.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, async {
            loop {
                if let Some(line) = self.pop() {
                    return line;
                }
                self.notify.notified().await;
            }
        })
        .await
        .ok()
    }

    /// Drop everything; returns how many lines were discarded.
    pub fn clear(&self) -> usize {
        let mut lines = lock(&self.lines);
        let dropped = lines.len();
        lines.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Position of the power-fail flag inside a broadcast payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownField {
    pub block: usize,
    pub index: usize,
}

impl ShutdownField {
    /// `Some(true)` when the flag reads `1`, `None` when the payload has no such field.
    pub fn read(&self, payload: &str) -> Option<bool> {
        let blocks = status_blocks(payload);
        let value = blocks.get(self.block)?.get(self.index)?;
        Some(value.trim() == "1")
    }
}

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

struct SerialIo {
    reader: BoxedReader,
    writer: BoxedWriter,
}

/// Serial X1 controller.
///
/// # Examples
///
/// ```no_run
/// use andino_core::{SerialConfig, ShutdownConfig};
/// use andino_hardware::{HardwareBackend, SerialBackend, event_channel};
///
/// # async fn example() -> andino_hardware::Result<()> {
/// let (events, _rx) = event_channel(64);
/// let x1 = SerialBackend::new(SerialConfig::default(), &ShutdownConfig::default(), events);
/// x1.start().await?;
/// println!("{}", x1.info().await?);
/// x1.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct SerialBackend {
    config: SerialConfig,
    events: EventSender,
    io: Mutex<Option<SerialIo>>,
    writer: Mutex<Option<BoxedWriter>>,
    queue: Arc<ConfirmationQueue>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    command_lock: tokio::sync::Mutex<()>,
    watchdog: Option<(Arc<ShutdownWatchdog>, ShutdownField)>,
}

impl std::fmt::Debug for SerialBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialBackend")
            .field("port", &self.config.port)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl SerialBackend {
    /// Backend that opens `config.port` on [`start`](HardwareBackend::start).
    pub fn new(config: SerialConfig, shutdown: &ShutdownConfig, events: EventSender) -> Self {
        Self::build(config, shutdown, events, None)
    }

    /// Backend over an already open byte stream.
    ///
    /// The reader should time out periodically (`ErrorKind::TimedOut` or
    /// `WouldBlock`) so that [`stop`](HardwareBackend::stop) can join it.
    pub fn from_io(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: SerialConfig,
        shutdown: &ShutdownConfig,
        events: EventSender,
    ) -> Self {
        let io = SerialIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        };
        Self::build(config, shutdown, events, Some(io))
    }

    fn build(
        config: SerialConfig,
        shutdown: &ShutdownConfig,
        events: EventSender,
        io: Option<SerialIo>,
    ) -> Self {
        let watchdog = match (shutdown.enabled, shutdown.serial_block) {
            (true, Some(block)) => {
                let dog = ShutdownWatchdog::new(
                    Duration::from_millis(shutdown.hold_ms),
                    Arc::new(CommandShutdown::new(&shutdown.script)),
                );
                let field = ShutdownField {
                    block,
                    index: shutdown.serial_index,
                };
                Some((Arc::new(dog), field))
            }
            _ => None,
        };

        Self {
            config,
            events,
            io: Mutex::new(io),
            writer: Mutex::new(None),
            queue: Arc::new(ConfirmationQueue::new()),
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
            command_lock: tokio::sync::Mutex::new(()),
            watchdog,
        }
    }

    /// Lines waiting to be claimed as confirmations.
    pub fn pending_confirmations(&self) -> usize {
        self.queue.len()
    }

    /// Write `command` and wait for the controller's confirmation.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::NotRunning`] before `start`
    /// - [`HardwareError::Disconnected`] when the link is gone
    /// - [`HardwareError::Timeout`] when nothing arrives within
    ///   `confirm_timeout_ms`; the confirmation queue is empty afterwards
    pub async fn send_with_confirm(&self, command: &str) -> Result<String> {
        if !self.running.load(Ordering::Acquire) {
            return Err(HardwareError::not_running(&self.config.port));
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(HardwareError::disconnected(&self.config.port));
        }

        let _outstanding = self.command_lock.lock().await;

        let stale = self.queue.clear();
        if stale > 0 {
            debug!(stale, "Discarded unclaimed confirmations");
        }

        self.write_line(command)?;
        trace!(command, "Sent to controller");

        let timeout = Duration::from_millis(self.config.confirm_timeout_ms);
        match self.queue.pop_timeout(timeout).await {
            Some(reply) => {
                trace!(command, reply = %reply, "Confirmed");
                Ok(reply)
            }
            None => {
                self.queue.clear();
                warn!(command, timeout_ms = self.config.confirm_timeout_ms, "No confirmation from controller");
                Err(HardwareError::timeout(command, self.config.confirm_timeout_ms))
            }
        }
    }

    fn write_line(&self, command: &str) -> Result<()> {
        let mut bytes = self.config.encoding.encode(command)?;
        bytes.extend_from_slice(b"\r\n");

        let mut writer = lock(&self.writer);
        let Some(port) = writer.as_mut() else {
            return Err(HardwareError::disconnected(&self.config.port));
        };
        if let Err(e) = port.write_all(&bytes).and_then(|()| port.flush()) {
            error!(port = %self.config.port, error = %e, "Serial write failed");
            self.connected.store(false, Ordering::Release);
            return Err(HardwareError::disconnected(&self.config.port));
        }
        Ok(())
    }

    fn open_io(&self) -> Result<SerialIo> {
        if let Some(io) = lock(&self.io).take() {
            return Ok(io);
        }
        self.open_port()
    }

    #[cfg(feature = "serial")]
    fn open_port(&self) -> Result<SerialIo> {
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .open()
            .map_err(|e| {
                HardwareError::open_failed(format!("{}: {e}", self.config.port))
            })?;
        let reader = port.try_clone().map_err(|e| {
            HardwareError::open_failed(format!("{}: {e}", self.config.port))
        })?;
        Ok(SerialIo {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }

    #[cfg(not(feature = "serial"))]
    fn open_port(&self) -> Result<SerialIo> {
        Err(HardwareError::unsupported(
            "serial ports (built without the `serial` feature)",
        ))
    }

    async fn command(&self, command: String) -> Result<String> {
        self.send_with_confirm(&command).await
    }
}

struct ReaderContext {
    reader: BoxedReader,
    read_size: usize,
    encoding: TextEncoding,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    queue: Arc<ConfirmationQueue>,
    events: EventSender,
    watchdog: Option<(Arc<ShutdownWatchdog>, ShutdownField)>,
    runtime: Handle,
}

impl ReaderContext {
    fn run(mut self) {
        let mut chunk = vec![0u8; self.read_size];
        let mut pending: Vec<u8> = Vec::new();

        while self.running.load(Ordering::Acquire) {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    warn!("Serial stream closed");
                    self.connected.store(false, Ordering::Release);
                    break;
                }
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = pending.drain(..=pos).collect();
                        let line = self.encoding.decode(&raw[..pos]).replace('\r', "");
                        if !line.is_empty() {
                            self.handle_line(line);
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!(error = %e, "Serial read failed");
                    self.connected.store(false, Ordering::Release);
                    break;
                }
            }
        }
        debug!("Serial reader finished");
    }

    fn handle_line(&self, line: String) {
        let Some(payload) = strip_broadcast_header(&line) else {
            trace!(line = %line, "Confirmation received");
            self.queue.push(line);
            return;
        };

        if let Some((dog, field)) = &self.watchdog
            && let Some(active) = field.read(payload)
        {
            dog.update(active, &self.runtime);
        }

        if self
            .events
            .blocking_send(DeviceEvent::Broadcast(payload.to_string()))
            .is_err()
        {
            debug!("Event channel closed, broadcast dropped");
        }
    }
}

impl HardwareBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "x1"
    }

    async fn start(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let SerialIo { reader, writer } = self.open_io()?;
        *lock(&self.writer) = Some(writer);
        self.queue.clear();
        self.connected.store(true, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let context = ReaderContext {
            reader,
            read_size: self.config.read_size,
            encoding: self.config.encoding,
            running: Arc::clone(&self.running),
            connected: Arc::clone(&self.connected),
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
            watchdog: self.watchdog.clone(),
            runtime: Handle::current(),
        };
        let handle = std::thread::Builder::new()
            .name("andino-serial-reader".into())
            .spawn(move || context.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                HardwareError::open_failed(format!("reader thread: {e}"))
            })?;
        *lock(&self.reader) = Some(handle);

        info!(port = %self.config.port, baud = self.config.baud_rate, "Serial backend started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let reader = lock(&self.reader).take();
        if let Some(handle) = reader {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Serial reader panicked"),
                Err(e) => error!(error = %e, "Failed to join serial reader"),
            }
        }

        lock(&self.writer).take();
        self.connected.store(false, Ordering::Release);
        self.queue.clear();
        if let Some((dog, _)) = &self.watchdog {
            dog.cancel();
        }

        info!(port = %self.config.port, "Serial backend stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn reset(&self) -> Result<String> {
        self.command("RESET".into()).await
    }

    async fn info(&self) -> Result<String> {
        self.command("INFO".into()).await
    }

    async fn hardware(&self, mode: u32) -> Result<String> {
        self.command(format!("HARD {mode}")).await
    }

    async fn set_polling(&self, ms: u64) -> Result<String> {
        self.command(format!("POLL {ms}")).await
    }

    async fn set_skip(&self, count: u32) -> Result<String> {
        self.command(format!("SKIP {count}")).await
    }

    async fn set_edge_detection(&self, pull_up: bool) -> Result<String> {
        self.command(format!("EDGE {}", u8::from(pull_up))).await
    }

    async fn set_send_time(&self, ms: u64) -> Result<String> {
        self.command(format!("SEND {ms}")).await
    }

    async fn set_broadcast_on_change(&self, enabled: bool) -> Result<String> {
        self.command(format!("CHNG {}", u8::from(enabled))).await
    }

    async fn get_counters(&self, mode: u32) -> Result<String> {
        self.command(format!("CNTR {mode}")).await
    }

    async fn set_debounce(&self, ms: u64) -> Result<String> {
        self.command(format!("DEBO {ms}")).await
    }

    async fn set_power(&self, value: u32) -> Result<String> {
        self.command(format!("POWR {value}")).await
    }

    async fn set_send_relays_status(&self, enabled: bool) -> Result<String> {
        self.command(format!("REL? {}", u8::from(enabled))).await
    }

    async fn set_relay(&self, relay: u8, on: bool) -> Result<String> {
        self.command(format!("REL{relay} {}", u8::from(on))).await
    }

    async fn pulse_relay(&self, relay: u8, ms: u64) -> Result<String> {
        self.command(format!("RPU{relay} {ms}")).await
    }

    fn supports_temperature(&self) -> bool {
        true
    }

    async fn set_temp_broadcast_timer(&self, ms: u64) -> Result<String> {
        self.command(format!("SENDT {ms}")).await
    }

    async fn get_temp(&self) -> Result<String> {
        self.command("TEMP".into()).await
    }

    async fn set_bus(&self, count: u32) -> Result<String> {
        self.command(format!("TBUS {count}")).await
    }

    async fn get_addresses(&self, bus: u32) -> Result<String> {
        self.command(format!("ADDRT {bus}")).await
    }
}

impl Drop for SerialBackend {
    fn drop(&mut self) {
        // The reader exits on its next read timeout.
        self.running.store(false, Ordering::Release);
    }
}
