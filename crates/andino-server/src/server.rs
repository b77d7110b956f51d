//! Whole-server lifecycle.
//!
//! ```text
//!  backends / peripherals ──DeviceEvent──▶ event pump ──┐
//!                                                        ├──▶ Broadcaster ──▶ clients
//!  clients ──line──▶ LineServer ──▶ Dispatcher ─────────┘
//!                                       │ critical failure
//!                                       ▼
//!                                  fatal token ──▶ watcher ──▶ AndinoServer::stop
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use andino_core::TcpConfig;
use andino_core::constants::EVENT_CHANNEL_CAPACITY;
use andino_hardware::{
    AnyBackend, AnyDisplay, AnyKeypad, AnyOled, EventReceiver, EventSender, HardwareBackend,
    KeypadRfid, TouchDisplay, event_channel,
};
use andino_network::{ConnectionInfo, LineServer, LineServerConfig};
use andino_protocol::Sequencer;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Devices, Dispatcher};
use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct Inner {
    devices: Arc<Devices>,
    dispatcher: Dispatcher,
    listener: LineServer,
    events: Mutex<Option<EventReceiver>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    phase: Mutex<Phase>,
    fatal: CancellationToken,
    pump_shutdown: CancellationToken,
    stopped: CancellationToken,
}

/// An Andino terminal: listener, dispatcher, devices and event pump.
///
/// Clones share the same server.
///
/// ```no_run
/// use std::sync::Arc;
/// use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig, TcpConfig};
/// use andino_hardware::mock::MockPins;
/// use andino_hardware::EmulatorBackend;
/// use andino_server::AndinoServer;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let builder = AndinoServer::builder(TcpConfig::default());
/// let backend = EmulatorBackend::new(
///     Arc::new(MockPins::new()),
///     IoConfig::default(),
///     EmulatorSettings::default(),
///     &ShutdownConfig::default(),
///     builder.event_sender(),
/// );
/// let server = builder.backend(backend).build()?;
/// server.start().await?;
/// server.stopped().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AndinoServer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AndinoServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AndinoServer")
            .field("backend", &self.inner.devices.backend.name())
            .field("listener", &self.inner.listener)
            .finish_non_exhaustive()
    }
}

impl AndinoServer {
    pub fn builder(tcp: TcpConfig) -> AndinoServerBuilder {
        AndinoServerBuilder::new(tcp)
    }

    /// Start devices and the listener. Returns the bound address.
    ///
    /// A server runs once; start it again after `stop` and this fails with
    /// [`ServerError::AlreadyStarted`].
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let inner = &self.inner;
        let mut phase = inner.phase.lock().await;
        if *phase != Phase::Idle {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = match self.start_components().await {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = %e, "Startup failed, stopping devices");
                *phase = Phase::Stopped;
                drop(phase);
                self.shutdown_components().await;
                inner.stopped.cancel();
                return Err(e);
            }
        };
        *phase = Phase::Running;

        let watcher = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher.inner.fatal.cancelled() => {
                    warn!("Stopping after critical failure");
                    watcher.stop().await;
                }
                _ = watcher.inner.stopped.cancelled() => {}
            }
        });

        info!(addr = %addr, backend = inner.devices.backend.name(), "Andino server started");
        Ok(addr)
    }

    async fn start_components(&self) -> Result<SocketAddr, ServerError> {
        let inner = &self.inner;
        let devices = &inner.devices;

        devices.backend.start().await?;
        if let Some(display) = &devices.display {
            display.start().await?;
        }
        if let Some(keypad) = &devices.keypad {
            keypad.start().await?;
        }

        if let Some(events) = inner.events.lock().await.take() {
            let pump = tokio::spawn(run_event_pump(
                events,
                inner.dispatcher.clone(),
                inner.pump_shutdown.clone(),
            ));
            *inner.pump.lock().await = Some(pump);
        }

        Ok(inner.listener.start(inner.dispatcher.clone()).await?)
    }

    /// Stop backend, display, keypad, listener and event pump, in that order.
    /// Idempotent.
    pub async fn stop(&self) {
        {
            let mut phase = self.inner.phase.lock().await;
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopped;
        }
        self.shutdown_components().await;
        self.inner.stopped.cancel();
        info!("Andino server stopped");
    }

    async fn shutdown_components(&self) {
        let inner = &self.inner;
        let devices = &inner.devices;

        if let Err(e) = devices.backend.stop().await {
            warn!(error = %e, "Backend stop failed");
        }
        if let Some(display) = &devices.display
            && let Err(e) = display.stop().await
        {
            warn!(error = %e, "Display stop failed");
        }
        if let Some(keypad) = &devices.keypad
            && let Err(e) = keypad.stop().await
        {
            warn!(error = %e, "Keypad stop failed");
        }
        inner.listener.stop().await;

        inner.pump_shutdown.cancel();
        if let Some(pump) = inner.pump.lock().await.take()
            && let Err(e) = pump.await
        {
            error!(error = %e, "Event pump failed");
        }
    }

    /// Resolves once the server has fully stopped.
    pub async fn stopped(&self) {
        self.inner.stopped.cancelled().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_cancelled()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.listener.local_addr().await
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.listener.connections().await
    }

    pub fn backend(&self) -> &AnyBackend {
        &self.inner.devices.backend
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

async fn run_event_pump(mut events: EventReceiver, dispatcher: Dispatcher, shutdown: CancellationToken) {
    debug!("Event pump running");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Some(event) => {
                dispatcher.publish(&event).await;
            }
            None => break,
        }
    }
    debug!("Event pump stopped");
}

/// Assembles an [`AndinoServer`].
///
/// Create devices with [`event_sender`](Self::event_sender) so their events
/// reach the clients.
pub struct AndinoServerBuilder {
    tcp: TcpConfig,
    events: (EventSender, EventReceiver),
    sequencer: Sequencer,
    backend: Option<AnyBackend>,
    keypad: Option<AnyKeypad>,
    display: Option<AnyDisplay>,
    oled: Option<AnyOled>,
}

impl AndinoServerBuilder {
    fn new(tcp: TcpConfig) -> Self {
        Self {
            tcp,
            events: event_channel(EVENT_CHANNEL_CAPACITY),
            sequencer: Sequencer::new(),
            backend: None,
            keypad: None,
            display: None,
            oled: None,
        }
    }

    /// Sender devices publish their events on.
    pub fn event_sender(&self) -> EventSender {
        self.events.0.clone()
    }

    pub fn backend(mut self, backend: impl Into<AnyBackend>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn keypad(mut self, keypad: AnyKeypad) -> Self {
        self.keypad = Some(keypad);
        self
    }

    pub fn display(mut self, display: AnyDisplay) -> Self {
        self.display = Some(display);
        self
    }

    pub fn oled(mut self, oled: AnyOled) -> Self {
        self.oled = Some(oled);
        self
    }

    /// First broadcast sequence number, `0` by default.
    pub fn sequence_start(mut self, value: u16) -> Self {
        self.sequencer = Sequencer::starting_at(value);
        self
    }

    /// # Errors
    ///
    /// - [`ServerError::MissingBackend`] without a backend
    /// - [`ServerError::MissingDevice`] when a peripheral flag is on but the
    ///   device was not supplied
    /// - [`ServerError::Listener`] for an unusable bind address
    pub fn build(self) -> Result<AndinoServer, ServerError> {
        let tcp = self.tcp;
        let backend = self.backend.ok_or(ServerError::MissingBackend)?;
        let keypad = enabled("key_rfid", tcp.key_rfid, self.keypad)?;
        let display = enabled("display", tcp.display, self.display)?;
        let oled = enabled("oled", tcp.oled, self.oled)?;

        let listener = LineServer::new(LineServerConfig::from_tcp(&tcp)?);
        let devices = Arc::new(Devices {
            backend,
            keypad,
            display,
            oled,
        });
        let fatal = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&devices),
            tcp.temp,
            Arc::new(self.sequencer),
            listener.broadcaster(),
            fatal.clone(),
        );
        let (_, events) = self.events;

        Ok(AndinoServer {
            inner: Arc::new(Inner {
                devices,
                dispatcher,
                listener,
                events: Mutex::new(Some(events)),
                pump: Mutex::new(None),
                phase: Mutex::new(Phase::Idle),
                fatal,
                pump_shutdown: CancellationToken::new(),
                stopped: CancellationToken::new(),
            }),
        })
    }
}

/// Keep `device` only when its feature flag is on.
fn enabled<T>(name: &'static str, flag: bool, device: Option<T>) -> Result<Option<T>, ServerError> {
    match (flag, device) {
        (true, None) => Err(ServerError::MissingDevice(name)),
        (true, Some(device)) => Ok(Some(device)),
        (false, Some(_)) => {
            debug!(device = name, "Device supplied but disabled, ignoring");
            Ok(None)
        }
        (false, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig};
    use andino_hardware::EmulatorBackend;
    use andino_hardware::mock::{MockKeypad, MockPins};

    fn tcp() -> TcpConfig {
        TcpConfig {
            port: 0,
            bind_address: "127.0.0.1".into(),
            ..TcpConfig::default()
        }
    }

    fn emulator(builder: &AndinoServerBuilder) -> EmulatorBackend {
        let io = IoConfig {
            pin_power_fail: None,
            ..IoConfig::default()
        };
        EmulatorBackend::new(
            Arc::new(MockPins::new()),
            io,
            EmulatorSettings::default(),
            &ShutdownConfig::default(),
            builder.event_sender(),
        )
    }

    #[test]
    fn test_build_requires_backend() {
        assert!(matches!(
            AndinoServer::builder(tcp()).build(),
            Err(ServerError::MissingBackend)
        ));
    }

    #[test]
    fn test_build_requires_enabled_devices() {
        let config = TcpConfig {
            key_rfid: true,
            ..tcp()
        };
        let builder = AndinoServer::builder(config);
        let backend = emulator(&builder);
        assert!(matches!(
            builder.backend(backend).build(),
            Err(ServerError::MissingDevice("key_rfid"))
        ));
    }

    #[tokio::test]
    async fn test_disabled_device_is_ignored() {
        let builder = AndinoServer::builder(tcp());
        let backend = emulator(&builder);
        let (keypad, _handle) = MockKeypad::new(builder.event_sender());
        let server = builder
            .backend(backend)
            .keypad(AnyKeypad::Mock(keypad))
            .build()
            .unwrap();
        assert!(server.inner.devices.keypad.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let builder = AndinoServer::builder(tcp());
        let backend = emulator(&builder);
        let server = builder.backend(backend).build().unwrap();

        let addr = server.start().await.unwrap();
        assert_eq!(server.local_addr().await, Some(addr));
        assert!(server.backend().is_running());
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));

        server.stop().await;
        server.stopped().await;
        assert!(server.is_stopped());
        assert!(!server.backend().is_running());
        assert!(server.local_addr().await.is_none());

        server.stop().await;
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_fatal_token_stops_server() {
        let builder = AndinoServer::builder(tcp());
        let backend = emulator(&builder);
        let server = builder.backend(backend).build().unwrap();
        server.start().await.unwrap();

        server.inner.fatal.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), server.stopped())
            .await
            .unwrap();
        assert!(!server.backend().is_running());
    }
}
