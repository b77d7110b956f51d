//! Full server over loopback: clients, dispatcher, emulator and mock devices.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use andino_core::{EmulatorSettings, IoConfig, SerialConfig, ShutdownConfig, TcpConfig};
use andino_hardware::mock::{MockDisplay, MockKeypad, MockKeypadHandle, MockOled, MockPins};
use andino_hardware::{AnyDisplay, AnyKeypad, AnyOled, EmulatorBackend, SerialBackend};
use andino_network::{LineClient, LineClientConfig, LineClientError};
use andino_server::AndinoServer;

const INPUT1: u32 = 13;
const RELAY1: u32 = 5;

fn tcp() -> TcpConfig {
    TcpConfig {
        port: 0,
        bind_address: "127.0.0.1".into(),
        ..TcpConfig::default()
    }
}

fn io_config() -> IoConfig {
    IoConfig {
        input_pins: vec![INPUT1, 19],
        relay_pins: vec![RELAY1, 6],
        pin_power_fail: None,
        ..IoConfig::default()
    }
}

async fn client(server: &AndinoServer) -> LineClient {
    let mut client = LineClient::new(LineClientConfig {
        server_addr: server.local_addr().await.unwrap(),
        timeout: Duration::from_secs(2),
        ..LineClientConfig::default()
    });
    client.connect().await.unwrap();
    for _ in 0..200 {
        if !server.connections().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client
}

async fn emulator_server(settings: EmulatorSettings) -> (AndinoServer, MockPins) {
    let pins = MockPins::new();
    let builder = AndinoServer::builder(tcp());
    let backend = EmulatorBackend::new(
        Arc::new(pins.clone()),
        io_config(),
        settings,
        &ShutdownConfig::default(),
        builder.event_sender(),
    );
    let server = builder.backend(backend).build().unwrap();
    server.start().await.unwrap();
    (server, pins)
}

#[tokio::test]
async fn test_relay_command_reaches_every_client() {
    let (server, pins) = emulator_server(EmulatorSettings::default()).await;
    let mut a = client(&server).await;
    let mut b = client(&server).await;
    while server.connections().await.len() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    a.send_line("REL1 1").await.unwrap();
    assert_eq!(a.recv_line().await.unwrap(), "REL1 1");
    assert_eq!(b.recv_line().await.unwrap(), "REL1 1");
    assert!(pins.level(RELAY1));

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_verb_gets_no_reply() {
    let (server, _pins) = emulator_server(EmulatorSettings::default()).await;
    let mut c = client(&server).await;

    c.send_line("FOO 1").await.unwrap();
    c.send_line("PING").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "PING");

    c.send_line("").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "");

    server.stop().await;
}

#[tokio::test]
async fn test_change_broadcast_is_numbered() {
    let settings = EmulatorSettings {
        send_on_change: true,
        send_counter: false,
        polling_ms: 10_000,
        debounce_ms: 0,
        ..EmulatorSettings::default()
    };
    let (server, pins) = emulator_server(settings).await;
    let mut c = client(&server).await;

    pins.set_level(INPUT1, true);
    assert_eq!(c.recv_line().await.unwrap(), ":0000{1,0}");
    pins.set_level(INPUT1, false);
    assert_eq!(c.recv_line().await.unwrap(), ":0001{0,0}");

    server.stop().await;
}

#[tokio::test]
async fn test_periodic_status_after_send() {
    let (server, _pins) = emulator_server(EmulatorSettings::default()).await;
    let mut c = client(&server).await;

    c.send_line("SEND 50").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "SEND 50");
    assert_eq!(c.recv_line().await.unwrap(), ":0000{0,0}{0,0}");

    c.send_line("SEND 0").await.unwrap();
    server.stop().await;
}

async fn peripheral_server() -> (AndinoServer, MockKeypadHandle) {
    let config = TcpConfig {
        key_rfid: true,
        display: true,
        oled: true,
        ..tcp()
    };
    let builder = AndinoServer::builder(config);
    let events = builder.event_sender();
    let backend = EmulatorBackend::new(
        Arc::new(MockPins::new()),
        io_config(),
        EmulatorSettings::default(),
        &ShutdownConfig::default(),
        events.clone(),
    );
    let (keypad, handle) = MockKeypad::new(events.clone());
    let (display, _display_handle) = MockDisplay::new(events);
    let server = builder
        .backend(backend)
        .keypad(AnyKeypad::Mock(keypad))
        .display(AnyDisplay::Mock(display))
        .oled(AnyOled::Mock(MockOled::new()))
        .build()
        .unwrap();
    server.start().await.unwrap();
    (server, handle)
}

#[tokio::test]
async fn test_keypad_events_share_one_sequence() {
    let (server, keypad) = peripheral_server().await;
    let mut c = client(&server).await;

    keypad.scan_card("0012345678").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), ":0000@R{0012345678}");
    keypad.press_function(3).await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), ":0001@F{F3}");
    keypad.press_key("9").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), ":0002@N{9}");

    c.send_line("BUZZ 100").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "BUZZ 100");
    assert_eq!(keypad.buzzes(), vec![100]);

    c.send_line("DISP PAGE 2").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "DISP PAGE 2");

    server.stop().await;
    assert!(!keypad.is_running());
}

/// Serial stream that never delivers a byte.
struct IdleReader;

impl Read for IdleReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(Duration::from_millis(5));
        Err(io::ErrorKind::TimedOut.into())
    }
}

struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_lost_serial_link_closes_service() {
    let builder = AndinoServer::builder(tcp());
    let backend = SerialBackend::from_io(
        IdleReader,
        BrokenWriter,
        SerialConfig::default(),
        &ShutdownConfig::default(),
        builder.event_sender(),
    );
    let server = builder.backend(backend).build().unwrap();
    server.start().await.unwrap();
    let mut c = client(&server).await;

    c.send_line("INFO").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "ERROR CRITICAL SERVICE CLOSED");

    tokio::time::timeout(Duration::from_secs(10), server.stopped())
        .await
        .unwrap();
    assert!(matches!(
        c.recv_line().await,
        Err(LineClientError::ConnectionLost(_))
    ));
}

#[tokio::test]
async fn test_serial_timeout_is_recoverable() {
    let config = SerialConfig {
        confirm_timeout_ms: 50,
        ..SerialConfig::default()
    };
    let builder = AndinoServer::builder(tcp());
    let backend = SerialBackend::from_io(
        IdleReader,
        io::sink(),
        config,
        &ShutdownConfig::default(),
        builder.event_sender(),
    );
    let server = builder.backend(backend).build().unwrap();
    server.start().await.unwrap();
    let mut c = client(&server).await;

    c.send_line("POLL 20").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "ERROR");
    c.send_line("PING").await.unwrap();
    assert_eq!(c.recv_line().await.unwrap(), "PING");
    assert!(!server.is_stopped());

    server.stop().await;
}
