//! Emulator driven through the backend enum, the way the server uses it.

use std::sync::Arc;
use std::time::Duration;

use andino_core::{EmulatorSettings, IoConfig, ShutdownConfig};
use andino_hardware::mock::{MockKeypad, MockKeypadHandle, MockPins};
use andino_hardware::{
    AnyBackend, AnyKeypad, DeviceEvent, EmulatorBackend, EventReceiver, HardwareBackend,
    HardwareError, KeypadRfid, event_channel,
};
use tokio::time::sleep;

const INPUT: u32 = 13;
const RELAY_2: u32 = 6;

struct Rig {
    backend: AnyBackend,
    pins: MockPins,
    events: EventReceiver,
    keypad: AnyKeypad,
    handle: MockKeypadHandle,
}

fn setup(settings: EmulatorSettings) -> Rig {
    let pins = MockPins::new();
    let (events, rx) = event_channel(32);
    let io = IoConfig {
        input_pins: vec![INPUT, 19],
        relay_pins: vec![5, RELAY_2],
        pin_power_fail: None,
        scan_interval_ms: 1,
        ..IoConfig::default()
    };
    let shutdown = ShutdownConfig {
        enabled: false,
        ..ShutdownConfig::default()
    };
    let emulator =
        EmulatorBackend::new(Arc::new(pins.clone()), io, settings, &shutdown, events.clone());
    let (keypad, handle) = MockKeypad::new(events);
    Rig {
        backend: emulator.into(),
        pins,
        events: rx,
        keypad: AnyKeypad::Mock(keypad),
        handle,
    }
}

async fn press(pins: &MockPins, hold: Duration) {
    pins.set_level(INPUT, true);
    sleep(hold).await;
    pins.set_level(INPUT, false);
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_held_presses_are_counted() {
    let settings = EmulatorSettings {
        debounce_ms: 0,
        polling_ms: 50,
        ..EmulatorSettings::default()
    };
    let Rig { backend, pins, .. } = setup(settings);
    backend.start().await.unwrap();

    press(&pins, Duration::from_millis(100)).await;
    // Released before the hold time: no count.
    press(&pins, Duration::from_millis(20)).await;
    press(&pins, Duration::from_millis(100)).await;

    assert_eq!(backend.get_counters(0).await.unwrap(), "{2,0}");
    assert_eq!(backend.reset().await.unwrap(), "RESET");
    assert_eq!(backend.get_counters(0).await.unwrap(), "{0,0}");

    backend.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pulse_releases_relay() {
    let Rig { backend, pins, .. } = setup(EmulatorSettings::default());
    backend.start().await.unwrap();

    assert_eq!(backend.pulse_relay(2, 30).await.unwrap(), "RPU2 30");
    assert!(pins.level(RELAY_2));

    sleep(Duration::from_millis(50)).await;
    assert!(!pins.level(RELAY_2));
    assert_eq!(backend.get_counters(2).await.unwrap(), "{0,0}{0,0}{0,0}");

    backend.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backend_and_keypad_share_event_channel() {
    let settings = EmulatorSettings {
        debounce_ms: 0,
        send_on_change: true,
        send_counter: false,
        change_pattern: vec![true, false],
        ..EmulatorSettings::default()
    };
    let Rig {
        backend,
        pins,
        events: mut rx,
        keypad,
        handle,
    } = setup(settings);
    backend.start().await.unwrap();
    keypad.start().await.unwrap();

    pins.set_level(INPUT, true);
    let first = rx.recv().await.unwrap();
    assert_eq!(first, DeviceEvent::Broadcast("{1,0}".to_string()));

    handle.scan_card("04A1B2C3").await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(second, DeviceEvent::Rfid("04A1B2C3".to_string()));

    keypad.stop().await.unwrap();
    assert!(matches!(
        handle.scan_card("04A1B2C3").await,
        Err(HardwareError::NotRunning { .. })
    ));
    backend.stop().await.unwrap();
}

#[tokio::test]
async fn test_commands_require_running_backend() {
    let Rig { backend, .. } = setup(EmulatorSettings::default());

    assert!(!backend.is_running());
    assert!(!backend.supports_temperature());
    assert!(backend.set_relay(1, true).await.is_err());
    assert!(backend.emulator_settings().is_some());
}
