//! `andino`: run an Andino terminal server until interrupted.

mod cli;

use std::sync::Arc;

use andino_core::{AndinoConfig, ConfigStore, HardwareKind};
use andino_hardware::mock::{MockDisplay, MockKeypad, MockOled, MockPins};
use andino_hardware::sysfs::SysfsPins;
use andino_hardware::{
    AnyBackend, AnyDisplay, AnyKeypad, AnyOled, EmulatorBackend, EventSender, PinDriver,
    SerialBackend,
};
use andino_server::{AndinoServer, AndinoServerBuilder};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let store = cli.config.as_ref().map(ConfigStore::new);
    let mut config = load_config(store.as_ref())?;
    cli.apply(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.tcp.port,
        hardware = ?config.tcp.hardware,
        simulate = cli.simulate,
        "Starting Andino server"
    );

    let server = build_server(&mut config, cli.simulate)?;
    let addr = server.start().await.context("failed to start server")?;
    info!(addr = %addr, "Ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Interrupted, shutting down");
        }
        _ = server.stopped() => warn!("Server stopped itself"),
    }
    server.stop().await;

    if let (Some(store), false) = (store, cli.no_save)
        && let Some(settings) = server.backend().emulator_settings()
    {
        store
            .save_emulator(&settings)
            .context("failed to save settings")?;
        info!(path = %store.saved_path().display(), "Emulator settings saved");
    }
    Ok(())
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn load_config(store: Option<&ConfigStore>) -> Result<AndinoConfig> {
    let Some(store) = store else {
        return Ok(AndinoConfig::default());
    };
    match store.load() {
        Ok(config) => Ok(config),
        Err(andino_core::Error::ConfigNotFound { path }) => {
            warn!(path = %path.display(), "Configuration not found, using defaults");
            Ok(AndinoConfig::default())
        }
        Err(e) => Err(e).context("failed to load configuration"),
    }
}

fn build_server(config: &mut AndinoConfig, simulate: bool) -> Result<AndinoServer> {
    if !simulate {
        disable_driverless_devices(config);
    }
    let builder = AndinoServer::builder(config.tcp.clone());
    let events = builder.event_sender();

    let backend: AnyBackend = match (config.tcp.hardware, simulate) {
        (_, true) => {
            let pins = MockPins::new();
            // Power-fail input is active low.
            if let Some(pin) = config.io.pin_power_fail {
                pins.set_level(pin, true);
            }
            emulator(Arc::new(pins), config, events.clone()).into()
        }
        (HardwareKind::Io, false) => {
            let pins = SysfsPins::new(&config.io.gpio_base_path);
            emulator(Arc::new(pins), config, events.clone()).into()
        }
        (HardwareKind::X1, false) => SerialBackend::new(
            config.serial.clone(),
            &config.shutdown,
            events.clone(),
        )
        .into(),
    };

    let mut builder = builder.backend(backend);
    if simulate {
        builder = mock_peripherals(builder, config, events);
    }
    Ok(builder.build()?)
}

fn emulator(pins: Arc<dyn PinDriver>, config: &AndinoConfig, events: EventSender) -> EmulatorBackend {
    EmulatorBackend::new(
        pins,
        config.io.clone(),
        config.emulator.clone(),
        &config.shutdown,
        events,
    )
}

/// Only mock peripherals exist; on real hardware their flags are switched off.
fn disable_driverless_devices(config: &mut AndinoConfig) {
    let tcp = &mut config.tcp;
    for (name, flag) in [
        ("key_rfid", &mut tcp.key_rfid),
        ("display", &mut tcp.display),
        ("oled", &mut tcp.oled),
    ] {
        if *flag {
            warn!(device = name, "No driver for this device, disabled");
            *flag = false;
        }
    }
}

fn mock_peripherals(
    mut builder: AndinoServerBuilder,
    config: &AndinoConfig,
    events: EventSender,
) -> AndinoServerBuilder {
    if config.tcp.key_rfid {
        let (keypad, _handle) = MockKeypad::new(events.clone());
        builder = builder.keypad(AnyKeypad::Mock(keypad));
    }
    if config.tcp.display {
        let (display, _handle) = MockDisplay::new(events);
        builder = builder.display(AnyDisplay::Mock(display));
    }
    if config.tcp.oled {
        builder = builder.oled(AnyOled::Mock(MockOled::new()));
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_save_keeps_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("andino.toml");
        std::fs::write(
            &base,
            "[tcp]\nport = 9999\nhardware = \"x1\"\nkey_rfid = true\n",
        )
        .unwrap();
        let store = ConfigStore::new(&base);

        let cli = Cli::parse_from(["andino", "--simulate", "--port", "7000"]);
        let mut config = load_config(Some(&store)).unwrap();
        cli.apply(&mut config);
        disable_driverless_devices(&mut config);
        assert_eq!(config.tcp.port, 7000);

        config.emulator.debounce_ms = 40;
        store.save_emulator(&config.emulator).unwrap();

        let next_run = load_config(Some(&store)).unwrap();
        assert_eq!(next_run.tcp.port, 9999);
        assert_eq!(next_run.tcp.hardware, HardwareKind::X1);
        assert!(next_run.tcp.key_rfid);
        assert_eq!(next_run.emulator.debounce_ms, 40);
    }
}
