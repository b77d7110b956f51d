//! Configuration schema and its persistence boundary.
//!
//! One [`AndinoConfig`] is loaded at startup and handed out section by
//! section to the components that need it. Nothing writes to disk behind the
//! caller's back: runtime setters mutate in-memory state only, and the owner
//! of the process decides when to call [`ConfigStore::save`].
//!
//! # File layout
//!
//! ```toml
//! [tcp]
//! port = 9999
//! hardware = "io"          # "io" = GPIO emulator, "x1" = serial controller
//! temp = false
//!
//! [io]
//! input_pins = [13, 19, 16, 26, 20, 21]
//! relay_pins = [5, 6, 12]
//! pin_power_fail = 18
//!
//! [emulator]
//! send_on_change = true
//! change_pattern = [true, true, false, false, false, false]
//!
//! [serial]
//! port = "/dev/ttyAMA0"
//! baud_rate = 38400
//! ```
//!
//! # Saved overlay
//!
//! [`ConfigStore::save`] never touches the base file. It writes
//! `<stem>_saved.toml` next to it, and [`ConfigStore::load`] prefers that
//! overlay when it exists, so a site can always return to the shipped
//! configuration by deleting one file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::*;
use crate::{Error, Result, TextEncoding};

/// Which hardware backend serves the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareKind {
    /// Local GPIO emulator of the controller protocol.
    #[default]
    Io,
    /// Serial-attached X1 controller.
    X1,
}

/// Complete process configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndinoConfig {
    pub tcp: TcpConfig,
    pub io: IoConfig,
    pub emulator: EmulatorSettings,
    pub serial: SerialConfig,
    pub shutdown: ShutdownConfig,
}

/// Listener and feature flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub port: u16,
    pub bind_address: String,
    pub hardware: HardwareKind,
    /// Enable the temperature command family (`TBUS`, `ADDRT`, `SENDT`, `TEMP`).
    pub temp: bool,
    /// Enable the touch display (`DISP`).
    pub display: bool,
    /// Enable the keypad/RFID controller (`BUZZ` and its events).
    pub key_rfid: bool,
    /// Enable the OLED panel (`OLED`).
    pub oled: bool,
    pub encoding: TextEncoding,
    pub max_connections: usize,
    pub write_timeout_ms: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TCP_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            hardware: HardwareKind::default(),
            temp: false,
            display: false,
            key_rfid: false,
            oled: false,
            encoding: TextEncoding::Utf8,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

/// Pin assignment of the local I/O board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_pins: Vec<u32>,
    pub relay_pins: Vec<u32>,
    pub pin_power_fail: Option<u32>,
    /// Pull-up per input; a missing entry means `false` (active-high).
    pub input_pull_up: Vec<bool>,
    /// Relay state applied at start.
    pub relays_start_config: Vec<bool>,
    /// Relay polarity; a missing entry means `true`.
    pub relays_active_high: Vec<bool>,
    pub scan_interval_ms: u64,
    pub gpio_base_path: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_pins: vec![13, 19, 16, 26, 20, 21],
            relay_pins: vec![5, 6, 12],
            pin_power_fail: Some(18),
            input_pull_up: Vec::new(),
            relays_start_config: Vec::new(),
            relays_active_high: Vec::new(),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            gpio_base_path: DEFAULT_GPIO_BASE_PATH.to_string(),
        }
    }
}

impl IoConfig {
    pub fn pull_up(&self, input: usize) -> bool {
        self.input_pull_up.get(input).copied().unwrap_or(false)
    }

    pub fn relay_start(&self, relay: usize) -> bool {
        self.relays_start_config.get(relay).copied().unwrap_or(false)
    }

    pub fn relay_active_high(&self, relay: usize) -> bool {
        self.relays_active_high.get(relay).copied().unwrap_or(true)
    }
}

/// Runtime-adjustable behaviour of the GPIO emulator.
///
/// These are the values the controller commands (`POLL`, `SEND`, `CHNG`, ...)
/// mutate. The emulator exposes a snapshot so the owner can persist it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorSettings {
    /// Periodic status broadcast enabled.
    pub send_broadcast: bool,
    /// Include the counter block in status broadcasts.
    pub send_counter: bool,
    /// Include the relay block in status broadcasts.
    pub send_relays: bool,
    /// Broadcast the status on every input change selected by `change_pattern`.
    pub send_on_change: bool,
    pub change_pattern: Vec<bool>,
    /// Hold time in ms before an active input counts.
    pub polling_ms: u64,
    pub debounce_ms: u64,
    pub skip: u32,
    pub send_interval_ms: u64,
    /// Overrides `io.input_pull_up` for every input once `EDGE` was issued.
    pub edge_pull_up: Option<bool>,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            send_broadcast: false,
            send_counter: true,
            send_relays: false,
            send_on_change: false,
            change_pattern: vec![true; 6],
            polling_ms: 10,
            debounce_ms: 5,
            skip: 0,
            send_interval_ms: 1000,
            edge_pull_up: None,
        }
    }
}

impl EmulatorSettings {
    /// Whether input `index` participates in change broadcasts.
    pub fn reports_change(&self, index: usize) -> bool {
        self.change_pattern.get(index).copied().unwrap_or(false)
    }
}

/// Serial link to the X1 controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub confirm_timeout_ms: u64,
    pub read_size: usize,
    pub encoding: TextEncoding,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_SERIAL_READ_TIMEOUT_MS,
            confirm_timeout_ms: DEFAULT_CONFIRM_TIMEOUT_MS,
            read_size: DEFAULT_SERIAL_READ_SIZE,
            encoding: TextEncoding::Ascii,
        }
    }
}

/// Deferred OS shutdown on a held power-fail input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub enabled: bool,
    /// Time the request must persist before the script runs.
    pub hold_ms: u64,
    pub script: String,
    /// Block of the serial broadcast carrying the power-fail flag.
    pub serial_block: Option<usize>,
    /// Position of the flag inside `serial_block`.
    pub serial_index: usize,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hold_ms: DEFAULT_SHUTDOWN_HOLD_MS,
            script: DEFAULT_SHUTDOWN_SCRIPT.to_string(),
            serial_block: None,
            serial_index: 0,
        }
    }
}

impl AndinoConfig {
    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject combinations the backends cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.io.relay_pins.len() > usize::from(MAX_RELAYS) {
            return Err(Error::Config(format!(
                "at most {MAX_RELAYS} relays are addressable, got {}",
                self.io.relay_pins.len()
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial baud_rate must be positive".into()));
        }
        if self.serial.read_size == 0 {
            return Err(Error::Config("serial read_size must be positive".into()));
        }
        if self.io.scan_interval_ms == 0 {
            return Err(Error::Config("io scan_interval_ms must be positive".into()));
        }
        if self.tcp.max_connections == 0 {
            return Err(Error::Config("tcp max_connections must be positive".into()));
        }
        Ok(())
    }
}

/// Loads and saves [`AndinoConfig`] for one base file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the overlay written by [`save`](Self::save).
    pub fn saved_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{stem}{SAVED_CONFIG_SUFFIX}.{}", ext.to_string_lossy()),
            None => format!("{stem}{SAVED_CONFIG_SUFFIX}"),
        };
        self.path.with_file_name(name)
    }

    /// Load the saved overlay if present, otherwise the base file.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigNotFound`] when neither file exists, parse errors as
    /// [`Error::ConfigParse`].
    pub fn load(&self) -> Result<AndinoConfig> {
        let saved = self.saved_path();
        let source = if saved.is_file() {
            saved
        } else if self.path.is_file() {
            self.path.clone()
        } else {
            return Err(Error::ConfigNotFound {
                path: self.path.clone(),
            });
        };

        let text = std::fs::read_to_string(&source).map_err(|source_err| Error::ConfigIo {
            path: source.clone(),
            source: source_err,
        })?;
        let config = AndinoConfig::from_toml_str(&text)?;
        info!(path = %source.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write `config` to the saved overlay.
    pub fn save(&self, config: &AndinoConfig) -> Result<()> {
        let target = self.saved_path();
        let text = config.to_toml_string()?;
        std::fs::write(&target, text).map_err(|source| Error::ConfigIo {
            path: target.clone(),
            source,
        })?;
        debug!(path = %target.display(), "Configuration saved");
        Ok(())
    }

    /// Persist only the emulator section, leaving every other section as
    /// stored on disk.
    ///
    /// Runtime overrides held in memory (port, hardware, disabled devices)
    /// never reach the overlay this way.
    pub fn save_emulator(&self, settings: &EmulatorSettings) -> Result<()> {
        let mut stored = match self.load() {
            Ok(config) => config,
            Err(Error::ConfigNotFound { .. }) => AndinoConfig::default(),
            Err(e) => return Err(e),
        };
        stored.emulator = settings.clone();
        self.save(&stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = AndinoConfig::from_toml_str("").unwrap();
        assert_eq!(config, AndinoConfig::default());
        assert_eq!(config.tcp.port, 9999);
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.tcp.hardware, HardwareKind::Io);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = AndinoConfig::from_toml_str(
            r#"
            [tcp]
            port = 7000
            hardware = "x1"
            encoding = "latin-1"

            [emulator]
            send_on_change = true
            change_pattern = [true, false]
            "#,
        )
        .unwrap();

        assert_eq!(config.tcp.port, 7000);
        assert_eq!(config.tcp.hardware, HardwareKind::X1);
        assert_eq!(config.tcp.encoding, TextEncoding::Latin1);
        assert!(!config.tcp.temp);
        assert!(config.emulator.send_on_change);
        assert!(config.emulator.reports_change(0));
        assert!(!config.emulator.reports_change(1));
        assert!(!config.emulator.reports_change(7));
        assert_eq!(config.emulator.send_interval_ms, 1000);
    }

    #[rstest]
    #[case("[io]\nrelay_pins = [1,2,3,4,5,6,7,8,9]")]
    #[case("[serial]\nbaud_rate = 0")]
    #[case("[io]\nscan_interval_ms = 0")]
    fn test_invalid_values_are_rejected(#[case] text: &str) {
        assert!(matches!(
            AndinoConfig::from_toml_str(text),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_io_defaults_for_short_vectors() {
        let io = IoConfig {
            input_pull_up: vec![true],
            relays_active_high: vec![false],
            ..IoConfig::default()
        };
        assert!(io.pull_up(0));
        assert!(!io.pull_up(3));
        assert!(!io.relay_active_high(0));
        assert!(io.relay_active_high(2));
        assert!(!io.relay_start(1));
    }

    #[test]
    fn test_saved_path_sits_next_to_base() {
        let store = ConfigStore::new("/etc/andino/default.toml");
        assert_eq!(
            store.saved_path(),
            PathBuf::from("/etc/andino/default_saved.toml")
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.toml"));
        assert!(matches!(store.load(), Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_saved_overlay_wins_over_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("andino.toml");
        std::fs::write(&base, "[tcp]\nport = 1000\n").unwrap();
        let store = ConfigStore::new(&base);

        assert_eq!(store.load().unwrap().tcp.port, 1000);

        let mut config = store.load().unwrap();
        config.tcp.port = 2000;
        config.emulator.send_broadcast = true;
        store.save(&config).unwrap();

        // Base file is untouched
        let base_text = std::fs::read_to_string(&base).unwrap();
        assert!(base_text.contains("1000"));

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.tcp.port, 2000);
        assert!(reloaded.emulator.send_broadcast);
    }

    #[test]
    fn test_save_emulator_keeps_stored_sections() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("andino.toml");
        std::fs::write(&base, "[tcp]\nport = 1000\nhardware = \"x1\"\nkey_rfid = true\n").unwrap();
        let store = ConfigStore::new(&base);

        let mut running = store.load().unwrap();
        running.tcp.port = 7000;
        running.tcp.hardware = HardwareKind::Io;
        running.tcp.key_rfid = false;
        running.emulator.polling_ms = 77;
        store.save_emulator(&running.emulator).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.tcp.port, 1000);
        assert_eq!(reloaded.tcp.hardware, HardwareKind::X1);
        assert!(reloaded.tcp.key_rfid);
        assert_eq!(reloaded.emulator.polling_ms, 77);
    }

    #[test]
    fn test_save_emulator_without_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.toml"));
        let settings = EmulatorSettings {
            debounce_ms: 12,
            ..EmulatorSettings::default()
        };

        store.save_emulator(&settings).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.emulator.debounce_ms, 12);
        assert_eq!(reloaded.tcp, TcpConfig::default());
    }
}
