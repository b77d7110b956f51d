//! Shared building blocks for the Andino terminal control server.
//!
//! Everything here is runtime-agnostic: the error type, the configuration
//! schema with its single persistence boundary ([`ConfigStore`]), the text
//! encodings accepted on the wire and protocol-wide constants.

pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;

pub use config::{
    AndinoConfig, ConfigStore, EmulatorSettings, HardwareKind, IoConfig, SerialConfig,
    ShutdownConfig, TcpConfig,
};
pub use encoding::TextEncoding;
pub use error::{Error, Result};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
