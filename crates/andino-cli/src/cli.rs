use std::path::PathBuf;

use andino_core::{AndinoConfig, HardwareKind};
use clap::{Parser, ValueEnum};

/// Serve the Andino line protocol over TCP.
#[derive(Debug, Parser)]
#[command(name = "andino", version, about)]
pub struct Cli {
    /// TOML configuration; `<stem>_saved.toml` next to it takes precedence
    #[arg(short, long, env = "ANDINO_CONFIG")]
    pub config: Option<PathBuf>,

    /// TCP port, overrides `tcp.port`
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Hardware backend, overrides `tcp.hardware`
    #[arg(long, value_enum)]
    pub hardware: Option<Hardware>,

    /// Run the emulator on in-memory pins with mock peripherals
    #[arg(long)]
    pub simulate: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Do not persist emulator settings on exit
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Hardware {
    /// GPIO emulator
    Io,
    /// Serial X1 controller
    X1,
}

impl From<Hardware> for HardwareKind {
    fn from(hardware: Hardware) -> Self {
        match hardware {
            Hardware::Io => Self::Io,
            Hardware::X1 => Self::X1,
        }
    }
}

impl Cli {
    /// Apply command-line overrides to a loaded configuration.
    pub fn apply(&self, config: &mut AndinoConfig) {
        if let Some(port) = self.port {
            config.tcp.port = port;
        }
        if let Some(hardware) = self.hardware {
            config.tcp.hardware = hardware.into();
        }
        if self.simulate {
            config.tcp.hardware = HardwareKind::Io;
        }
    }
}
