//! Hardware failures.
//!
//! The dispatcher asks two things of an error: was it a confirmation
//! timeout ([`HardwareError::is_timeout`]) and is the device gone for good
//! ([`HardwareError::is_critical`]). Everything else replies `ERROR` and
//! the server keeps running.

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The link to the device is gone.
    #[error("Link lost: {device}")]
    Disconnected { device: String },

    /// No confirmation arrived within the deadline.
    #[error("No confirmation for {command:?} after {duration_ms}ms")]
    Timeout { command: String, duration_ms: u64 },

    /// The active backend has no such command.
    #[error("{command} is not supported by this backend")]
    Unsupported { command: String },

    #[error("{device} is not running")]
    NotRunning { device: String },

    /// Argument outside what the device accepts, e.g. a relay that does not exist.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A GPIO read or write failed.
    #[error("GPIO error: {message}")]
    Gpio { message: String },

    /// The device returned something that cannot be interpreted.
    #[error("Unreadable value: {message}")]
    BadReading { message: String },

    /// Port, pin or thread could not be opened.
    #[error("Cannot open {message}")]
    OpenFailed { message: String },

    #[error("Shutdown script exited with {status}")]
    ShutdownScript { status: std::process::ExitStatus },

    /// Text could not be encoded for the link.
    #[error("Encoding error: {0}")]
    Encoding(#[from] andino_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn timeout(command: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            command: command.into(),
            duration_ms,
        }
    }

    pub fn unsupported(command: impl Into<String>) -> Self {
        Self::Unsupported {
            command: command.into(),
        }
    }

    pub fn not_running(device: impl Into<String>) -> Self {
        Self::NotRunning {
            device: device.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn gpio(message: impl Into<String>) -> Self {
        Self::Gpio {
            message: message.into(),
        }
    }

    pub fn bad_reading(message: impl Into<String>) -> Self {
        Self::BadReading {
            message: message.into(),
        }
    }

    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::OpenFailed {
            message: message.into(),
        }
    }

    /// Confirmation deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The device cannot serve further commands.
    ///
    /// Only a lost link counts; every other failure leaves the device usable
    /// for the next command.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}
