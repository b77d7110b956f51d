//! Dispatch and lifecycle errors.

use andino_hardware::HardwareError;
use andino_network::LineServerError;
use andino_protocol::ArgError;
use thiserror::Error;

use andino_core::constants::{REPLY_CRITICAL, REPLY_DISPLAY_DISABLED, REPLY_ERROR};

/// How the dispatcher reacts to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The controller did not confirm in time.
    Timeout,
    /// An argument could not be parsed or is out of range.
    InvalidArgument,
    /// Anything else that leaves the server usable.
    Recoverable,
    /// The server cannot continue and shuts down.
    Critical,
}

/// Why a command produced no regular reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("display is disabled")]
    DisplayDisabled,

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Argument(_) => FailureClass::InvalidArgument,
            Self::Hardware(e) if e.is_critical() => FailureClass::Critical,
            Self::Hardware(e) if e.is_timeout() => FailureClass::Timeout,
            Self::Hardware(HardwareError::InvalidArgument { .. }) => FailureClass::InvalidArgument,
            Self::Hardware(_) | Self::Disabled(_) | Self::DisplayDisabled => {
                FailureClass::Recoverable
            }
            Self::Panicked(_) => FailureClass::Critical,
        }
    }

    /// Line sent to every client.
    pub fn reply(&self) -> &'static str {
        match (self, self.class()) {
            (_, FailureClass::Critical) => REPLY_CRITICAL,
            (Self::DisplayDisabled, _) => REPLY_DISPLAY_DISABLED,
            _ => REPLY_ERROR,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Panicked(message)
    }
}

/// Errors building or starting an [`AndinoServer`](crate::AndinoServer).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No hardware backend configured")]
    MissingBackend,

    #[error("{0} is enabled but no device was supplied")]
    MissingDevice(&'static str),

    #[error("Server was already started")]
    AlreadyStarted,

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Listener error: {0}")]
    Listener(#[from] LineServerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ArgError::Missing { index: 0 }.into(), FailureClass::InvalidArgument, "ERROR")]
    #[case(HardwareError::timeout("INFO", 1000).into(), FailureClass::Timeout, "ERROR")]
    #[case(HardwareError::invalid_argument("relay 9").into(), FailureClass::InvalidArgument, "ERROR")]
    #[case(HardwareError::unsupported("CHNP").into(), FailureClass::Recoverable, "ERROR")]
    #[case(HardwareError::not_running("io").into(), FailureClass::Recoverable, "ERROR")]
    #[case(DispatchError::Disabled("temperature"), FailureClass::Recoverable, "ERROR")]
    #[case(DispatchError::DisplayDisabled, FailureClass::Recoverable, "ERROR DISPLAY DISABLED")]
    #[case(HardwareError::disconnected("/dev/ttyAMA0").into(), FailureClass::Critical, "ERROR CRITICAL SERVICE CLOSED")]
    #[case(DispatchError::Panicked("boom".into()), FailureClass::Critical, "ERROR CRITICAL SERVICE CLOSED")]
    fn test_failure_policy(
        #[case] error: DispatchError,
        #[case] class: FailureClass,
        #[case] reply: &str,
    ) {
        assert_eq!(error.class(), class);
        assert_eq!(error.reply(), reply);
    }

    #[test]
    fn test_panic_payloads() {
        let e = DispatchError::from_panic(Box::new("static"));
        assert_eq!(e.to_string(), "handler panicked: static");
        let e = DispatchError::from_panic(Box::new(String::from("owned")));
        assert_eq!(e.to_string(), "handler panicked: owned");
        let e = DispatchError::from_panic(Box::new(42_u8));
        assert_eq!(e.to_string(), "handler panicked: unknown panic");
    }
}
