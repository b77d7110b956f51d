//! Error types for the state machine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsmError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError {
    /// `send_event` before `run`.
    #[error("state machine has not been started")]
    NotStarted,

    /// `run` without a start state.
    #[error("no start state registered")]
    NoStartState,

    /// A handler named a state that does not exist.
    #[error("invalid transition target {to:?} from state {from:?}")]
    InvalidTransition { from: String, to: String },
}
