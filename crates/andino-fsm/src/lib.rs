//! Event-driven finite state machine and the lamp controller built on it.
//!
//! A [`StateMachine`] holds named [`State`]s. Each state maps event names to
//! handlers; a handler returns the name of the next state, or `None` to stay.
//! Handlers registered globally are consulted when the current state has no
//! handler of its own.
//!
//! ```
//! use andino_fsm::{State, StateMachine};
//!
//! let mut fsm = StateMachine::<u32>::new();
//! fsm.add_start_state("idle", State::new().on("coin", |_| Some("open".into())));
//! fsm.add_state("open", State::new().on("push", |_| Some("idle".into())));
//!
//! fsm.run().unwrap();
//! fsm.send_event("coin", &1).unwrap();
//! assert_eq!(fsm.current_state(), Some("open"));
//! ```

pub mod error;
pub mod lamp;
pub mod machine;

pub use error::{FsmError, Result};
pub use lamp::{Lamp, LampController, LampOutputs, LampSnapshot, PinChange};
pub use machine::{Handler, State, StateMachine, StateTransition};
