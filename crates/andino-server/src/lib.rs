//! Andino terminal server: the command dispatcher and everything around it.
//!
//! Lines from any client go through the [`Dispatcher`], which parses the verb,
//! calls the active hardware backend or peripheral and broadcasts the reply.
//! Device events are numbered with the shared broadcast sequence and fanned
//! out the same way. [`AndinoServer`] owns the lifecycle of all of it.
//!
//! # Failure policy
//!
//! | Failure | Reply | Server |
//! |---------|-------|--------|
//! | unknown verb | none | continues |
//! | bad argument, timeout, disabled feature, other | `ERROR` | continues |
//! | `DISP` while the display is off | `ERROR DISPLAY DISABLED` | continues |
//! | lost hardware link, handler panic | `ERROR CRITICAL SERVICE CLOSED` | stops |

mod dispatcher;
mod error;
mod server;

pub use dispatcher::{Dispatcher, format_event};
pub use error::{DispatchError, FailureClass, ServerError};
pub use server::{AndinoServer, AndinoServerBuilder};
