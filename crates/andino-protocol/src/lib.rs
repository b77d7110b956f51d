//! Wire protocol of the Andino terminal control server.
//!
//! ```text
//! client ──"REL1 1\n"──▶ LineCodec ──▶ parse_line ──▶ Command { verb: Relay(1), args: ["1"] }
//!
//! device event ──▶ Sequencer ──▶ ":002A@R{04A1B2C3}" ──▶ LineCodec ──▶ every client
//! ```
//!
//! - [`command`]: the verb table and argument helpers
//! - [`peripheral`]: `DISP` / `OLED` sub-command grammar
//! - [`broadcast`] and [`sequence`]: numbering and formatting of asynchronous events
//! - [`codec`]: newline framing with a configurable text encoding

pub mod broadcast;
pub mod codec;
pub mod command;
pub mod error;
pub mod peripheral;
pub mod sequence;

pub use broadcast::{EventTag, format_raw, format_tagged, status_blocks, strip_broadcast_header};
pub use codec::LineCodec;
pub use command::{Command, Line, Verb, parse_bit_pattern, parse_line};
pub use error::{ArgError, ProtocolError, Result};
pub use peripheral::{DisplayCommand, OledCommand, parse_oled_markup};
pub use sequence::Sequencer;
