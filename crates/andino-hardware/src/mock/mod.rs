//! Mock devices for testing and simulation.
//!
//! Every mock comes with a cloneable handle that drives it from the outside
//! (raising inputs, scanning cards, touching the display) and records what
//! the server asked of it.

pub mod display;
pub mod keypad;
pub mod oled;
pub mod pins;

pub use display::{DisplayCall, MockDisplay, MockDisplayHandle};
pub use keypad::{MockKeypad, MockKeypadHandle};
pub use oled::{MockOled, OledCall};
pub use pins::MockPins;
