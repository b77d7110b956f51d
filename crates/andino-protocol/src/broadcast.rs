//! Formatting of asynchronous broadcast lines.
//!
//! ```text
//! :<SEQ>@<TAG>{<payload>}   tagged event
//! :<SEQ><payload>           generic hardware broadcast
//! ```
//!
//! `SEQ` is four uppercase hex digits.

use std::fmt;

use andino_core::constants::{BROADCAST_SENTINEL, SEQUENCE_WIDTH};

/// Origin marker of a tagged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// RFID scan
    Rfid,
    /// Function button press
    Function,
    /// Numeric keypad press
    Number,
    /// Display touch or text
    Display,
}

impl EventTag {
    pub fn as_char(&self) -> char {
        match self {
            Self::Rfid => 'R',
            Self::Function => 'F',
            Self::Number => 'N',
            Self::Display => 'D',
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

pub fn format_tagged(seq: u16, tag: EventTag, payload: &str) -> String {
    format!("{BROADCAST_SENTINEL}{seq:04X}@{tag}{{{payload}}}")
}

pub fn format_raw(seq: u16, payload: &str) -> String {
    format!("{BROADCAST_SENTINEL}{seq:04X}{payload}")
}

/// Payload of a broadcast line received from a controller.
///
/// Controllers number their own broadcasts; that sequence is dropped here so
/// the server can apply its own. Returns `None` for confirmation lines.
///
/// ```
/// use andino_protocol::strip_broadcast_header;
///
/// assert_eq!(strip_broadcast_header(":00A1{0,1}{1,0}"), Some("{0,1}{1,0}"));
/// assert_eq!(strip_broadcast_header("REL1 1"), None);
/// ```
pub fn strip_broadcast_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(BROADCAST_SENTINEL)?;
    let skip = rest
        .char_indices()
        .nth(SEQUENCE_WIDTH)
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    Some(&rest[skip..])
}

/// Split a status payload into its `{...}` blocks.
///
/// `"{1,2}{0,1}"` yields `[["1", "2"], ["0", "1"]]`. Text outside braces is
/// ignored; an unterminated block is dropped.
pub fn status_blocks(payload: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut rest = payload;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let body = &after[..close];
        blocks.push(if body.is_empty() {
            Vec::new()
        } else {
            body.split(',').collect()
        });
        rest = &after[close + 1..];
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x0000, EventTag::Rfid, "04A1B2C3", ":0000@R{04A1B2C3}")]
    #[case(0x00AF, EventTag::Function, "F1", ":00AF@F{F1}")]
    #[case(0x1234, EventTag::Number, "7", ":1234@N{7}")]
    #[case(0xFFFF, EventTag::Display, "650101", ":FFFF@D{650101}")]
    fn test_tagged_format(
        #[case] seq: u16,
        #[case] tag: EventTag,
        #[case] payload: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(format_tagged(seq, tag, payload), expected);
    }

    #[test]
    fn test_raw_format_splices_sequence() {
        assert_eq!(format_raw(0x2A, "{1,2}{1,0}{0,1}"), ":002A{1,2}{1,0}{0,1}");
    }

    #[rstest]
    #[case(":0001{1}", Some("{1}"))]
    #[case(":0001", Some(""))]
    #[case(":01", Some(""))]
    #[case("HARD 1", None)]
    #[case("", None)]
    fn test_strip_header(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(strip_broadcast_header(line), expected);
    }

    #[test]
    fn test_status_blocks() {
        assert_eq!(
            status_blocks("{1,2}{1,0}{0,1}"),
            vec![vec!["1", "2"], vec!["1", "0"], vec!["0", "1"]]
        );
        assert_eq!(status_blocks("{}{5}"), vec![vec![], vec!["5"]]);
        assert_eq!(status_blocks("{1,0"), Vec::<Vec<&str>>::new());
    }
}
