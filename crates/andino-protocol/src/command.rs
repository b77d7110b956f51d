//! Client command lines.
//!
//! A command line is a verb followed by space-separated arguments. The verb is
//! matched case-insensitively against a fixed table; relay verbs carry their
//! 1-based relay number in the token itself (`REL3`, `RPU3`).
//!
//! ```
//! use andino_protocol::{Line, Verb, parse_line};
//!
//! let Line::Command(cmd) = parse_line("rel2 1") else { panic!() };
//! assert_eq!(cmd.verb, Verb::Relay(2));
//! assert!(cmd.flag(0).unwrap());
//!
//! assert_eq!(parse_line("   "), Line::Empty);
//! assert_eq!(parse_line("FOO 1"), Line::Unknown("FOO".into()));
//! ```

use std::fmt;
use std::str::FromStr;

use andino_core::constants::MAX_RELAYS;

use crate::ArgError;

/// Every verb the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Reset,
    Ping,
    Info,
    Hard,
    Poll,
    Skip,
    Edge,
    Send,
    Chng,
    Chnp,
    Cntr,
    Debo,
    Powr,
    /// `REL?`: include relay states in status broadcasts.
    RelayStatus,
    /// `REL1`..`REL8`
    Relay(u8),
    /// `RPU1`..`RPU8`
    RelayPulse(u8),
    Tbus,
    Addrt,
    Sendt,
    Temp,
    Buzz,
    Disp,
    Oled,
    Sys,
}

const FIXED_VERBS: &[(&str, Verb)] = &[
    ("RESET", Verb::Reset),
    ("PING", Verb::Ping),
    ("INFO", Verb::Info),
    ("HARD", Verb::Hard),
    ("POLL", Verb::Poll),
    ("SKIP", Verb::Skip),
    ("EDGE", Verb::Edge),
    ("SEND", Verb::Send),
    ("CHNG", Verb::Chng),
    ("CHNP", Verb::Chnp),
    ("CNTR", Verb::Cntr),
    ("DEBO", Verb::Debo),
    ("POWR", Verb::Powr),
    ("REL?", Verb::RelayStatus),
    ("TBUS", Verb::Tbus),
    ("ADDRT", Verb::Addrt),
    ("SENDT", Verb::Sendt),
    ("TEMP", Verb::Temp),
    ("BUZZ", Verb::Buzz),
    ("DISP", Verb::Disp),
    ("OLED", Verb::Oled),
    ("SYS", Verb::Sys),
];

impl Verb {
    /// Look up a verb token. Matching ignores ASCII case.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_uppercase();
        if let Some((_, verb)) = FIXED_VERBS.iter().find(|(name, _)| *name == token) {
            return Some(*verb);
        }
        if let Some(n) = token.strip_prefix("REL").and_then(relay_number) {
            return Some(Self::Relay(n));
        }
        if let Some(n) = token.strip_prefix("RPU").and_then(relay_number) {
            return Some(Self::RelayPulse(n));
        }
        None
    }

    /// Relay number of `RELn`/`RPUn`, 1-based.
    pub fn relay(&self) -> Option<u8> {
        match self {
            Self::Relay(n) | Self::RelayPulse(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the verb belongs to the temperature family.
    pub fn is_temperature(&self) -> bool {
        matches!(self, Self::Tbus | Self::Addrt | Self::Sendt | Self::Temp)
    }
}

fn relay_number(digits: &str) -> Option<u8> {
    if digits.len() != 1 {
        return None;
    }
    let n: u8 = digits.parse().ok()?;
    (1..=MAX_RELAYS).contains(&n).then_some(n)
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay(n) => write!(f, "REL{n}"),
            Self::RelayPulse(n) => write!(f, "RPU{n}"),
            other => {
                let name = FIXED_VERBS
                    .iter()
                    .find(|(_, verb)| verb == other)
                    .map(|(name, _)| *name)
                    .unwrap_or("?");
                f.write_str(name)
            }
        }
    }
}

/// A parsed command: verb plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(verb: Verb, args: Vec<String>) -> Self {
        Self { verb, args }
    }

    pub fn arg(&self, index: usize) -> Result<&str, ArgError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(ArgError::Missing { index })
    }

    /// Parse argument `index` as `T`.
    pub fn parse_arg<T: FromStr>(&self, index: usize) -> Result<T, ArgError> {
        let raw = self.arg(index)?;
        raw.parse()
            .map_err(|_| ArgError::invalid(index, raw, std::any::type_name::<T>()))
    }

    /// Switch argument: exactly `0` or `1`.
    pub fn flag(&self, index: usize) -> Result<bool, ArgError> {
        match self.arg(index)? {
            "0" => Ok(false),
            "1" => Ok(true),
            raw => Err(ArgError::invalid(index, raw, "0 or 1")),
        }
    }

    /// Arguments from `from` onwards, joined by single spaces.
    pub fn rest(&self, from: usize) -> String {
        self.args.get(from..).map(|s| s.join(" ")).unwrap_or_default()
    }

    /// All arguments joined by single spaces.
    pub fn args_line(&self) -> String {
        self.rest(0)
    }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Nothing but whitespace.
    Empty,
    /// First token is not a known verb. Holds the uppercased token.
    Unknown(String),
    Command(Command),
}

/// Split a line on whitespace and resolve its verb.
pub fn parse_line(line: &str) -> Line {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Line::Empty;
    };
    match Verb::parse(first) {
        Some(verb) => Line::Command(Command::new(verb, tokens.map(str::to_string).collect())),
        None => Line::Unknown(first.to_ascii_uppercase()),
    }
}

/// Parse a `0`/`1` string such as the `CHNP` argument.
pub fn parse_bit_pattern(text: &str) -> Result<Vec<bool>, ArgError> {
    if text.is_empty() {
        return Err(ArgError::invalid(0, text, "bit pattern"));
    }
    text.chars()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            _ => Err(ArgError::invalid(0, text, "bit pattern")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("RESET", Verb::Reset)]
    #[case("ping", Verb::Ping)]
    #[case("Info", Verb::Info)]
    #[case("REL?", Verb::RelayStatus)]
    #[case("rel?", Verb::RelayStatus)]
    #[case("REL1", Verb::Relay(1))]
    #[case("REL8", Verb::Relay(8))]
    #[case("RPU4", Verb::RelayPulse(4))]
    #[case("ADDRT", Verb::Addrt)]
    #[case("SENDT", Verb::Sendt)]
    #[case("SYS", Verb::Sys)]
    fn test_verb_lookup(#[case] token: &str, #[case] expected: Verb) {
        assert_eq!(Verb::parse(token), Some(expected));
    }

    #[rstest]
    #[case("FOO")]
    #[case("REL0")]
    #[case("REL9")]
    #[case("REL12")]
    #[case("RPU")]
    #[case("RELX")]
    #[case("")]
    fn test_unknown_tokens(#[case] token: &str) {
        assert_eq!(Verb::parse(token), None);
    }

    #[test]
    fn test_every_verb_displays_as_its_token() {
        for (name, verb) in FIXED_VERBS {
            assert_eq!(verb.to_string(), *name);
            assert_eq!(Verb::parse(name), Some(*verb));
        }
        for n in 1..=MAX_RELAYS {
            assert_eq!(Verb::Relay(n).to_string(), format!("REL{n}"));
            assert_eq!(Verb::RelayPulse(n).to_string(), format!("RPU{n}"));
        }
    }

    #[test]
    fn test_parse_line_splits_on_whitespace() {
        let Line::Command(cmd) = parse_line("disp  txt t0   hello world\r") else {
            panic!("expected command");
        };
        assert_eq!(cmd.verb, Verb::Disp);
        assert_eq!(cmd.args, vec!["txt", "t0", "hello", "world"]);
        assert_eq!(cmd.rest(2), "hello world");
        assert_eq!(cmd.rest(9), "");
    }

    #[test]
    fn test_parse_line_classifies_empty_and_unknown() {
        assert_eq!(parse_line(""), Line::Empty);
        assert_eq!(parse_line(" \t "), Line::Empty);
        assert_eq!(parse_line("foo bar"), Line::Unknown("FOO".to_string()));
    }

    #[test]
    fn test_argument_helpers() {
        let cmd = Command::new(Verb::Poll, vec!["250".into(), "abc".into(), "2".into()]);
        assert_eq!(cmd.parse_arg::<u64>(0).unwrap(), 250);
        assert!(matches!(
            cmd.parse_arg::<u64>(1),
            Err(ArgError::Invalid { index: 1, .. })
        ));
        assert_eq!(cmd.arg(3), Err(ArgError::Missing { index: 3 }));
        assert_eq!(cmd.args_line(), "250 abc 2");
    }

    #[rstest]
    #[case("1", Ok(true))]
    #[case("0", Ok(false))]
    #[case("2", Err(()))]
    #[case("-1", Err(()))]
    #[case("01", Err(()))]
    #[case("on", Err(()))]
    fn test_flag_accepts_only_zero_or_one(#[case] raw: &str, #[case] expected: Result<bool, ()>) {
        let cmd = Command::new(Verb::Edge, vec![raw.to_string()]);
        assert_eq!(cmd.flag(0).map_err(|_| ()), expected);
    }

    #[rstest]
    #[case("101", vec![true, false, true])]
    #[case("0", vec![false])]
    fn test_bit_pattern(#[case] text: &str, #[case] expected: Vec<bool>) {
        assert_eq!(parse_bit_pattern(text).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("102")]
    #[case("1 0")]
    fn test_bad_bit_pattern(#[case] text: &str) {
        assert!(parse_bit_pattern(text).is_err());
    }
}
