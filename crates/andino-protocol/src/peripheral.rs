//! Sub-command grammar of `DISP` and `OLED`.

use crate::{ArgError, Command};

/// Touch display operations carried by `DISP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCommand {
    /// `DISP PAGE <page>`
    Page(String),
    /// `DISP TXT <object> <text...>`
    Text { object: String, text: String },
    /// `DISP ATTR <object> <attribute> <value>`
    Attr {
        object: String,
        attribute: String,
        value: String,
    },
    /// `DISP RAW <hex...>`; hex digits may be split across arguments.
    Raw(Vec<u8>),
}

impl DisplayCommand {
    pub fn parse(cmd: &Command) -> Result<Self, ArgError> {
        let sub = cmd.arg(0)?.to_ascii_uppercase();
        match sub.as_str() {
            "PAGE" => Ok(Self::Page(cmd.arg(1)?.to_string())),
            "TXT" => Ok(Self::Text {
                object: cmd.arg(1)?.to_string(),
                text: cmd.rest(2),
            }),
            "ATTR" => Ok(Self::Attr {
                object: cmd.arg(1)?.to_string(),
                attribute: cmd.arg(2)?.to_string(),
                value: cmd.arg(3)?.to_string(),
            }),
            "RAW" => {
                let hex: String = cmd.args[1..].concat();
                decode_hex(&hex)
                    .map(Self::Raw)
                    .ok_or_else(|| ArgError::invalid(1, hex, "hex bytes"))
            }
            _ => Err(ArgError::invalid(0, sub, "PAGE, TXT, ATTR or RAW")),
        }
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// OLED panel operations carried by `OLED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OledCommand {
    /// `OLED MODE <mode> [<arg>]`
    Mode { mode: String, arg: Option<String> },
    /// `OLED <{a}{b}><{c}>`: lines of cells.
    Text(Vec<Vec<String>>),
}

impl OledCommand {
    pub fn parse(cmd: &Command) -> Result<Self, ArgError> {
        let first = cmd.arg(0)?;
        if first.eq_ignore_ascii_case("MODE") {
            return Ok(Self::Mode {
                mode: cmd.arg(1)?.to_string(),
                arg: cmd.args.get(2).cloned(),
            });
        }
        let markup = cmd.args_line();
        let lines = parse_oled_markup(&markup);
        if lines.is_empty() {
            return Err(ArgError::invalid(0, markup, "OLED markup"));
        }
        Ok(Self::Text(lines))
    }
}

/// Parse `<{a}{b}><{c}>` into `[["a", "b"], ["c"]]`.
///
/// Text after the last `>` and after the last `}` of a line is ignored.
pub fn parse_oled_markup(text: &str) -> Vec<Vec<String>> {
    let mut segments: Vec<&str> = text.split('>').collect();
    segments.pop();
    segments
        .into_iter()
        .map(|segment| {
            let cleaned = segment.replace(['<', '{'], "");
            let mut cells: Vec<String> = cleaned.split('}').map(str::to_string).collect();
            cells.pop();
            cells
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Line, parse_line};
    use rstest::rstest;

    fn command(line: &str) -> Command {
        match parse_line(line) {
            Line::Command(cmd) => cmd,
            other => panic!("not a command: {other:?}"),
        }
    }

    #[rstest]
    #[case("DISP PAGE 2", DisplayCommand::Page("2".into()))]
    #[case("DISP txt t0 Hello  World", DisplayCommand::Text { object: "t0".into(), text: "Hello World".into() })]
    #[case("DISP TXT t0", DisplayCommand::Text { object: "t0".into(), text: String::new() })]
    #[case("DISP ATTR b0 bco 63488", DisplayCommand::Attr { object: "b0".into(), attribute: "bco".into(), value: "63488".into() })]
    #[case("DISP RAW 70 61 67 65", DisplayCommand::Raw(b"page".to_vec()))]
    #[case("DISP RAW ff00", DisplayCommand::Raw(vec![0xFF, 0x00]))]
    fn test_display_commands(#[case] line: &str, #[case] expected: DisplayCommand) {
        assert_eq!(DisplayCommand::parse(&command(line)).unwrap(), expected);
    }

    #[rstest]
    #[case("DISP")]
    #[case("DISP BLINK 1")]
    #[case("DISP PAGE")]
    #[case("DISP ATTR b0 bco")]
    #[case("DISP RAW")]
    #[case("DISP RAW abc")]
    #[case("DISP RAW zz")]
    fn test_bad_display_commands(#[case] line: &str) {
        assert!(DisplayCommand::parse(&command(line)).is_err());
    }

    #[test]
    fn test_oled_markup() {
        assert_eq!(
            parse_oled_markup("<{a}{b}><{c}>"),
            vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]
        );
        assert_eq!(
            parse_oled_markup("<{Temp 21 C}>"),
            vec![vec!["Temp 21 C".to_string()]]
        );
        assert!(parse_oled_markup("no markup").is_empty());
    }

    #[test]
    fn test_oled_commands() {
        assert_eq!(
            OledCommand::parse(&command("OLED MODE 2 on")).unwrap(),
            OledCommand::Mode {
                mode: "2".into(),
                arg: Some("on".into())
            }
        );
        assert_eq!(
            OledCommand::parse(&command("OLED mode 1")).unwrap(),
            OledCommand::Mode {
                mode: "1".into(),
                arg: None
            }
        );
        assert_eq!(
            OledCommand::parse(&command("OLED <{Hello world}>")).unwrap(),
            OledCommand::Text(vec![vec!["Hello world".into()]])
        );
        assert!(OledCommand::parse(&command("OLED")).is_err());
        assert!(OledCommand::parse(&command("OLED plain")).is_err());
    }
}
