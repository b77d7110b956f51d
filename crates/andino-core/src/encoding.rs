//! Text encodings accepted on the TCP and serial links.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Character encoding applied to every line crossing a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "ascii", alias = "ASCII", alias = "us-ascii")]
    Ascii,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
        }
    }

    /// Decode raw bytes into text.
    ///
    /// Decoding never fails: bytes that are invalid for the encoding are
    /// replaced with U+FFFD so a single garbled byte cannot drop a line.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Encode text, appending to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unencodable`] on the first character outside the
    /// encoding's repertoire. `dst` is left untouched in that case.
    pub fn encode_into(&self, text: &str, dst: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Utf8 => dst.extend_from_slice(text.as_bytes()),
            Self::Ascii => {
                if let Some(c) = text.chars().find(|c| !c.is_ascii()) {
                    return Err(self.unencodable(c));
                }
                dst.extend_from_slice(text.as_bytes());
            }
            Self::Latin1 => {
                if let Some(c) = text.chars().find(|&c| u32::from(c) > 0xFF) {
                    return Err(self.unencodable(c));
                }
                dst.extend(text.chars().map(|c| u32::from(c) as u8));
            }
        }
        Ok(())
    }

    /// Encode text into a fresh buffer.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len());
        self.encode_into(text, &mut out)?;
        Ok(out)
    }

    fn unencodable(&self, character: char) -> Error {
        Error::Unencodable {
            character,
            encoding: self.as_str(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(Error::UnsupportedEncoding(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("utf-8", TextEncoding::Utf8)]
    #[case("UTF8", TextEncoding::Utf8)]
    #[case("ascii", TextEncoding::Ascii)]
    #[case("latin-1", TextEncoding::Latin1)]
    #[case(" ISO-8859-1 ", TextEncoding::Latin1)]
    fn test_parse_encoding_names(#[case] name: &str, #[case] expected: TextEncoding) {
        assert_eq!(name.parse::<TextEncoding>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        assert!(matches!(
            "ebcdic".parse::<TextEncoding>(),
            Err(Error::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_latin1_maps_bytes_to_code_points() {
        let enc = TextEncoding::Latin1;
        assert_eq!(enc.decode(&[0x41, 0xE9]), "Aé");
        assert_eq!(enc.encode("Aé").unwrap(), vec![0x41, 0xE9]);
    }

    #[test]
    fn test_ascii_rejects_non_ascii_on_encode() {
        let err = TextEncoding::Ascii.encode("caf\u{e9}").unwrap_err();
        assert!(matches!(err, Error::Unencodable { character: 'é', .. }));
    }

    #[test]
    fn test_ascii_decode_replaces_high_bytes() {
        assert_eq!(TextEncoding::Ascii.decode(b"A\xFFB"), "A\u{FFFD}B");
    }

    #[test]
    fn test_utf8_decode_is_lossy() {
        assert_eq!(TextEncoding::Utf8.decode(b"ok\xC3"), "ok\u{FFFD}");
    }
}
