//! Text encodings applied symmetrically to outgoing and incoming bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Character set used by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// UTF-8; malformed input decodes to U+FFFD.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[serde(rename = "iso-8859-1", alias = "latin1", alias = "ISO-8859-1")]
    Latin1,
    /// 7-bit US-ASCII.
    #[serde(rename = "us-ascii", alias = "ascii", alias = "US-ASCII")]
    Ascii,
}

/// Returned when an encoding label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported encoding: {0}")]
pub struct UnknownEncoding(pub String);

impl Encoding {
    /// Canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
            Self::Ascii => "us-ascii",
        }
    }

    /// Encode `text` into bytes. Unmappable characters become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    /// Decode `bytes` into text. Malformed input is replaced, never rejected.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_utf8() {
        assert_eq!(Encoding::default(), Encoding::Utf8);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("latin1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("ISO_8859_1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!(" ascii ".parse::<Encoding>().unwrap(), Encoding::Ascii);
        assert_eq!(
            "koi8-r".parse::<Encoding>(),
            Err(UnknownEncoding("koi8-r".to_string()))
        );
    }

    #[test]
    fn test_latin1_is_byte_transparent() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = Encoding::Latin1.decode(&bytes);
        assert_eq!(Encoding::Latin1.encode(&text), bytes);
    }

    #[test]
    fn test_unmappable_characters() {
        assert_eq!(Encoding::Latin1.encode("€1"), b"?1".to_vec());
        assert_eq!(Encoding::Ascii.encode("é!"), b"?!".to_vec());
        assert_eq!(Encoding::Ascii.decode(&[0x41, 0xC3]), "A\u{FFFD}");
    }

    #[test]
    fn test_utf8_lossy_decode() {
        assert_eq!(Encoding::Utf8.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Encoding::Utf8.decode(&[0x66, 0xFF]), "f\u{FFFD}");
    }

    #[test]
    fn test_serde_labels() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            encoding: Encoding,
        }

        let parsed: Wrapper = toml::from_str(r#"encoding = "latin1""#).unwrap();
        assert_eq!(parsed.encoding, Encoding::Latin1);

        let written = toml::to_string(&Wrapper {
            encoding: Encoding::Ascii,
        })
        .unwrap();
        assert_eq!(written.trim(), r#"encoding = "us-ascii""#);
    }
}
