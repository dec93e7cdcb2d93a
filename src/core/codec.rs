//! Decoding of textual root locations.
//!
//! Locations handed to the toolkit may come from URL-style sources (`file:` resources,
//! class-path lookups) and carry percent-encoded bytes such as `%20`. They are decoded
//! exactly once, when a root is bound. Entry names found later during enumeration are
//! used verbatim.

use crate::DirectoryError;
use crate::core::Result;

/// Text encoding of the bytes produced by percent-decoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl Charset {
    fn decode(self, bytes: Vec<u8>) -> Result<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes)
                .map_err(|e| DirectoryError::InvalidPath(format!("not valid UTF-8: {e}"))),
            Charset::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Percent-decodes `raw` and interprets the resulting bytes with `charset`.
///
/// `+` is kept as is, unlike in form encoding (`a+b` stays `a+b`, `%2B` becomes `+`):
/// it is a legal file-name character, and locations are paths rather than form fields.
pub fn decode_location(raw: &str, charset: Charset) -> Result<String> {
    if !raw.contains('%') {
        return Ok(raw.to_string());
    }

    let input = raw.as_bytes();
    let mut bytes = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' {
            let hi = input.get(i + 1).copied().and_then(hex_value);
            let lo = input.get(i + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    bytes.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    return Err(DirectoryError::InvalidPath(format!(
                        "malformed escape at byte {i} in '{raw}'"
                    )));
                }
            }
        } else {
            bytes.push(input[i]);
            i += 1;
        }
    }

    charset.decode(bytes)
}

/// Replaces encoded spaces (`%20`) and nothing else.
pub fn decode_spaces(raw: &str) -> String {
    raw.replace("%20", " ")
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
