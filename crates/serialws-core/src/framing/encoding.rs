//! Text decoding for serial line content.
//!
//! Serial devices are not careful about what they emit: a glitch on the line,
//! a baud-rate mismatch or a firmware printing raw sensor bytes can all put
//! invalid sequences into an otherwise textual stream.  Decoding here never
//! fails.  Every byte that cannot be represented is replaced by
//! [`REPLACEMENT_CHAR`] and counted, so the line still reaches its consumers
//! and the caller can report how many substitutions happened.
//!
//! # Control characters
//!
//! A websocket text frame may legally carry NUL or ESC, but browser consumers
//! rarely expect them.  With `replace_control` enabled, C0 control characters
//! (other than TAB) and DEL are substituted the same way as invalid bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder substituted for undecodable bytes and filtered control characters.
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Character encoding used to turn a line's raw bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8; invalid or truncated sequences become one placeholder each.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
    /// 7-bit ASCII; bytes above 0x7F become placeholders.
    #[serde(rename = "ascii")]
    Ascii,
}

/// The outcome of decoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The decoded text, placeholders included.
    pub text: String,
    /// How many placeholders were substituted.
    pub substitutions: usize,
}

impl TextEncoding {
    /// Decodes `bytes`, substituting [`REPLACEMENT_CHAR`] for anything that
    /// cannot be represented.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serialws_core::{TextEncoding, REPLACEMENT_CHAR};
    ///
    /// let decoded = TextEncoding::Utf8.decode(b"temp=\xFF21", true);
    /// assert_eq!(decoded.text, format!("temp={REPLACEMENT_CHAR}21"));
    /// assert_eq!(decoded.substitutions, 1);
    /// ```
    pub fn decode(self, bytes: &[u8], replace_control: bool) -> Decoded {
        let mut out = Decoded {
            text: String::with_capacity(bytes.len()),
            substitutions: 0,
        };

        match self {
            TextEncoding::Utf8 => decode_utf8(bytes, replace_control, &mut out),
            TextEncoding::Latin1 => {
                for &b in bytes {
                    push_char(char::from(b), replace_control, &mut out);
                }
            }
            TextEncoding::Ascii => {
                for &b in bytes {
                    if b.is_ascii() {
                        push_char(char::from(b), replace_control, &mut out);
                    } else {
                        push_placeholder(&mut out);
                    }
                }
            }
        }

        out
    }

    /// The canonical configuration name (`"utf-8"`, `"latin-1"`, `"ascii"`).
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Ascii => "ascii",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            other => Err(format!(
                "unsupported text encoding '{other}' (expected utf-8, latin-1 or ascii)"
            )),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn decode_utf8(bytes: &[u8], replace_control: bool, out: &mut Decoded) {
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                push_str(valid, replace_control, out);
                return;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    push_str(valid, replace_control, out);
                }
                push_placeholder(out);

                // `error_len() == None` means the input ends in the middle of a
                // multi-byte sequence; the whole tail is one bad sequence.
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
                if rest.is_empty() {
                    return;
                }
            }
        }
    }
}

fn push_str(s: &str, replace_control: bool, out: &mut Decoded) {
    if !replace_control {
        out.text.push_str(s);
        return;
    }
    for c in s.chars() {
        push_char(c, true, out);
    }
}

fn push_char(c: char, replace_control: bool, out: &mut Decoded) {
    if replace_control && is_substituted_control(c) {
        push_placeholder(out);
    } else {
        out.text.push(c);
    }
}

fn push_placeholder(out: &mut Decoded) {
    out.text.push(REPLACEMENT_CHAR);
    out.substitutions += 1;
}

fn is_substituted_control(c: char) -> bool {
    c != '\t' && (c < ' ' || c == '\u{7F}')
}

// ── Tests ─────────────────────────────────────────────────────────────────────
