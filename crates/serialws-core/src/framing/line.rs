//! Newline framing of a raw serial byte stream.
//!
//! A serial `read()` returns whatever bytes happened to arrive before the read
//! timeout: half a line, three lines and a bit, or nothing at all.  The
//! [`LineFramer`] accumulates those bytes and cuts them into lines:
//!
//! - The terminator is `\n`.  A single `\r` directly in front of it is part of
//!   the terminator and is stripped too.
//! - Two consecutive terminators produce an empty line; empty lines are kept.
//! - Bytes are buffered raw and decoded only when a line is cut, so a
//!   multi-byte character split across two reads still decodes correctly.
//! - An optional maximum length bounds the line content.  A line of exactly
//!   the maximum length followed by its terminator is an ordinary line.  Only
//!   when another content byte arrives are the accumulated bytes emitted as a
//!   [`LineKind::Truncated`] line, and that byte starts the next one.  Nothing
//!   is discarded.
//!
//! Because every decision depends only on the byte sequence and never on where
//! one `feed()` call ends, the output is identical however the input is
//! chunked.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::encoding::TextEncoding;

const LINE_FEED: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

// ── Line ──────────────────────────────────────────────────────────────────────

/// One line of decoded serial text, terminator stripped.
///
/// The text is stored in an `Arc<str>`, so cloning a `Line` to hand it to many
/// websocket peers copies a pointer, not the content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(Arc<str>);

impl Line {
    /// Returns the line content.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Line {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Line {
    fn from(s: String) -> Self {
        Line(Arc::from(s))
    }
}

impl From<&str> for Line {
    fn from(s: &str) -> Self {
        Line(Arc::from(s))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── FramedLine ────────────────────────────────────────────────────────────────

/// How a line came to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Ended by a `\n` terminator.
    Complete,
    /// Force-emitted because the content exceeded the maximum line length.
    Truncated,
    /// Emitted by [`LineFramer::flush`] without a terminator (shutdown).
    Flushed,
}

/// A line cut by the framer together with the bookkeeping the reader reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    /// The decoded line.
    pub line: Line,
    /// Why the line was emitted.
    pub kind: LineKind,
    /// Raw bytes consumed for this line, stripped terminator bytes included.
    pub raw_len: usize,
    /// Number of placeholder characters substituted while decoding.
    pub substitutions: usize,
}

// ── LineFramer ────────────────────────────────────────────────────────────────

/// Incremental newline framer.
///
/// # Examples
///
/// ```rust
/// use serialws_core::{LineFramer, TextEncoding};
///
/// let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
/// let lines: Vec<String> = framer
///     .feed(b"A\r\nB\n\nC")
///     .into_iter()
///     .map(|f| f.line.to_string())
///     .collect();
///
/// assert_eq!(lines, vec!["A", "B", ""]);
/// // "C" waits for a terminator, or for flush() at shutdown.
/// let flushed = framer.flush();
/// assert_eq!(flushed[0].line.as_str(), "C");
/// ```
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    encoding: TextEncoding,
    max_line_length: Option<usize>,
    replace_control: bool,
}

impl LineFramer {
    /// Creates a framer.
    ///
    /// `max_line_length` is measured in raw bytes; `None` or `Some(0)` means
    /// unbounded.
    pub fn new(encoding: TextEncoding, max_line_length: Option<usize>, replace_control: bool) -> Self {
        Self {
            buffer: Vec::new(),
            encoding,
            max_line_length: max_line_length.filter(|&max| max > 0),
            replace_control,
        }
    }

    /// Feeds newly read bytes and returns every line they complete, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<FramedLine> {
        let mut lines = Vec::new();

        for &byte in data {
            if byte == LINE_FEED {
                let mut terminator_len = 1;
                if self.buffer.last() == Some(&CARRIAGE_RETURN) {
                    self.buffer.pop();
                    terminator_len += 1;
                }
                lines.push(self.cut(LineKind::Complete, terminator_len));
                continue;
            }

            // Everything buffered is content now that the byte is not `\n`.
            self.cut_over_limit(&mut lines);
            if let Some(max) = self.max_line_length {
                // A `\r` may sit one past the cap until the next byte shows
                // whether it belongs to the terminator.
                if byte != CARRIAGE_RETURN && self.buffer.len() >= max {
                    lines.push(self.cut(LineKind::Truncated, 0));
                }
            }
            self.buffer.push(byte);
        }

        lines
    }

    /// Emits the partial line still in the buffer.
    ///
    /// Called once at shutdown so content that never saw a terminator is not
    /// silently lost.  Usually yields one line, or none when the buffer is
    /// empty.  A pending `\r` just past the cap is cut off into its own line.
    pub fn flush(&mut self) -> Vec<FramedLine> {
        let mut lines = Vec::new();
        self.cut_over_limit(&mut lines);
        if !self.buffer.is_empty() {
            lines.push(self.cut(LineKind::Flushed, 0));
        }
        lines
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// The configured cap, if any.
    pub fn max_line_length(&self) -> Option<usize> {
        self.max_line_length
    }

    /// Discards any partial line.  Called when the device is reopened.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Emits the first `max` bytes when a pending `\r` turned out to be content
    /// of an already full line.
    fn cut_over_limit(&mut self, lines: &mut Vec<FramedLine>) {
        if let Some(max) = self.max_line_length {
            if self.buffer.len() > max {
                let rest = self.buffer.split_off(max);
                lines.push(self.cut(LineKind::Truncated, 0));
                self.buffer = rest;
            }
        }
    }

    fn cut(&mut self, kind: LineKind, terminator_len: usize) -> FramedLine {
        let decoded = self.encoding.decode(&self.buffer, self.replace_control);
        let raw_len = self.buffer.len() + terminator_len;
        self.buffer.clear();

        FramedLine {
            line: Line::from(decoded.text),
            kind,
            raw_len,
            substitutions: decoded.substitutions,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[FramedLine]) -> Vec<&str> {
        lines.iter().map(|l| l.line.as_str()).collect()
    }

    #[test]
    fn test_single_complete_line() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        let lines = framer.feed(b"hello\n");
        assert_eq!(texts(&lines), vec!["hello"]);
        assert_eq!(lines[0].kind, LineKind::Complete);
        assert_eq!(lines[0].raw_len, 6);
    }

    #[test]
    fn test_crlf_is_stripped_entirely() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        let lines = framer.feed(b"21.5\r\n");
        assert_eq!(texts(&lines), vec!["21.5"]);
        assert_eq!(lines[0].raw_len, 6, "both terminator bytes count as consumed");
    }

    #[test]
    fn test_crlf_split_across_feeds_is_still_stripped() {
        // Arrange: the \r arrives at the end of one read, the \n at the start of the next
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);

        // Act
        let first = framer.feed(b"21.5\r");
        let second = framer.feed(b"\n");

        // Assert
        assert!(first.is_empty());
        assert_eq!(texts(&second), vec!["21.5"]);
    }

    #[test]
    fn test_only_one_carriage_return_is_stripped() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, false);
        let lines = framer.feed(b"x\r\r\n");
        assert_eq!(texts(&lines), vec!["x\r"]);
    }

    #[test]
    fn test_empty_lines_are_emitted() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        let lines = framer.feed(b"\n\n");
        assert_eq!(texts(&lines), vec!["", ""]);
    }

    #[test]
    fn test_trailing_partial_line_is_withheld_until_flush() {
        // Arrange
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);

        // Act
        let lines = framer.feed(b"A\nB\n\nC");

        // Assert
        assert_eq!(texts(&lines), vec!["A", "B", ""]);
        assert_eq!(framer.pending_len(), 1);

        let flushed = framer.flush();
        assert_eq!(texts(&flushed), vec!["C"]);
        assert_eq!(flushed[0].kind, LineKind::Flushed);
        assert!(framer.flush().is_empty(), "second flush has nothing left");
    }

    #[test]
    fn test_multibyte_character_split_across_feeds_decodes() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        assert!(framer.feed(b"21\xC2").is_empty());
        let lines = framer.feed(b"\xB0C\n");
        assert_eq!(texts(&lines), vec!["21°C"]);
        assert_eq!(lines[0].substitutions, 0);
    }

    #[test]
    fn test_max_length_forces_emission_at_cap() {
        // Arrange
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(4), true);

        // Act
        let lines = framer.feed(b"abcdefghij\n");

        // Assert
        assert_eq!(texts(&lines), vec!["abcd", "efgh", "ij"]);
        assert_eq!(lines[0].kind, LineKind::Truncated);
        assert_eq!(lines[1].kind, LineKind::Truncated);
        assert_eq!(lines[2].kind, LineKind::Complete);
        let consumed: usize = lines.iter().map(|l| l.raw_len).sum();
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_line_exactly_at_cap_is_a_complete_line() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(3), true);
        let lines = framer.feed(b"abc\n");
        assert_eq!(texts(&lines), vec!["abc"]);
        assert_eq!(lines[0].kind, LineKind::Complete);
        assert_eq!(lines[0].raw_len, 4);
    }

    #[test]
    fn test_crlf_line_exactly_at_cap_is_a_complete_line() {
        // Arrange: the \r arrives while the line is already full
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(4), true);

        // Act
        let mut lines = framer.feed(b"abcd\r");
        lines.extend(framer.feed(b"\nxy\n"));

        // Assert
        assert_eq!(texts(&lines), vec!["abcd", "xy"]);
        assert!(lines.iter().all(|l| l.kind == LineKind::Complete));
    }

    #[test]
    fn test_multiple_of_cap_yields_no_empty_line() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(4), true);
        let lines = framer.feed(b"abcdefgh\n");
        assert_eq!(texts(&lines), vec!["abcd", "efgh"]);
        assert_eq!(lines[0].kind, LineKind::Truncated);
        assert_eq!(lines[1].kind, LineKind::Complete);
    }

    #[test]
    fn test_carriage_return_past_full_line_is_content() {
        // Arrange: cap 3, "abc" then a \r that turns out not to end the line
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(3), false);

        // Act
        let lines = framer.feed(b"abc\rd\n");

        // Assert
        assert_eq!(texts(&lines), vec!["abc", "\rd"]);
        assert_eq!(lines[0].kind, LineKind::Truncated);
        let consumed: usize = lines.iter().map(|l| l.raw_len).sum();
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_flush_splits_pending_carriage_return_past_full_line() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, Some(3), false);
        assert!(framer.feed(b"abc\r").is_empty());
        let flushed = framer.flush();
        assert_eq!(texts(&flushed), vec!["abc", "\r"]);
        assert_eq!(flushed[0].kind, LineKind::Truncated);
        assert_eq!(flushed[1].kind, LineKind::Flushed);
    }

    #[test]
    fn test_zero_max_length_means_unbounded() {
        let framer = LineFramer::new(TextEncoding::Utf8, Some(0), true);
        assert_eq!(framer.max_line_length(), None);
    }

    #[test]
    fn test_invalid_bytes_and_nul_become_placeholders() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        let lines = framer.feed(b"t=\x00\xFF\n");
        assert_eq!(texts(&lines), vec!["t=\u{FFFD}\u{FFFD}"]);
        assert_eq!(lines[0].substitutions, 2);
    }

    #[test]
    fn test_reset_discards_partial_line() {
        let mut framer = LineFramer::new(TextEncoding::Utf8, None, true);
        framer.feed(b"stale");
        framer.reset();
        let lines = framer.feed(b"fresh\n");
        assert_eq!(texts(&lines), vec!["fresh"]);
    }

    #[test]
    fn test_line_clone_shares_content() {
        let line = Line::from("shared");
        let clone = line.clone();
        assert_eq!(line, clone);
        assert_eq!(&*clone, "shared");
        assert_eq!(clone.to_string(), "shared");
    }
}
