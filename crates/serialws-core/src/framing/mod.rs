//! Byte-stream framing: raw serial bytes in, decoded text lines out.

pub mod encoding;
pub mod line;

pub use encoding::{Decoded, TextEncoding, REPLACEMENT_CHAR};
pub use line::{FramedLine, Line, LineFramer, LineKind};
