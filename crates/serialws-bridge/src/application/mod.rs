//! Application layer for serialws-bridge.
//!
//! Knows *what* happens to a line between the serial port and the websocket
//! consumers, independent of the concrete device and network types.
//!
//! # Responsibilities
//!
//! - Turning a byte source into a stream of lines ([`line_reader`])
//! - Handing lines from the reader thread to the async side ([`handoff`])
//! - Fanning lines out to consumers ([`relay`], [`peers`], [`client_link`])
//! - Per-consumer bounded buffering ([`outbox`])
//!
//! # What does NOT belong here?
//!
//! - Opening serial ports or sockets (that is infrastructure)
//! - Websocket framing (handled by tokio-tungstenite)

pub mod client_link;
pub mod handoff;
pub mod line_reader;
pub mod outbox;
pub mod peers;
pub mod relay;

pub use client_link::ClientLink;
pub use line_reader::{ByteSource, LineReader, SourceOpener};
pub use peers::PeerSet;
pub use relay::{pump, LineSink};
