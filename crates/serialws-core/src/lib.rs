//! # serialws-core
//!
//! Shared, I/O-free building blocks for the serialws relay.
//!
//! Nothing in this crate opens a device or a socket, or spawns a task.  Every
//! type here can be exercised from a plain `#[test]` without a runtime.
//!
//! # Architecture overview (for beginners)
//!
//! The relay turns a serial byte stream into websocket text messages:
//!
//! ```text
//! serial bytes ──► LineFramer ──► Line ──► hand-off ──► peers
//! ```
//!
//! This crate owns the left half of that picture plus the policies the right
//! half needs:
//!
//! - **`framing`** – Reassembles raw bytes into newline-terminated [`Line`]s
//!   and decodes them with a configurable [`TextEncoding`].
//! - **`domain`** – Policies with no I/O attached: the drop-on-overflow
//!   [`BoundedQueue`], the exponential [`Backoff`] used between reconnect
//!   attempts, and the per-connection [`ConnectionState`] machine.
//! - **`metrics`** – Lock-free counters shared by the reader and the relay.

pub mod domain;
pub mod framing;
pub mod metrics;

// Re-export the most-used types at the crate root so callers can write
// `serialws_core::Line` instead of `serialws_core::framing::line::Line`.
pub use domain::backoff::Backoff;
pub use domain::connection::{ConnectionState, StateError};
pub use domain::queue::{BoundedQueue, OverflowPolicy, PushOutcome};
pub use framing::encoding::{Decoded, TextEncoding, REPLACEMENT_CHAR};
pub use framing::line::{FramedLine, Line, LineFramer, LineKind};
pub use metrics::{MetricsSnapshot, RelayMetrics};
