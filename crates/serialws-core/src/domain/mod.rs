//! Relay policies with no I/O attached.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The domain layer holds the rules that make the relay behave the way it
//! does, independent of how bytes physically move.  "Drop the oldest queued
//! line when a slow peer falls behind" or "wait twice as long after every
//! failed reconnect, up to a cap" are decisions that do not care whether the
//! transport is a websocket or a test double.  Keeping them here means they
//! are tested without sockets, timers or a runtime.

/// Exponential reconnect pacing.
pub mod backoff;

/// Per-connection lifecycle state machine.
pub mod connection;

/// Bounded FIFO that never grows past its capacity.
pub mod queue;
