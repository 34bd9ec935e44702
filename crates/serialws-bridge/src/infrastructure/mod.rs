//! Infrastructure layer for serialws-bridge.
//!
//! Everything that touches the operating system or the network.
//!
//! # Responsibilities
//!
//! - Opening and reading the serial device ([`serial_port`], [`reader_thread`])
//! - Accepting websocket peers ([`ws_server`]) or connecting out
//!   ([`ws_client`]), both driving connections through [`ws_session`]
//! - Loading the TOML config file ([`config_file`])
//! - Starting and stopping the whole pipeline ([`runtime`])
//!
//! [`scripted`] provides an in-memory byte source for tests and demos.

pub mod config_file;
pub mod reader_thread;
pub mod runtime;
pub mod scripted;
pub mod serial_port;
pub mod ws_client;
pub mod ws_server;
pub mod ws_session;

pub use runtime::{start, start_with_opener, RunningHandle};
