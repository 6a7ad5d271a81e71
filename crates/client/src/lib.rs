//! Async client for the F-Secure `fsavd` unix socket protocol.
//!
//! A [`Client`] dials the daemon socket, checks the `DBVERSION` greeting,
//! negotiates protocol version 9, sends the scan options, and then issues
//! `SCAN` commands whose result lines are parsed into a [`ScanResult`].

pub mod channel;
mod codec;
pub mod client;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{Client, ClientBuilder, DEFAULT_CMD_TIMEOUT};
pub use fsav_core::{ClientError, Config, ScanResult};
pub use transport::{Dialer, DEFAULT_SOCKET};
