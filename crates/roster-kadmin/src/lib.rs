//! # roster-kadmin
//!
//! Credential principal management through the `kadmin` administration console.
//!
//! There is no library binding for the admin protocol, so the client drives the console the way
//! an operator would: it spawns `kadmin` on a pseudo-terminal, writes one command at a time and
//! reads until the prompt comes back.
//!
//! - [`config`] - console executable, credentials and read timeout schedule
//! - [`transport`] - pty-backed byte transport and the [`ConsoleTransport`] seam
//! - [`session`] - prompt framing, bounded reads and error line classification
//! - [`client`] - principal operations ([`KadminClient`])

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod session;
pub mod transport;

pub use client::KadminClient;
pub use config::{KadminConfig, ReadBackoff, DEFAULT_EXECUTABLE, DEFAULT_PROMPT};
pub use session::{classify_error_line, ConsoleSession};
pub use transport::{ConsoleTransport, PtyTransport, ReadOutcome};
