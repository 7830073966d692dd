//! Multi-client chat over a plaintext, line-oriented TCP protocol.
//!
//! See `README.md` for usage and the wire protocol. Each module owns one
//! concern:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] accepts TCP connections and spawns one session per client.
//! - [`session`] drives a participant from the username handshake to
//!   disconnect cleanup.
//! - [`registry`] tracks who is online behind a single critical section.
//! - [`router`] classifies inbound lines and delivers broadcasts, private
//!   messages, and one-line file transfers.
//! - [`client`] is a small terminal client for the same protocol.
//! - [`protocol`] holds the line framing helpers and the exact wire strings.
//!
//! Integration tests exercise the server over real sockets; the e2e test
//! drives the compiled binary end to end.

pub mod cli;
pub mod client;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
