//! A centralized text-chat relay over TCP.
//!
//! Clients connect, register a unique username, and exchange
//! broadcast messages while the server keeps every client's view of
//! the online-user list current. See `README.md` for usage and the
//! wire protocol. Each module focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client
//!   modes.
//! - [`wire`] defines the raw-text protocol: reserved tokens, payload
//!   formatting, and async read/write helpers.
//! - [`registry`] tracks online sessions and delivers broadcasts; it
//!   is the single source of truth for "who is online".
//! - [`router`] classifies inbound payloads as commands or chat and
//!   executes them against the registry.
//! - [`server`] accepts TCP connections and runs one worker per
//!   session from handshake to disconnect.
//! - [`client`] connects to a relay and multiplexes stdin with server
//!   payloads for a terminal user.
//!
//! Integration tests use this crate directly to drive a server over
//! loopback TCP.

pub mod cli;
pub mod client;
pub mod registry;
pub mod router;
pub mod server;
pub mod wire;
