// WireGuard peer activity logging library
// Shared modules for daemon and tests

#![warn(missing_docs)]

//! WireGuard peer activity logging library
//!
//! WireGuard is UDP based and keeps no connection state, so peers are judged
//! by their latest handshake: a peer whose handshake is older than a timeout
//! is inactive, otherwise it is active. This library polls the peer table and
//! reports each change of state exactly once.
//!
//! # Main Components
//!
//! - [`config`]: Layered configuration (defaults, INI file, environment, CLI)
//! - [`logging`]: Log format and destination (text or JSON; stream, file or syslog)
//! - [`monitor`]: Polling loop and event sinks
//! - [`names`]: wg-gen-web client name lookup
//! - [`snapshot`]: `wg show all dump` parsing
//! - [`state`]: Active/inactive state machine
//! - [`types`]: Shared data structures
//! - [`wg_status`]: Peer table fetching (wg tool or netlink)

pub mod config;
pub mod logging;
pub mod monitor;
pub mod names;
pub mod snapshot;
pub mod state;
pub mod types;
pub mod wg_status;
