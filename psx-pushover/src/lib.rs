//! Bridge between a PSX Main Server and Pushover.
//!
//! The PSX Main Server streams `key=value` lines over TCP. This crate keeps a
//! connection to it open, tracks a few keys, and forwards the simulator's
//! virtual printout to Pushover.
//!
//! - [`supervisor`] owns the TCP session and reconnects with fixed delays.
//! - [`protocol`] splits lines and filters them to the tracked keys.
//! - [`store`] keeps the latest values and runs per-key handlers.
//! - [`handlers`] holds the callbacks wired to the PSX keys.
//! - [`notifier`] delivers notifications from a background task.
//! - [`pushover`] is the HTTPS client for the Pushover messages API.
//! - [`cli`] parses the command line.
//!
//! Integration tests drive the supervisor against loopback listeners and a
//! fake Pushover endpoint.

pub mod cli;
pub mod error;
pub mod handlers;
pub mod notifier;
pub mod protocol;
pub mod pushover;
pub mod store;
pub mod supervisor;
