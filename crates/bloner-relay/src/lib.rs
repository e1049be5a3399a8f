//! bloner relay library entry.
//!
//! Wires the transports, connection endpoints, lobby registry, and match
//! sessions into the relay. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod lobby;
pub mod obs;
pub mod ops;
pub mod router;
pub mod session;
pub mod signal;
pub mod transport;
