//! bloner core: wire-level envelope contracts, codec, and the shared error surface.
//!
//! This crate defines the line-delimited JSON protocol spoken between card-game
//! clients and the relay, plus the error type every relay layer reports through.
//! It carries no runtime or transport dependencies so clients, bots, and test
//! harnesses can reuse it as-is.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Every malformed line
//! surfaces as a `RelayError` so one bad client never takes a relay task down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, RelayError, Result};
