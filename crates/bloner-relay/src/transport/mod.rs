//! Transport layer: stream framing, connection endpoints, listeners.
//!
//! - `lines`: newline framing over any byte stream
//! - `endpoint`: per-connection read/write loops and liveness
//! - `tcp`: raw TCP accept loop
//! - `ws`: WebSocket upgrade (`GET /ws`), one envelope per text frame

pub mod endpoint;
pub mod lines;
pub mod tcp;
pub mod ws;

pub use endpoint::{ConnEvent, Endpoint, EndpointOptions};
