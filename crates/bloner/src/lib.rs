//! Top-level facade crate for the bloner relay.
//!
//! Re-exports the wire contracts and the relay library so users can depend on a single crate.

pub mod core {
    pub use bloner_core::*;
}

pub mod relay {
    pub use bloner_relay::*;
}
