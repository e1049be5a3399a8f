//! Dispatch loops.
//!
//! - `fanin`: round-robin merged wait over per-player queues (used by matches)
//! - `prematch`: single-source loop for a connection not yet in a lobby

pub mod fanin;
pub mod prematch;

pub use fanin::Fanin;
pub use prematch::serve_connection;
