//! Match sessions and the player handle that flows into them.

pub mod match_session;
pub mod player;

pub use match_session::{MatchOutcome, MatchSession};
pub use player::{Handoff, Player, Waiting};
