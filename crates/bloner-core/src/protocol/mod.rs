//! Wire protocol: one JSON envelope `{type, data}` per newline-terminated line.
//!
//! - `types`: identifiers and the payload schemas of the message catalogue.
//! - `envelope`: the tagged envelope sum type and its line codec.
//!
//! Decoding is panic-free and strict at the boundary: a line either becomes a
//! fully typed `Envelope` or a `RelayError`, never a half-parsed value that
//! handlers have to re-check.

pub mod envelope;
pub mod types;

pub use envelope::{decode, encode, kinds, Envelope};
pub use types::{
    Card, ErrorBody, GameState, LobbyAssign, LobbyId, MatchId, PlayerId, PlayerLeft, TeamState,
    TurnInfo, TurnType,
};
