//! Identifiers and payload schemas of the message catalogue.
//!
//! Field names follow the client's camelCase JSON. State payloads keep any
//! field the relay does not model in `extra`, so a snapshot is re-encoded with
//! the same content it arrived with.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Player identity, unique for the lifetime of a relay process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

/// Lobby identity. `0` on the wire means "open a fresh lobby".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(pub u64);

impl LobbyId {
    /// Wildcard lobby request.
    pub const FRESH: LobbyId = LobbyId(0);

    pub fn is_fresh(self) -> bool {
        self == Self::FRESH
    }
}

/// Match identity (relay-internal; never sent on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A playing card. `255` in either field marks an absent card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub suit: u8,
    pub number: u8,
}

impl Card {
    /// Sentinel value for "no card".
    pub const INVALID_FIELD: u8 = 255;
    pub const NONE: Card = Card {
        suit: Self::INVALID_FIELD,
        number: Self::INVALID_FIELD,
    };
}

/// Kind of turn a player submitted. Encoded as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TurnType {
    TrumpPass = 0,
    TrumpPick = 1,
    TrumpDiscard = 2,
    CardPlay = 3,
}

impl TryFrom<u8> for TurnType {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(TurnType::TrumpPass),
            1 => Ok(TurnType::TrumpPick),
            2 => Ok(TurnType::TrumpDiscard),
            3 => Ok(TurnType::CardPlay),
            other => Err(format!("invalid turnType: {other}")),
        }
    }
}

impl From<TurnType> for u8 {
    fn from(t: TurnType) -> u8 {
        t as u8
    }
}

/// Per-team state. Owned by the rules engine; the relay forwards it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamState(pub Value);

/// Full authoritative snapshot (`state_res`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub player_id: PlayerId,
    pub active_player: i64,
    pub trump_draw_id: i64,
    pub trump_suit: u8,
    pub draw_pile: Vec<Card>,
    pub play_pile: Vec<Card>,
    pub team_state: [TeamState; 2],
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One submitted turn (`turn_info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInfo {
    pub player_id: PlayerId,
    pub turn_type: TurnType,
    pub trump_pick: bool,
    pub trump_discard: Card,
    pub card_play: Card,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `lobby_assign` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyAssign {
    pub lobby_id: LobbyId,
    pub player_id: PlayerId,
}

/// `player_left` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    pub player_id: PlayerId,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}
