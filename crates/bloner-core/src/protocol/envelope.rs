//! Envelope sum type and the newline-delimited line codec.
//!
//! Encoding uses serde's adjacent tagging (`{"type": .., "data": ..}`).
//! Decoding goes through a `RawValue` header first so an unknown tag, a
//! missing payload, and a payload schema mismatch each get their own error.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{ClientCode, RelayError, Result};

use super::types::{ErrorBody, GameState, LobbyAssign, LobbyId, PlayerId, PlayerLeft, TurnInfo};

/// Wire `type` tags.
pub mod kinds {
    pub const LOBBY_REQ: &str = "lobby_req";
    pub const LOBBY_ASSIGN: &str = "lobby_assign";
    pub const GAME_START: &str = "game_start";
    pub const STATE_REQ: &str = "state_req";
    pub const STATE_RES: &str = "state_res";
    pub const TURN_INFO: &str = "turn_info";
    pub const PLAYER_LEFT: &str = "player_left";
    pub const ERROR: &str = "error";
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    /// client -> relay: join lobby by id (`0` = fresh).
    LobbyReq(LobbyId),
    /// relay -> client: lobby placement.
    LobbyAssign(LobbyAssign),
    /// relay -> client: match roster, seat order (seat 0 is authoritative).
    GameStart(Vec<PlayerId>),
    /// relay -> authoritative client: please report the full state.
    StateReq,
    /// full snapshot, both directions.
    StateRes(GameState),
    /// turn update, both directions.
    TurnInfo(TurnInfo),
    /// relay -> client: a match member disconnected.
    PlayerLeft(PlayerLeft),
    /// relay -> client: the previous message was rejected.
    Error(ErrorBody),
}

impl Envelope {
    /// Wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::LobbyReq(_) => kinds::LOBBY_REQ,
            Envelope::LobbyAssign(_) => kinds::LOBBY_ASSIGN,
            Envelope::GameStart(_) => kinds::GAME_START,
            Envelope::StateReq => kinds::STATE_REQ,
            Envelope::StateRes(_) => kinds::STATE_RES,
            Envelope::TurnInfo(_) => kinds::TURN_INFO,
            Envelope::PlayerLeft(_) => kinds::PLAYER_LEFT,
            Envelope::Error(_) => kinds::ERROR,
        }
    }

    pub fn error(code: ClientCode, msg: impl Into<String>) -> Self {
        Envelope::Error(ErrorBody {
            code: code.as_str().to_string(),
            msg: msg.into(),
        })
    }

    /// Client-visible rendering of a relay error.
    pub fn from_error(err: &RelayError) -> Self {
        Self::error(err.client_code(), err.to_string())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// Encode one envelope as a single `\n`-terminated JSON line.
///
/// Only fails if a payload holds something JSON cannot represent, which the
/// catalogue types rule out.
pub fn encode(env: &Envelope) -> Result<Bytes> {
    let mut buf = serde_json::to_vec(env)
        .map_err(|e| RelayError::Internal(format!("json encode failed: {e}")))?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

/// Decode one line (with or without its trailing newline).
pub fn decode(line: &[u8]) -> Result<Envelope> {
    let text = std::str::from_utf8(line)
        .map_err(|e| RelayError::BadRequest(format!("line is not utf-8: {e}")))?
        .trim();
    if text.is_empty() {
        return Err(RelayError::BadRequest("empty line".into()));
    }

    let raw: RawEnvelope = serde_json::from_str(text)
        .map_err(|e| RelayError::BadRequest(format!("invalid envelope json: {e}")))?;
    let data = raw.data.as_deref();

    let env = match raw.kind.as_str() {
        kinds::LOBBY_REQ => Envelope::LobbyReq(parse_data(kinds::LOBBY_REQ, data)?),
        kinds::LOBBY_ASSIGN => Envelope::LobbyAssign(parse_data(kinds::LOBBY_ASSIGN, data)?),
        kinds::GAME_START => Envelope::GameStart(parse_data(kinds::GAME_START, data)?),
        // payload is ignored; older clients send "" here
        kinds::STATE_REQ => Envelope::StateReq,
        kinds::STATE_RES => Envelope::StateRes(parse_data(kinds::STATE_RES, data)?),
        kinds::TURN_INFO => Envelope::TurnInfo(parse_data(kinds::TURN_INFO, data)?),
        kinds::PLAYER_LEFT => Envelope::PlayerLeft(parse_data(kinds::PLAYER_LEFT, data)?),
        kinds::ERROR => Envelope::Error(parse_data(kinds::ERROR, data)?),
        other => return Err(RelayError::UnknownType(other.to_string())),
    };
    Ok(env)
}

fn parse_data<T: DeserializeOwned>(kind: &str, data: Option<&RawValue>) -> Result<T> {
    let raw = data.ok_or_else(|| RelayError::BadRequest(format!("{kind} requires data")))?;
    serde_json::from_str(raw.get())
        .map_err(|e| RelayError::BadRequest(format!("{kind} invalid data: {e}")))
}
