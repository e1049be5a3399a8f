use std::net::SocketAddr;

use serde::Deserialize;

use bloner_core::error::{RelayError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default, rename = "match")]
    pub match_: MatchSection,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::UnsupportedVersion);
        }
        self.relay.validate()?;
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            relay: RelaySection::default(),
            match_: MatchSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    /// Raw TCP listener, newline-delimited envelopes.
    #[serde(default = "default_tcp_listen")]
    pub tcp_listen: String,

    /// WebSocket listener (`GET /ws`), one envelope per text frame.
    #[serde(default)]
    pub ws_listen: Option<String>,

    /// `/healthz`, `/readyz`, `/metrics`.
    #[serde(default)]
    pub ops_listen: Option<String>,

    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// How often abandoned lobbies are swept.
    #[serde(default = "default_lobby_sweep_ms")]
    pub lobby_sweep_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            tcp_listen: default_tcp_listen(),
            ws_listen: None,
            ops_listen: None,
            max_line_bytes: default_max_line_bytes(),
            inbound_queue: default_inbound_queue(),
            outbound_queue: default_outbound_queue(),
            lobby_sweep_ms: default_lobby_sweep_ms(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("relay.tcp_listen", &self.tcp_listen)?;
        if let Some(ws) = &self.ws_listen {
            parse_addr("relay.ws_listen", ws)?;
        }
        if let Some(ops) = &self.ops_listen {
            parse_addr("relay.ops_listen", ops)?;
        }
        if !(256..=1_048_576).contains(&self.max_line_bytes) {
            return Err(RelayError::BadRequest(
                "relay.max_line_bytes must be between 256 and 1048576".into(),
            ));
        }
        if !(1..=4096).contains(&self.inbound_queue) {
            return Err(RelayError::BadRequest(
                "relay.inbound_queue must be between 1 and 4096".into(),
            ));
        }
        if !(1..=4096).contains(&self.outbound_queue) {
            return Err(RelayError::BadRequest(
                "relay.outbound_queue must be between 1 and 4096".into(),
            ));
        }
        if !(100..=600_000).contains(&self.lobby_sweep_ms) {
            return Err(RelayError::BadRequest(
                "relay.lobby_sweep_ms must be between 100 and 600000".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a listen address, reporting the offending key.
pub fn parse_addr(key: &str, s: &str) -> Result<SocketAddr> {
    s.parse()
        .map_err(|e| RelayError::BadRequest(format!("{key} is not a socket address ({s}): {e}")))
}

/// What a match does when one member disconnects mid-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep relaying between the remaining players until everyone is gone.
    #[default]
    Continue,
    /// End the match and close the remaining connections.
    Abandon,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchSection {
    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,
}

fn default_tcp_listen() -> String {
    "0.0.0.0:9000".into()
}
fn default_max_line_bytes() -> usize {
    64 * 1024
}
fn default_inbound_queue() -> usize {
    64
}
fn default_outbound_queue() -> usize {
    256
}
fn default_lobby_sweep_ms() -> u64 {
    5_000
}
