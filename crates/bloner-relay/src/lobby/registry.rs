//! Lobby table and match table.
//!
//! - lobbies: `LobbyId -> waiting players` behind one mutex, so concurrent
//!   joins to one id are serialized and a lobby never exceeds capacity
//! - matches: `MatchId -> roster + cancel signal` in a `DashMap`
//!
//! A lobby is removed from the table in the same critical section that fills
//! it, so a lobby and its match never coexist. A later join to the same id
//! opens a new lobby.
//!
//! Lobby members stay owned by their connection task, which keeps reading
//! (and refusing) input until the match claims the player's queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::Instrument;

use bloner_core::protocol::{Envelope, LobbyAssign, LobbyId, MatchId, PlayerId};

use crate::config::MatchSection;
use crate::obs::RelayMetrics;
use crate::session::{MatchOutcome, MatchSession, Waiting};
use crate::transport::Endpoint;

/// Players per match.
pub const LOBBY_CAPACITY: usize = 4;

/// Where a `lobby_req` landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub lobby_id: LobbyId,
    /// Set when this join filled the lobby and started its match.
    pub match_id: Option<MatchId>,
}

struct Lobby {
    members: Vec<Waiting>,
}

impl Lobby {
    fn new() -> Self {
        Self {
            members: Vec::with_capacity(LOBBY_CAPACITY),
        }
    }

    /// Drop members whose connection already closed. Returns how many left.
    fn prune_disconnected(&mut self, lobby_id: LobbyId) -> usize {
        let before = self.members.len();
        self.members.retain(|p| {
            let alive = p.is_alive();
            if !alive {
                tracing::info!(player_id = %p.id(), %lobby_id, "dropping disconnected lobby member");
            }
            alive
        });
        before - self.members.len()
    }
}

#[derive(Default)]
struct LobbyTable {
    lobbies: HashMap<LobbyId, Lobby>,
    last_fresh: u64,
}

impl LobbyTable {
    /// Next id not currently naming an open lobby. Never `0`.
    fn allocate(&mut self) -> LobbyId {
        loop {
            self.last_fresh = self.last_fresh.wrapping_add(1);
            let id = LobbyId(self.last_fresh);
            if !id.is_fresh() && !self.lobbies.contains_key(&id) {
                return id;
            }
        }
    }
}

struct MatchEntry {
    lobby_id: LobbyId,
    players: Vec<PlayerId>,
    cancel: watch::Sender<bool>,
}

/// Process-wide lobby/match registry. Built once at startup and shared by `Arc`.
pub struct Registry {
    lobbies: Mutex<LobbyTable>,
    matches: DashMap<MatchId, MatchEntry>,
    next_player: AtomicU64,
    next_match: AtomicU64,
    shutting_down: AtomicBool,
    match_cfg: MatchSection,
    metrics: Arc<RelayMetrics>,
}

impl Registry {
    pub fn new(match_cfg: MatchSection, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            lobbies: Mutex::new(LobbyTable::default()),
            matches: DashMap::new(),
            next_player: AtomicU64::new(1),
            next_match: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            match_cfg,
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process-unique player id. Never reused.
    pub fn next_player_id(&self) -> PlayerId {
        PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_lobbies(&self) -> MutexGuard<'_, LobbyTable> {
        // Membership edits are single statements; a poisoned table is still consistent.
        self.lobbies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place `member` in a lobby and queue its `lobby_assign`.
    ///
    /// - `LobbyId::FRESH` opens a lobby under a newly allocated id.
    /// - An id naming an open lobby appends the player to it.
    /// - Any other id opens a new lobby under that id.
    ///
    /// The fourth member removes the lobby and starts its match.
    pub fn request_lobby(self: &Arc<Self>, requested: LobbyId, member: Waiting) -> Placement {
        let player_id = member.id();

        let (lobby_id, full) = {
            let mut table = self.lock_lobbies();
            let lobby_id = if requested.is_fresh() {
                table.allocate()
            } else {
                requested
            };

            let lobby = table.lobbies.entry(lobby_id).or_insert_with(|| {
                tracing::debug!(%lobby_id, "lobby opened");
                Lobby::new()
            });
            lobby.prune_disconnected(lobby_id);
            // Queued under the lock, so it precedes this lobby's game_start.
            let assign = Envelope::LobbyAssign(LobbyAssign { lobby_id, player_id });
            if let Err(e) = member.endpoint.send(&assign) {
                tracing::warn!(%player_id, error = %e, "lobby_assign not delivered");
            }
            lobby.members.push(member);
            let size = lobby.members.len();

            let full = if size >= LOBBY_CAPACITY {
                table.lobbies.remove(&lobby_id).map(|l| l.members)
            } else {
                None
            };
            (lobby_id, full)
        };

        tracing::info!(%player_id, %lobby_id, "player joined lobby");

        let match_id = full.map(|members| self.start_match(lobby_id, members));
        Placement { lobby_id, match_id }
    }

    fn start_match(self: &Arc<Self>, lobby_id: LobbyId, members: Vec<Waiting>) -> MatchId {
        let match_id = MatchId(self.next_match.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = watch::channel(self.shutting_down.load(Ordering::Acquire));

        let endpoints: Vec<Endpoint> = members.iter().map(|m| m.endpoint.clone()).collect();
        let players: Vec<PlayerId> = endpoints.iter().map(Endpoint::id).collect();

        self.matches.insert(
            match_id,
            MatchEntry {
                lobby_id,
                players: players.clone(),
                cancel: cancel_tx,
            },
        );
        self.metrics.matches_started.inc(&[]);

        let session = MatchSession::new(
            endpoints,
            self.match_cfg.on_disconnect,
            Arc::clone(&self.metrics),
        );
        let registry = Arc::clone(self);
        let span = tracing::info_span!("match", %match_id, %lobby_id);
        tokio::spawn(
            async move {
                let mut events = Vec::with_capacity(members.len());
                for member in members {
                    events.push(member.claim().await.events);
                }
                let outcome = session.run(events, cancel_rx).await;
                registry.finish_match(match_id, outcome);
            }
            .instrument(span),
        );

        tracing::info!(%match_id, %lobby_id, ?players, "match created");
        match_id
    }

    fn finish_match(&self, match_id: MatchId, outcome: MatchOutcome) {
        self.matches.remove(&match_id);
        self.metrics
            .matches_ended
            .inc(&[("outcome", outcome.as_str())]);
    }

    /// Member ids of an open lobby, in join order.
    pub fn lobby_members(&self, lobby_id: LobbyId) -> Option<Vec<PlayerId>> {
        self.lock_lobbies()
            .lobbies
            .get(&lobby_id)
            .map(|l| l.members.iter().map(Waiting::id).collect())
    }

    pub fn open_lobbies(&self) -> usize {
        self.lock_lobbies().lobbies.len()
    }

    /// Players currently waiting in any lobby.
    pub fn waiting_players(&self) -> usize {
        self.lock_lobbies()
            .lobbies
            .values()
            .map(|l| l.members.len())
            .sum()
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Roster of a running match, in seat order.
    pub fn match_players(&self, match_id: MatchId) -> Option<Vec<PlayerId>> {
        self.matches.get(&match_id).map(|m| m.players.clone())
    }

    /// Running match that was promoted from `lobby_id`, if any.
    pub fn match_for_lobby(&self, lobby_id: LobbyId) -> Option<MatchId> {
        self.matches
            .iter()
            .find(|m| m.lobby_id == lobby_id)
            .map(|m| *m.key())
    }

    /// Drop dead lobby members and lobbies left empty.
    pub fn sweep_lobbies(&self) -> usize {
        let mut table = self.lock_lobbies();
        let mut dropped = 0;
        table.lobbies.retain(|id, lobby| {
            dropped += lobby.prune_disconnected(*id);
            if lobby.members.is_empty() {
                tracing::debug!(lobby_id = %id, "empty lobby removed");
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Close every waiting connection and cancel every match.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);

        let drained: Vec<Lobby> = {
            let mut table = self.lock_lobbies();
            table.lobbies.drain().map(|(_, l)| l).collect()
        };
        for member in drained.iter().flat_map(|l| l.members.iter()) {
            member.endpoint.close();
        }

        for m in self.matches.iter() {
            m.cancel.send_replace(true);
        }
        tracing::info!(
            lobbies = drained.len(),
            matches = self.matches.len(),
            "registry shut down"
        );
    }
}
