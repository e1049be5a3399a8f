//! One running match: four seats, the latest state snapshot, and the routing
//! loop that relays between them.
//!
//! The session is owned by a single task. Seat order is join order and seat 0
//! is the authoritative player (the one running the rules engine). The relay
//! never interprets game state; it stores the most recent `state_res` and
//! forwards everything else verbatim.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use bloner_core::error::{RelayError, Result};
use bloner_core::protocol::{encode, Envelope, GameState, PlayerId, PlayerLeft};

use crate::config::DisconnectPolicy;
use crate::dispatch::Fanin;
use crate::obs::RelayMetrics;
use crate::signal;
use crate::transport::{ConnEvent, Endpoint};

/// Why a match stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Every seat disconnected.
    AllDisconnected,
    /// One seat disconnected under `on_disconnect: abandon`.
    Abandoned,
    /// Cancelled from outside (process shutdown).
    Cancelled,
}

impl MatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOutcome::AllDisconnected => "all_disconnected",
            MatchOutcome::Abandoned => "abandoned",
            MatchOutcome::Cancelled => "cancelled",
        }
    }
}

struct Seat {
    endpoint: Endpoint,
    live: bool,
}

pub struct MatchSession {
    seats: Vec<Seat>,
    state: Option<GameState>,
    on_disconnect: DisconnectPolicy,
    metrics: Arc<RelayMetrics>,
}

impl MatchSession {
    /// `endpoints` in seat order; seat 0 is authoritative.
    pub fn new(
        endpoints: Vec<Endpoint>,
        on_disconnect: DisconnectPolicy,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let seats = endpoints
            .into_iter()
            .map(|endpoint| Seat {
                endpoint,
                live: true,
            })
            .collect();
        Self {
            seats,
            state: None,
            on_disconnect,
            metrics,
        }
    }

    /// Player ids in seat order.
    pub fn players(&self) -> Vec<PlayerId> {
        self.seats.iter().map(|s| s.endpoint.id()).collect()
    }

    pub fn authoritative(&self) -> Option<PlayerId> {
        self.seats.first().map(|s| s.endpoint.id())
    }

    /// Latest snapshot reported by any seat.
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn live_seats(&self) -> usize {
        self.seats.iter().filter(|s| s.live).count()
    }

    /// Announce the roster, then ask the authoritative seat for the opening state.
    pub fn start(&self) {
        self.broadcast(&Envelope::GameStart(self.players()));
        if let Some(seat) = self.seats.first() {
            if let Err(e) = seat.endpoint.send(&Envelope::StateReq) {
                tracing::warn!(player_id = %seat.endpoint.id(), error = %e, "state_req not delivered");
            }
        }
        tracing::info!(players = ?self.players(), "match started");
    }

    /// Apply one inbound envelope from `seat`.
    ///
    /// Only `state_res` and `turn_info` are valid during a match; anything
    /// else is rejected without side effects.
    pub fn route(&mut self, seat: usize, env: Envelope) -> Result<()> {
        let kind = env.kind();
        match env {
            Envelope::StateRes(state) => {
                self.state = Some(state.clone());
                self.broadcast(&Envelope::StateRes(state));
            }
            Envelope::TurnInfo(turn) => {
                self.broadcast(&Envelope::TurnInfo(turn));
            }
            other => {
                return Err(RelayError::NotAllowed(format!(
                    "{} is not accepted during a match",
                    other.kind()
                )));
            }
        }
        tracing::debug!(seat, kind, "routed");
        self.metrics.messages_routed.inc(&[("type", kind)]);
        Ok(())
    }

    /// Encode once and hand the line to every live seat. Returns how many
    /// seats accepted it; a failed seat never affects the others.
    pub fn broadcast(&self, env: &Envelope) -> usize {
        let line = match encode(env) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(kind = env.kind(), error = %e, "broadcast encode failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for seat in self.seats.iter().filter(|s| s.live) {
            match seat.endpoint.send_line(line.clone(), env.kind()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(player_id = %seat.endpoint.id(), error = %e, "broadcast skipped seat");
                }
            }
        }
        delivered
    }

    /// Mark `seat` gone. Returns the outcome if the match is over.
    fn handle_disconnect(&mut self, seat: usize) -> Option<MatchOutcome> {
        let s = self.seats.get_mut(seat)?;
        if !s.live {
            return None;
        }
        s.live = false;
        let player_id = s.endpoint.id();

        let remaining = self.live_seats();
        tracing::info!(%player_id, remaining, "player disconnected");
        if remaining == 0 {
            return Some(MatchOutcome::AllDisconnected);
        }

        self.broadcast(&Envelope::PlayerLeft(PlayerLeft { player_id }));
        match self.on_disconnect {
            DisconnectPolicy::Continue => None,
            DisconnectPolicy::Abandon => Some(MatchOutcome::Abandoned),
        }
    }

    fn reject(&self, seat: usize, err: &RelayError) {
        self.metrics.protocol_errors.inc(&[("phase", "match")]);
        let Some(s) = self.seats.get(seat) else {
            return;
        };
        tracing::warn!(player_id = %s.endpoint.id(), error = %err, "message rejected");
        let _ = s.endpoint.send(&Envelope::from_error(err));
    }

    /// Drive the match until it ends. `events` are the seats' inbound queues,
    /// in seat order.
    pub async fn run(
        mut self,
        events: Vec<mpsc::Receiver<ConnEvent>>,
        mut cancel: watch::Receiver<bool>,
    ) -> MatchOutcome {
        let mut inbound = Fanin::new(events);
        // A seat that died after the lobby filled still has its Closed event
        // queued; it is handled like any other disconnect.
        self.start();

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = signal::raised(&mut cancel) => break MatchOutcome::Cancelled,
                next = inbound.next() => next,
            };

            match next {
                None => break MatchOutcome::AllDisconnected,
                Some((seat, ConnEvent::Envelope(env))) => {
                    if let Err(e) = self.route(seat, env) {
                        self.reject(seat, &e);
                    }
                }
                Some((seat, ConnEvent::Closed)) => {
                    if let Some(outcome) = self.handle_disconnect(seat) {
                        break outcome;
                    }
                }
            }
        };

        for seat in &self.seats {
            seat.endpoint.close();
        }
        tracing::info!(outcome = outcome.as_str(), "match ended");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{lines, EndpointOptions};
    use bloner_core::protocol::{decode, Card, LobbyId, TeamState, TurnInfo, TurnType};
    use serde_json::{json, Map};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn recv(&mut self) -> Envelope {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a line")
                .unwrap();
            decode(line.as_bytes()).unwrap()
        }

        async fn send(&mut self, env: &Envelope) {
            self.writer.write_all(&encode(env).unwrap()).await.unwrap();
        }
    }

    fn seats(n: u64) -> (Vec<Endpoint>, Vec<mpsc::Receiver<ConnEvent>>, Vec<Client>) {
        let metrics = Arc::new(RelayMetrics::default());
        let mut endpoints = Vec::new();
        let mut events = Vec::new();
        let mut clients = Vec::new();
        for i in 1..=n {
            let (server, client) = tokio::io::duplex(16 * 1024);
            let (ls, sink) = lines::split(server, 8 * 1024);
            let opts = EndpointOptions {
                inbound_queue: 16,
                outbound_queue: 16,
                transport: "test",
            };
            let (ep, ev) = Endpoint::open(PlayerId(i), ls, sink, opts, Arc::clone(&metrics));
            let (r, w) = tokio::io::split(client);
            endpoints.push(ep);
            events.push(ev);
            clients.push(Client {
                reader: BufReader::new(r),
                writer: w,
            });
        }
        (endpoints, events, clients)
    }

    fn state(active: i64) -> GameState {
        GameState {
            player_id: PlayerId(1),
            active_player: active,
            trump_draw_id: 0,
            trump_suit: Card::INVALID_FIELD,
            draw_pile: vec![],
            play_pile: vec![],
            team_state: [TeamState(json!({})), TeamState(json!({}))],
            extra: Map::new(),
        }
    }

    fn turn(from: u64) -> TurnInfo {
        TurnInfo {
            player_id: PlayerId(from),
            turn_type: TurnType::TrumpPass,
            trump_pick: false,
            trump_discard: Card::NONE,
            card_play: Card::NONE,
            extra: Map::new(),
        }
    }

    fn session(endpoints: Vec<Endpoint>, policy: DisconnectPolicy) -> MatchSession {
        MatchSession::new(endpoints, policy, Arc::new(RelayMetrics::default()))
    }

    #[tokio::test]
    async fn start_sends_roster_then_state_req_to_seat_zero() {
        let (endpoints, _events, mut clients) = seats(4);
        let s = session(endpoints, DisconnectPolicy::Continue);
        s.start();

        let roster = Envelope::GameStart(vec![PlayerId(1), PlayerId(2), PlayerId(3), PlayerId(4)]);
        for c in clients.iter_mut() {
            assert_eq!(c.recv().await, roster);
        }
        assert_eq!(clients[0].recv().await, Envelope::StateReq);
        assert_eq!(s.authoritative(), Some(PlayerId(1)));
    }

    #[tokio::test]
    async fn state_res_is_stored_and_sent_to_everyone() {
        let (endpoints, _events, mut clients) = seats(4);
        let mut s = session(endpoints, DisconnectPolicy::Continue);

        s.route(0, Envelope::StateRes(state(2))).unwrap();
        assert_eq!(s.state().map(|st| st.active_player), Some(2));
        for c in clients.iter_mut() {
            assert_eq!(c.recv().await, Envelope::StateRes(state(2)));
        }
    }

    #[tokio::test]
    async fn turn_info_is_relayed_without_touching_state() {
        let (endpoints, _events, mut clients) = seats(4);
        let mut s = session(endpoints, DisconnectPolicy::Continue);

        s.route(2, Envelope::TurnInfo(turn(3))).unwrap();
        assert!(s.state().is_none());
        for c in clients.iter_mut() {
            assert_eq!(c.recv().await, Envelope::TurnInfo(turn(3)));
        }
    }

    #[tokio::test]
    async fn other_types_are_not_allowed_mid_match() {
        let (endpoints, _events, _clients) = seats(4);
        let mut s = session(endpoints, DisconnectPolicy::Continue);

        let err = s.route(1, Envelope::LobbyReq(LobbyId(3))).unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_ALLOWED");
        assert!(s.state().is_none());
    }

    #[tokio::test]
    async fn continue_policy_keeps_relaying_after_a_disconnect() {
        let (endpoints, events, mut clients) = seats(4);
        let s = session(endpoints, DisconnectPolicy::Continue);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = tokio::spawn(s.run(events, cancel_rx));

        for c in clients.iter_mut() {
            c.recv().await; // game_start
        }
        clients[0].recv().await; // state_req

        let gone = clients.remove(3);
        drop(gone);
        for c in clients.iter_mut() {
            assert_eq!(c.recv().await, Envelope::PlayerLeft(PlayerLeft { player_id: PlayerId(4) }));
        }

        clients[1].send(&Envelope::TurnInfo(turn(2))).await;
        for c in clients.iter_mut() {
            assert_eq!(c.recv().await, Envelope::TurnInfo(turn(2)));
        }

        clients.clear();
        let outcome = tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome, MatchOutcome::AllDisconnected);
    }

    #[tokio::test]
    async fn abandon_policy_ends_the_match_on_first_disconnect() {
        let (endpoints, events, mut clients) = seats(4);
        let watchers = endpoints.clone();
        let s = session(endpoints, DisconnectPolicy::Abandon);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = tokio::spawn(s.run(events, cancel_rx));

        for c in clients.iter_mut() {
            c.recv().await;
        }
        drop(clients.remove(2));

        let outcome = tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome, MatchOutcome::Abandoned);
        for ep in &watchers {
            tokio::time::timeout(Duration::from_secs(2), ep.closed()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancel_stops_the_match() {
        let (endpoints, events, _clients) = seats(4);
        let s = session(endpoints, DisconnectPolicy::Continue);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = tokio::spawn(s.run(events, cancel_rx));

        cancel_tx.send_replace(true);
        let outcome = tokio::time::timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome, MatchOutcome::Cancelled);
    }

    #[tokio::test]
    async fn rejected_message_gets_an_error_reply() {
        let (endpoints, events, mut clients) = seats(4);
        let s = session(endpoints, DisconnectPolicy::Continue);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let _run = tokio::spawn(s.run(events, cancel_rx));

        for c in clients.iter_mut() {
            c.recv().await;
        }
        clients[0].recv().await;

        clients[1].send(&Envelope::LobbyReq(LobbyId(1))).await;
        match clients[1].recv().await {
            Envelope::Error(body) => assert_eq!(body.code, "NOT_ALLOWED"),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
