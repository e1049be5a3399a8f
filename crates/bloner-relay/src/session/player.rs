use tokio::sync::{mpsc, oneshot};

use bloner_core::protocol::PlayerId;

use crate::transport::{ConnEvent, Endpoint};

/// A connected player: its endpoint plus the queue its read loop feeds.
///
/// Whoever holds the `Player` is the connection's only consumer. The
/// connection's own task holds it until the player's lobby fills, then hands
/// it to the match.
pub struct Player {
    pub endpoint: Endpoint,
    pub events: mpsc::Receiver<ConnEvent>,
}

impl Player {
    pub fn new(endpoint: Endpoint, events: mpsc::Receiver<ConnEvent>) -> Self {
        Self { endpoint, events }
    }

    /// A player whose connection is already gone: its queue yields one
    /// `Closed` and then ends.
    pub fn disconnected(endpoint: Endpoint) -> Self {
        let (tx, events) = mpsc::channel(1);
        let _ = tx.try_send(ConnEvent::Closed);
        Self { endpoint, events }
    }

    pub fn id(&self) -> PlayerId {
        self.endpoint.id()
    }
}

/// Where the owning task delivers its `Player` once the match claims it.
pub type Handoff = oneshot::Sender<Player>;

/// A lobby member. The registry keeps the endpoint and a claim on the
/// player; the connection task keeps reading the inbound queue meanwhile.
pub struct Waiting {
    pub endpoint: Endpoint,
    claim: oneshot::Sender<Handoff>,
}

impl Waiting {
    /// Returns the lobby entry and the receiver its owning task watches for
    /// the match's claim. Dropping the entry (prune, sweep, shutdown) closes
    /// that receiver.
    pub fn new(endpoint: Endpoint) -> (Self, oneshot::Receiver<Handoff>) {
        let (claim, claimed) = oneshot::channel();
        (Self { endpoint, claim }, claimed)
    }

    pub fn id(&self) -> PlayerId {
        self.endpoint.id()
    }

    pub fn is_alive(&self) -> bool {
        self.endpoint.is_alive()
    }

    /// Ask the owning task for its `Player`. If that task is gone the seat
    /// gets a disconnected player instead.
    pub async fn claim(self) -> Player {
        let (handoff, delivered) = oneshot::channel();
        if self.claim.send(handoff).is_err() {
            return Player::disconnected(self.endpoint);
        }
        match delivered.await {
            Ok(player) => player,
            Err(_) => Player::disconnected(self.endpoint),
        }
    }
}
