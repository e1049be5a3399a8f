//! Pre-match loop: one task per connection until its match takes over.
//!
//! Two phases, one consumer of the connection's inbound queue throughout:
//! - before `lobby_req`: the only accepted envelope is `lobby_req`
//! - waiting in a lobby: every envelope is refused; the task hands its
//!   queue to the match when the lobby fills, or ends if the registry
//!   drops the member

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::Instrument;

use bloner_core::error::RelayError;
use bloner_core::protocol::{Envelope, LobbyId};

use crate::lobby::Registry;
use crate::obs::RelayMetrics;
use crate::session::{Handoff, Player, Waiting};
use crate::signal;
use crate::transport::lines::{LineSink, LineStream};
use crate::transport::{ConnEvent, Endpoint, EndpointOptions};

/// Serve one freshly accepted connection.
pub async fn serve_connection(
    registry: Arc<Registry>,
    lines: LineStream,
    sink: LineSink,
    opts: EndpointOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let player_id = registry.next_player_id();
    let span = tracing::info_span!("conn", %player_id, transport = opts.transport);

    async move {
        let metrics = registry.metrics();
        metrics
            .connections_accepted
            .inc(&[("transport", opts.transport)]);

        let (endpoint, mut events) =
            Endpoint::open(player_id, lines, sink, opts, Arc::clone(&metrics));
        tracing::info!("connection open");

        loop {
            let next = tokio::select! {
                biased;
                _ = signal::raised(&mut shutdown) => {
                    endpoint.close();
                    tracing::debug!("closed by shutdown before joining a lobby");
                    return;
                }
                next = events.recv() => next,
            };

            match next {
                Some(ConnEvent::Envelope(Envelope::LobbyReq(requested))) => {
                    let (member, claimed) = Waiting::new(endpoint.clone());
                    let placement = registry.request_lobby(requested, member);
                    wait_in_lobby(
                        Player::new(endpoint, events),
                        placement.lobby_id,
                        claimed,
                        &metrics,
                        shutdown,
                    )
                    .await;
                    return;
                }
                Some(ConnEvent::Envelope(other)) => {
                    let err = RelayError::NotAllowed(format!(
                        "{} before lobby_req",
                        other.kind()
                    ));
                    refuse(&endpoint, &metrics, "prematch", &err);
                }
                Some(ConnEvent::Closed) | None => {
                    tracing::info!("disconnected before joining a lobby");
                    return;
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Keep consuming a lobby member's queue until the match claims it.
async fn wait_in_lobby(
    mut player: Player,
    lobby_id: LobbyId,
    mut claimed: oneshot::Receiver<Handoff>,
    metrics: &RelayMetrics,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut gone = false;
    let mut closing = false;
    loop {
        tokio::select! {
            biased;
            claim = &mut claimed => {
                match claim {
                    Ok(handoff) => {
                        tracing::debug!(%lobby_id, "queue handed to match");
                        let _ = handoff.send(player);
                    }
                    Err(_) => {
                        tracing::debug!(%lobby_id, "removed from lobby");
                        player.endpoint.close();
                    }
                }
                return;
            }
            _ = signal::raised(&mut shutdown), if !gone && !closing => {
                player.endpoint.close();
                closing = true;
            }
            next = player.events.recv(), if !gone => match next {
                Some(ConnEvent::Envelope(env)) => {
                    let err = RelayError::NotAllowed(format!(
                        "{} while waiting in lobby {lobby_id}",
                        env.kind()
                    ));
                    refuse(&player.endpoint, metrics, "lobby", &err);
                }
                Some(ConnEvent::Closed) | None => {
                    tracing::info!(%lobby_id, "disconnected while waiting in lobby");
                    // The match still needs a Closed for this seat if it claims it.
                    player = Player::disconnected(player.endpoint);
                    gone = true;
                }
            },
        }
    }
}

fn refuse(endpoint: &Endpoint, metrics: &RelayMetrics, phase: &'static str, err: &RelayError) {
    metrics.protocol_errors.inc(&[("phase", phase)]);
    tracing::warn!(error = %err, "message rejected");
    let _ = endpoint.send(&Envelope::from_error(err));
}
