//! Connection endpoint: one physical stream, one read loop, one write loop.
//!
//! The read loop decodes lines into envelopes and publishes them, in arrival
//! order, onto a bounded queue owned by whoever consumes this connection (the
//! pre-match task first, then the match). It never touches shared state.
//!
//! Lifecycle:
//! - `open` spawns both loops; the endpoint is live immediately.
//! - The read loop ends on EOF, read error, `close()` (also while it waits
//!   for room on a full queue), or when the consumer drops its queue. It then flips the liveness flag to false and publishes
//!   exactly one `ConnEvent::Closed`.
//! - The write loop drains queued lines and exits once the read side is gone
//!   or every `Endpoint` handle has been dropped. A write error stops output
//!   but leaves the read side running.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::Instrument;

use bloner_core::error::{RelayError, Result};
use bloner_core::protocol::{decode, encode, Envelope, PlayerId};

use crate::config::RelaySection;
use crate::obs::RelayMetrics;
use crate::signal;
use crate::transport::lines::{LineSink, LineStream};

/// What the read loop publishes.
#[derive(Debug)]
pub enum ConnEvent {
    Envelope(Envelope),
    /// Terminal liveness signal. Always the last event of a connection.
    Closed,
}

/// Queue bounds and labels for one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointOptions {
    pub inbound_queue: usize,
    pub outbound_queue: usize,
    /// Metric label (`tcp`, `ws`, `test`, ...).
    pub transport: &'static str,
}

impl EndpointOptions {
    pub fn from_config(relay: &RelaySection, transport: &'static str) -> Self {
        Self {
            inbound_queue: relay.inbound_queue,
            outbound_queue: relay.outbound_queue,
            transport,
        }
    }
}

/// Cloneable handle to one connection's outbound side and liveness.
#[derive(Clone)]
pub struct Endpoint {
    id: PlayerId,
    outbound: mpsc::Sender<Bytes>,
    alive: watch::Receiver<bool>,
    close: Arc<watch::Sender<bool>>,
    metrics: Arc<RelayMetrics>,
}

impl Endpoint {
    /// Take ownership of an accepted stream's line halves and start its loops.
    pub fn open(
        id: PlayerId,
        lines: LineStream,
        sink: LineSink,
        opts: EndpointOptions,
        metrics: Arc<RelayMetrics>,
    ) -> (Endpoint, mpsc::Receiver<ConnEvent>) {
        let (events_tx, events_rx) = mpsc::channel(opts.inbound_queue.max(1));
        let (out_tx, out_rx) = mpsc::channel(opts.outbound_queue.max(1));
        let (alive_tx, alive_rx) = watch::channel(true);
        let (close_tx, close_rx) = watch::channel(false);

        metrics.connections_active.inc(&[("transport", opts.transport)]);

        let span = tracing::debug_span!("endpoint", player_id = %id);
        let read = ReadLoop {
            lines,
            events: events_tx,
            outbound: out_tx.clone(),
            close: close_rx,
            alive: alive_tx,
            transport: opts.transport,
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(run_read_loop(read).instrument(span.clone()));
        tokio::spawn(run_write_loop(out_rx, sink, alive_rx.clone()).instrument(span));

        let endpoint = Endpoint {
            id,
            outbound: out_tx,
            alive: alive_rx,
            close: Arc::new(close_tx),
            metrics,
        };
        (endpoint, events_rx)
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Liveness flag; false once the read loop has finished.
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Resolves once the liveness flag has gone false.
    pub async fn closed(&self) {
        let mut alive = self.alive.clone();
        signal::lowered(&mut alive).await;
    }

    /// Explicit shutdown of the read side. Idempotent.
    pub fn close(&self) {
        self.close.send_replace(true);
    }

    /// Encode and enqueue one envelope. Never waits on the peer.
    pub fn send(&self, env: &Envelope) -> Result<()> {
        let line = encode(env)?;
        self.send_line(line, env.kind())
    }

    /// Enqueue an already-encoded line (broadcasts encode once).
    pub fn send_line(&self, line: Bytes, kind: &'static str) -> Result<()> {
        match self.outbound.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.outbound_dropped.inc(&[("reason", "full")]);
                tracing::warn!(player_id = %self.id, kind, "outbound queue full, message dropped");
                Err(RelayError::Transport("outbound queue full".into()))
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.outbound_dropped.inc(&[("reason", "closed")]);
                tracing::debug!(player_id = %self.id, kind, "send after writer stopped");
                Err(RelayError::Transport("connection closed".into()))
            }
        }
    }
}

struct ReadLoop {
    lines: LineStream,
    events: mpsc::Sender<ConnEvent>,
    outbound: mpsc::Sender<Bytes>,
    close: watch::Receiver<bool>,
    alive: watch::Sender<bool>,
    transport: &'static str,
    metrics: Arc<RelayMetrics>,
}

async fn run_read_loop(mut rl: ReadLoop) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = signal::raised(&mut rl.close) => break "closed locally",
            next = rl.lines.next() => next,
        };

        let line = match next {
            None => break "peer closed",
            Some(Err(e)) => {
                tracing::debug!(error = %e, "read failed");
                break "read error";
            }
            Some(Ok(line)) => line,
        };

        if line.trim_ascii().is_empty() {
            continue;
        }

        match decode(&line) {
            Ok(env) => {
                // A stalled consumer must not keep `close()` from ending the loop.
                let permit = tokio::select! {
                    biased;
                    _ = signal::raised(&mut rl.close) => break "closed locally",
                    permit = rl.events.reserve() => permit,
                };
                match permit {
                    Ok(permit) => permit.send(ConnEvent::Envelope(env)),
                    Err(_) => break "consumer gone",
                }
            }
            Err(e) => {
                rl.metrics
                    .decode_errors
                    .inc(&[("code", e.client_code().as_str())]);
                tracing::warn!(error = %e, "undecodable line dropped");
                if let Ok(reply) = encode(&Envelope::from_error(&e)) {
                    let _ = rl.outbound.try_send(reply);
                }
            }
        }
    };

    // Release the read half before announcing the close.
    drop(rl.lines);
    rl.alive.send_replace(false);
    rl.metrics
        .connections_active
        .dec(&[("transport", rl.transport)]);
    tracing::debug!(reason, "read loop finished");

    let _ = rl.events.send(ConnEvent::Closed).await;
}

async fn run_write_loop(
    mut rx: mpsc::Receiver<Bytes>,
    mut sink: LineSink,
    mut alive: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            biased;
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = signal::lowered(&mut alive) => break,
        };
        if let Err(e) = sink.send(line).await {
            tracing::warn!(error = %e, "write failed, output stopped");
            break;
        }
    }
    let _ = sink.close().await;
}
