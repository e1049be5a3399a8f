//! Lobby formation and matchmaking.

pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

pub use registry::{Placement, Registry, LOBBY_CAPACITY};

use crate::signal;

/// Periodically drop lobby members whose connection closed while waiting.
pub async fn run_sweeper(registry: Arc<Registry>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = signal::raised(&mut shutdown) => break,
            _ = tick.tick() => {
                let dropped = registry.sweep_lobbies();
                if dropped > 0 {
                    tracing::debug!(dropped, "lobby sweep");
                }
            }
        }
    }
}
