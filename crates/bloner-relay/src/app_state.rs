//! Shared application state: config, registry, metrics, shutdown signal.
//!
//! Cheap to clone; every listener and handler gets its own copy.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::RelayConfig;
use crate::lobby::Registry;
use crate::obs::RelayMetrics;
use crate::transport::EndpointOptions;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
}

struct AppStateInner {
    cfg: RelayConfig,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(cfg: RelayConfig) -> Self {
        let metrics = Arc::new(RelayMetrics::default());
        let registry = Arc::new(Registry::new(cfg.match_.clone(), Arc::clone(&metrics)));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(AppStateInner { cfg, shutdown }),
            registry,
            metrics,
        }
    }

    pub fn cfg(&self) -> &RelayConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn endpoint_options(&self, transport: &'static str) -> EndpointOptions {
        EndpointOptions::from_config(&self.cfg().relay, transport)
    }

    /// Receiver that flips to true once shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Stop accepting, close waiting connections, cancel every match.
    pub fn begin_shutdown(&self) {
        if self.metrics.is_draining() {
            return;
        }
        self.metrics.set_draining();
        self.inner.shutdown.send_replace(true);
        self.registry.shutdown();
    }

    /// Registry gauges appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("bloner_lobbies_open", self.registry.open_lobbies() as u64),
            ("bloner_lobby_players_waiting", self.registry.waiting_players() as u64),
            ("bloner_matches_active", self.registry.active_matches() as u64),
        ]
    }
}
