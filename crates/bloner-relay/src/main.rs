//! bloner relay binary.
//!
//! - Raw TCP listener (newline-delimited envelopes)
//! - Optional WebSocket listener (`GET /ws`)
//! - Optional ops listener (`/healthz`, `/readyz`, `/metrics`)
//! - Graceful shutdown on Ctrl-C / SIGTERM
//!
//! Usage: `bloner-relay [config.yaml]` (default `bloner.yaml`).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, EnvFilter};

use bloner_core::error::{RelayError, Result};
use bloner_relay::config::{self, schema::parse_addr};
use bloner_relay::{app_state::AppState, lobby, router, signal, transport};

const DEFAULT_CONFIG: &str = "bloner.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, config = %path, "bloner-relay failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let state = AppState::new(cfg);
    let relay = state.cfg().relay.clone();

    // Bind everything before serving anything, so a bad address fails startup.
    let tcp = bind("relay.tcp_listen", &relay.tcp_listen).await?;
    let ws = match &relay.ws_listen {
        Some(addr) => Some(bind("relay.ws_listen", addr).await?),
        None => None,
    };
    let ops = match &relay.ops_listen {
        Some(addr) => Some(bind("relay.ops_listen", addr).await?),
        None => None,
    };

    let mut tasks = JoinSet::new();
    tasks.spawn(transport::tcp::serve(tcp, state.clone()));
    if let Some(listener) = ws {
        tasks.spawn(serve_http(
            "ws",
            listener,
            router::build_ws_router(state.clone()),
            state.shutdown_signal(),
        ));
    }
    if let Some(listener) = ops {
        tasks.spawn(serve_http(
            "ops",
            listener,
            router::build_ops_router(state.clone()),
            state.shutdown_signal(),
        ));
    }
    tasks.spawn(lobby::run_sweeper(
        state.registry(),
        Duration::from_millis(relay.lobby_sweep_ms),
        state.shutdown_signal(),
    ));

    tracing::info!("bloner-relay running");
    signal::os_shutdown().await;

    tracing::info!("draining");
    state.begin_shutdown();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "listener task failed");
        }
    }
    tracing::info!("bloner-relay stopped");
    Ok(())
}

async fn bind(key: &str, addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = parse_addr(key, addr)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Transport(format!("bind {key} ({addr}) failed: {e}")))?;
    tracing::info!(%addr, listener = key, "listening");
    Ok(listener)
}

async fn serve_http(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal::raised(&mut shutdown).await })
        .await;
    match served {
        Ok(()) => tracing::info!(listener = name, "http listener stopped"),
        Err(e) => tracing::error!(listener = name, error = %e, "http listener failed"),
    }
}
