//! Raw TCP listener. Every accepted socket gets its own pre-match task.

use std::time::Duration;

use tokio::net::TcpListener;

use crate::app_state::AppState;
use crate::dispatch::serve_connection;
use crate::signal;
use crate::transport::lines;

/// Back-off after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept until the process shutdown signal fires.
pub async fn serve(listener: TcpListener, app: AppState) {
    let mut shutdown = app.shutdown_signal();
    let max_line = app.cfg().relay.max_line_bytes;

    loop {
        let accepted = tokio::select! {
            _ = signal::raised(&mut shutdown) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                if let Err(e) = socket.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "set_nodelay failed");
                }
                tracing::debug!(%peer, "tcp connection accepted");

                let (r, w) = socket.into_split();
                tokio::spawn(serve_connection(
                    app.registry(),
                    lines::line_stream(r, max_line),
                    lines::line_sink(w),
                    app.endpoint_options("tcp"),
                    app.shutdown_signal(),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "tcp accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    tracing::info!("tcp listener stopped");
}
