//! Boolean watch flags (close, liveness, shutdown, cancel) and OS signals.

use tokio::sync::watch;

/// Resolves once `flag` reads true, or its sender is gone.
pub async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|v| *v).await;
}

/// Resolves once `flag` reads false, or its sender is gone.
pub async fn lowered(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|v| !*v).await;
}

/// Ctrl-C, or SIGTERM on unix.
pub async fn os_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl-c received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}
