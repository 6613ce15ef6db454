//! Graceful shutdown (spec §7 "the server drains in-flight forwards and
//! stops every supervisor before exiting"), wired to SIGINT/SIGTERM the
//! same way `agent::main`'s runtime does with `tokio::signal`.

use crate::state::AppState;
use std::time::Duration;

/// Resolves once either signal fires. Handed to `axum::serve(...)
/// .with_graceful_shutdown(...)`, which stops accepting new connections
/// and waits out in-flight ones before this function's caller proceeds to
/// drain supervisors.
pub async fn signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Stops every supervisor once the listener has drained, bounding the
/// wait so a worker wedged on its own stop command can't hang the exit.
pub async fn drain(state: &AppState, timeout: Duration) {
    tracing::info!("shutting down, stopping all workers");
    if tokio::time::timeout(timeout, state.coordinator().stop_all("server shutdown"))
        .await
        .is_err()
    {
        tracing::warn!("not every worker stopped within the shutdown timeout");
    }
}
