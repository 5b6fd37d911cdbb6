//! OS signal handling.
//!
//! On Unix SIGINT, SIGTERM and SIGQUIT stop the consumer; elsewhere only
//! Ctrl-C does. A signal only cancels the shared token: the cycle in progress
//! (and its worker) always runs to completion.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Cancels `token` on the first shutdown signal.
///
/// The task ends on its own once the token is cancelled from elsewhere.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => match res {
                Ok(signal) => {
                    info!(signal, "shutdown requested, finishing current cycle");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "cannot install signal handlers"),
            },
            _ = token.cancelled() => {}
        }
    })
}
