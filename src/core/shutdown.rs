//! # OS termination signals for drivers.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination signal so a driver
//! can call [`Runner::shutdown`](crate::Runner::shutdown):
//!
//! ```text
//! select! {
//!     _ = wait_for_shutdown_signal() => runner.shutdown().await?,
//!     ev = sub.recv() => ...,
//! }
//! ```
//!
//! - **Unix**: `SIGINT`, `SIGTERM`, `SIGQUIT`
//! - **Elsewhere**: Ctrl-C

/// Waits for a termination signal and returns its name.
///
/// Each call registers fresh listeners. Fails only if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = name, "shutdown signal received");
    Ok(name)
}

/// Waits for Ctrl-C and returns its name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "shutdown signal received");
    Ok("ctrl-c")
}
