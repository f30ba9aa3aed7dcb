use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wait for SIGTERM or SIGINT (Ctrl-C), then cancel `token`.
///
/// # Errors
///
/// Fails if a signal handler cannot be installed; `token` is left untouched.
pub async fn wait_for_shutdown_signal(token: CancellationToken) -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = ctrl_c => {
                result?;
                info!(event = "cli.run.signal_received", signal = "SIGINT");
            }
            _ = sigterm.recv() => {
                info!(event = "cli.run.signal_received", signal = "SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        info!(event = "cli.run.signal_received", signal = "SIGINT");
    }

    token.cancel();
    Ok(())
}
