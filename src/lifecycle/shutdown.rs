//! Signal handling for graceful shutdown

use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT, Ctrl-C)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    #[cfg(unix)]
    pub async fn wait(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
        }

        Ok(())
    }

    /// Wait for a shutdown signal
    #[cfg(not(unix))]
    pub async fn wait(&self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await?;
        debug!("received Ctrl-C");
        Ok(())
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
