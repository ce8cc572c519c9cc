use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bridges an external shutdown trigger (typically an OS signal) to the
/// server.
///
/// The core only exposes [`Server::shutdown`](super::Server::shutdown);
/// wiring SIGINT/SIGTERM to it is the embedder's job, and this is the
/// helper the binary uses for that.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Trigger shutdown programmatically.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Completes once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Waits for SIGINT or SIGTERM (CTRL+C elsewhere), then triggers.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("failed to listen for CTRL+C");
            info!("received CTRL+C");
        }

        info!("initiating graceful shutdown");
        self.trigger();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
