use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RpcError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::registry::Registry;
use crate::session::{run_session, SessionContext};
use crate::transport::tls::TlsConfig;

/// How long `shutdown()` waits for in-flight sessions before
/// force-closing them.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Construction-time server configuration. Supplying [`TlsConfig`]
/// switches the listener from plain TCP to TLS.
pub struct ServerConfig {
    pub addr: String,
    pub registry: Registry,
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>, registry: Registry) -> Self {
        Self {
            addr: addr.into(),
            registry,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// Handle to a running RPC server.
///
/// Accepting starts as soon as [`bind`](Server::bind) returns; the
/// handle is used to observe the bound address and metrics and to drive
/// graceful shutdown.
pub struct Server {
    local_addr: SocketAddr,
    accept_cancel: CancellationToken,
    metrics: Arc<Metrics>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Server {
    /// Binds the listener and spawns the accept loop. Bind failures
    /// surface as [`RpcError::Listen`].
    pub async fn bind(config: ServerConfig) -> Result<Server> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| RpcError::Listen {
                addr: config.addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let acceptor = config.tls.as_ref().map(TlsConfig::acceptor).transpose()?;
        let tls_enabled = acceptor.is_some();

        let metrics = Arc::new(Metrics::new());
        let ctx = Arc::new(SessionContext {
            registry: Arc::new(config.registry),
            metrics: metrics.clone(),
        });

        // Two tokens: the accept token stops the listener immediately on
        // shutdown while the force token fires only after the drain
        // window, so in-flight requests get to finish.
        let accept_cancel = CancellationToken::new();
        let force_cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            acceptor,
            ctx,
            accept_cancel.clone(),
            force_cancel,
        ));

        info!(%local_addr, tls = tls_enabled, "RPC server listening");

        Ok(Server {
            local_addr,
            accept_cancel,
            metrics,
            accept_task: Mutex::new(Some(accept_task)),
            shutdown_started: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops accepting, drains active sessions for up to
    /// [`SHUTDOWN_TIMEOUT_MS`], force-closes stragglers, and returns.
    /// A second call while the first is in progress is a no-op.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("shutting down RPC server");
        self.accept_cancel.cancel();
        let task = self.accept_task.lock().await.take();
        if let Some(task) = task {
            if task.await.is_err() {
                error!("accept loop panicked during shutdown");
            }
        }
        info!("RPC server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    ctx: Arc<SessionContext>,
    accept_cancel: CancellationToken,
    force_cancel: CancellationToken,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = accept_cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    ctx.metrics.record_connection();
                    debug!(%peer, "accepted connection");
                    let cancel = force_cancel.child_token();
                    let ctx = ctx.clone();
                    let acceptor = acceptor.clone();
                    sessions.spawn(async move {
                        match acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => run_session(tls_stream, ctx, cancel).await,
                                Err(err) => warn!(%peer, error = %err, "TLS handshake failed"),
                            },
                            None => run_session(stream, ctx, cancel).await,
                        }
                        debug!(%peer, "session closed");
                    });
                }
                Err(err) => error!(error = %err, "failed to accept connection"),
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    // Refuse new connections from here on.
    drop(listener);

    let remaining = sessions.len();
    if remaining > 0 {
        info!(sessions = remaining, "draining active sessions");
        let drain = async {
            while sessions.join_next().await.is_some() {}
        };
        if tokio::time::timeout(Duration::from_millis(SHUTDOWN_TIMEOUT_MS), drain)
            .await
            .is_err()
        {
            warn!(
                sessions = sessions.len(),
                "session drain timed out, force-closing"
            );
            force_cancel.cancel();
            let grace = async {
                while sessions.join_next().await.is_some() {}
            };
            if tokio::time::timeout(Duration::from_millis(1_000), grace)
                .await
                .is_err()
            {
                // A session stuck in a blocked write never sees the
                // token; abort outright.
                sessions.abort_all();
                while sessions.join_next().await.is_some() {}
            }
        }
    }
}
