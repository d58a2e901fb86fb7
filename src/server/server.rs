//! Connection supervisor
//!
//! Accepts clients and runs one isolated [`Session`] task per connection.

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::socks::{Resolver, Session, SessionReport};
use crate::transport::SocketOpts;
use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, info_span, warn, Instrument};

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// SOCKS5 listener and session supervisor
pub struct Server {
    /// Listener and session configuration
    config: Arc<ServerConfig>,
    /// Destination name resolver shared by all sessions
    resolver: Arc<dyn Resolver>,
}

impl Server {
    /// Create a new server
    pub fn new(config: ServerConfig, resolver: Arc<dyn Resolver>) -> Self {
        Server {
            config: Arc::new(config),
            resolver,
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.config.bind_addr))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("SOCKS5 server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until shutdown
    pub async fn run(self, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Accept connections on `listener` until a shutdown signal arrives.
    ///
    /// Live sessions subscribe to the same signal and are dropped, closing
    /// both of their sockets, when it fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<bool>,
    ) -> Result<()> {
        let limiter = match self.config.max_connections {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let opts = SocketOpts::from_tcp_config(&self.config.tcp);
        let mut next_id: u64 = 0;

        loop {
            let permit = match &limiter {
                Some(limiter) => tokio::select! {
                    permit = limiter.clone().acquire_owned() => {
                        Some(permit.map_err(|_| anyhow!("Connection limiter closed"))?)
                    }
                    _ = shutdown_rx.recv() => break,
                },
                None => None,
            };

            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                },
                _ = shutdown_rx.recv() => break,
            };

            // A signal sent before resubscribe is only visible on shutdown_rx
            let mut session_shutdown = shutdown_rx.resubscribe();
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                debug!("Shutdown arrived with connection from {}, dropping it", peer);
                break;
            }

            next_id += 1;
            let id = next_id;
            opts.hint(&stream);

            let session = Session::new(id, stream, self.config.clone(), self.resolver.clone());

            tokio::spawn(
                async move {
                    let _permit = permit;
                    debug!("Accepted connection");
                    tokio::select! {
                        result = session.run() => log_outcome(result),
                        _ = session_shutdown.recv() => debug!("Session cancelled by shutdown"),
                    }
                }
                .instrument(info_span!("session", id, %peer)),
            );
        }

        info!("SOCKS5 server stopped");
        Ok(())
    }
}

fn log_outcome(result: Result<SessionReport, SessionError>) {
    match result {
        Ok(report) => {
            let stats = &report.stats;
            info!(
                "Relay to {} completed: {} bytes up, {} bytes down",
                report.target, stats.upstream_bytes, stats.downstream_bytes
            );
            if let Some(e) = &stats.error {
                debug!("{}", e);
            }
            if stats.drain_timed_out {
                debug!("Relay cut off by drain timeout");
            }
        }
        Err(e) if e.is_protocol_violation() => warn!("Handshake failed: {}", e),
        Err(e) => info!("Handshake failed: {}", e),
    }
}
