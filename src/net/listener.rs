//! TCP listener implementation with backpressure and drain support.
//!
//! # Responsibilities
//! - Bind to configured address
//! - Accept incoming TCP connections until shutdown begins
//! - Enforce max_connections limit via semaphore
//! - Register every connection with the lifecycle registry
//! - Honour forced termination from the lifecycle manager
//!
//! The per-connection service is a line echo, standing in for the
//! application handlers the lifecycle manager protects.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::lifecycle::error::{ConnectionError, LifecycleError};
use crate::net::connection::{ConnectionGuard, ConnectionHandle, ConnectionRegistry};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept connections until shutdown begins, then drop the socket.
    ///
    /// Connections already accepted keep running; the lifecycle manager
    /// drains or force-closes them.
    pub async fn serve(self, registry: ConnectionRegistry) -> Result<(), ListenerError> {
        loop {
            let accepted = tokio::select! {
                _ = registry.shutdown_started() => break,
                accepted = self.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };

            let (kill_tx, kill_rx) = watch::channel(false);
            let handle = Arc::new(TcpConnection { peer, kill: kill_tx });

            let guard = match registry.register(handle) {
                Ok(guard) => guard,
                Err(LifecycleError::ShuttingDown) => {
                    tracing::debug!(peer_addr = %peer, "Refusing connection, shutting down");
                    break;
                }
                Err(e) => {
                    tracing::error!(peer_addr = %peer, error = %e, "Connection registration failed");
                    continue;
                }
            };

            tokio::spawn(handle_connection(stream, guard, kill_rx, permit));
        }

        tracing::info!("Listener stopped accepting connections");
        Ok(())
    }

    /// Accept a new connection, respecting the connection limit.
    async fn accept(&self) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit), ListenerError> {
        // Acquire permit first (backpressure). The semaphore is never closed.
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, permit))
    }
}

/// Lifecycle handle for an accepted TCP connection.
struct TcpConnection {
    peer: SocketAddr,
    kill: watch::Sender<bool>,
}

impl ConnectionHandle for TcpConnection {
    fn describe(&self) -> String {
        self.peer.to_string()
    }

    fn force_close(&self) -> Result<(), ConnectionError> {
        self.kill.send(true).map_err(|_| ConnectionError::AlreadyClosed)
    }
}

async fn killed(kill: &mut watch::Receiver<bool>) {
    // A dropped sender means the handle is gone; treat it as a kill.
    let _ = kill.wait_for(|killed| *killed).await;
}

/// Echo lines back until the peer hangs up or the connection is killed.
async fn handle_connection(
    stream: TcpStream,
    guard: ConnectionGuard,
    mut kill: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            _ = killed(&mut kill) => {
                tracing::debug!(connection_id = %guard.id(), "Connection terminated by lifecycle manager");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = writer.write_all(format!("{}\n", line).as_bytes()).await {
                        tracing::debug!(connection_id = %guard.id(), error = %e, "Write failed");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "Read failed");
                    break;
                }
            },
        }
    }

    let _ = writer.shutdown().await;
}
