//! TCP front of the gate.
//!
//! The accept loop waits at most `accept_poll` per iteration so a stop signal
//! is seen promptly with no traffic. Each accepted connection is served by
//! its own task: read one buffer, classify it, write the fixed response and
//! close. A slow or failing client only ever affects its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{GateError, Result};
use crate::metrics::{
    ACTIVE_CONNECTIONS, CONNECTION_ERRORS, REQUEST_LATENCY, REQUEST_TOTAL, STORE_ERRORS,
    record_outcome,
};
use crate::models::Outcome;
use crate::state::AppState;

/// Bytes read from a client as "the request".
pub const REQUEST_BUFFER_SIZE: usize = 1024;

const LISTEN_BACKLOG: u32 = 1024;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub accept_poll: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            accept_poll: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

pub struct GateServer {
    listener: TcpListener,
    state: Arc<AppState>,
    options: ServerOptions,
}

impl GateServer {
    /// Bind `addr` with address reuse enabled.
    pub async fn bind(addr: &str, state: Arc<AppState>, options: ServerOptions) -> Result<Self> {
        let bind_err = |source| GateError::Bind {
            addr: addr.to_string(),
            source,
        };

        let socket_addr = tokio::net::lookup_host(addr)
            .await
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| GateError::Config(format!("{addr} did not resolve")))?;

        let socket = match socket_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(socket_addr).map_err(bind_err)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        Ok(Self {
            listener,
            state,
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight connections.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();
        let abort = CancellationToken::new();

        info!(addr = %self.local_addr()?, store = self.state.store_kind(), "gate listening");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = timeout(self.options.accept_poll, self.listener.accept()) => accepted,
            };

            let (stream, peer) = match accepted {
                // nothing pending, poll again
                Err(_) => continue,
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };

            REQUEST_TOTAL.inc();
            let state = Arc::clone(&self.state);
            let abort = abort.clone();
            tracker.spawn(async move {
                tokio::select! {
                    _ = abort.cancelled() => {
                        debug!(%peer, "connection abandoned on shutdown");
                    }
                    _ = serve_connection(stream, peer, state) => {}
                }
            });
        }

        drop(self.listener);
        tracker.close();
        info!(in_flight = tracker.len(), "listener closed, draining connections");

        if timeout(self.options.shutdown_grace, tracker.wait()).await.is_err() {
            warn!(remaining = tracker.len(), "grace period over, abandoning connections");
            abort.cancel();
            tracker.wait().await;
        }

        info!("gate stopped");
        Ok(())
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, state: Arc<AppState>) {
    ACTIVE_CONNECTIONS.inc();
    let started = Instant::now();
    let client = peer.ip().to_canonical().to_string();

    match handle_connection(&mut stream, &client, &state).await {
        Ok(outcome) => {
            record_outcome(outcome);
            REQUEST_LATENCY.observe(started.elapsed().as_secs_f64());
            debug!(%peer, %outcome, "request served");
        }
        Err(GateError::Store(e)) => {
            STORE_ERRORS.inc();
            warn!(%peer, error = %e, "counter store failed, dropping connection");
        }
        Err(e) => {
            CONNECTION_ERRORS.inc();
            debug!(%peer, error = %e, "connection failed");
        }
    }

    ACTIVE_CONNECTIONS.dec();
}

/// Read one request, answer it and shut down the write side.
///
/// A client that closes without sending anything is answered like any other
/// token-less request.
pub async fn handle_connection<S>(stream: &mut S, client: &str, state: &AppState) -> Result<Outcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; REQUEST_BUFFER_SIZE];
    let read = timeout(state.io_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| GateError::Timeout("request read"))??;

    let outcome = state.classifier.classify(client, &buf[..read]).await?;

    let response = outcome.encode();
    timeout(state.io_timeout, async {
        stream.write_all(&response).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| GateError::Timeout("response write"))??;

    Ok(outcome)
}
