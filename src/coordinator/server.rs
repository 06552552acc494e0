//! Coordinator server
//!
//! One TCP connection carries one request. The handler reads a single
//! frame, applies it to the group and either writes the snapshot or closes
//! without writing anything. Connections run on their own tasks; the group
//! lock serialises membership changes.

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::stats::CoordinatorStats;
use crate::common::utils::retry_with_backoff;
use crate::common::{Config, Error, Result};
use crate::coordinator::registry::{Group, RegistryOutcome};
use crate::protocol::{read_frame, write_frame, Request};

pub struct CoordinatorServer {
    listener: TcpListener,
    group: Arc<Group>,
    stats: Arc<CoordinatorStats>,
    blocksize: usize,
    max_frame_len: usize,
    read_timeout: Duration,
}

impl CoordinatorServer {
    /// Bind the listening socket, retrying with a doubling delay
    pub async fn bind(addr: &str, group: Arc<Group>, config: &Config) -> Result<Self> {
        let retries = config.bind_retries.max(1) as usize;
        let listener = retry_with_backoff(
            || async move {
                TcpListener::bind(addr).await.map_err(|e| {
                    Error::ConnectionFailed(format!("failed to bind {}: {}", addr, e))
                })
            },
            retries,
            Duration::from_secs(1),
        )
        .await?;

        Ok(Self {
            listener,
            group,
            stats: Arc::new(CoordinatorStats::new()),
            blocksize: config.blocksize,
            max_frame_len: config.max_frame_len,
            read_timeout: config.read_timeout(),
        })
    }

    /// Deadline for a connected peer to deliver its request
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    pub fn stats(&self) -> Arc<CoordinatorStats> {
        self.stats.clone()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        tracing::info!(
            "Coordinator for group '{}' listening on {}",
            self.group.name(),
            addr
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
            }
        }

        tracing::info!("Coordinator for group '{}' stopping", self.group.name());
        self.stats.log_summary();
        Ok(())
    }

    /// Run the accept loop on a background task
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let stats = self.stats.clone();
        let group = self.group.clone();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(self.serve_until(async move {
            let _ = rx.await;
        }));

        Ok(ServerHandle {
            addr,
            stats,
            group,
            shutdown: Some(tx),
            task,
        })
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        self.stats.connections.inc();
        let group = self.group.clone();
        let stats = self.stats.clone();
        let blocksize = self.blocksize;
        let limits = Limits {
            max_frame_len: self.max_frame_len,
            read_timeout: self.read_timeout,
        };

        tokio::spawn(async move {
            stats.active_connections.inc();
            handle_connection(stream, peer, &group, &stats, blocksize, limits).await;
            stats.active_connections.dec();
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_frame_len: usize,
    read_timeout: Duration,
}

/// Serve one connection; it is closed when the stream drops at the end
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    group: &Group,
    stats: &CoordinatorStats,
    blocksize: usize,
    limits: Limits,
) {
    let mut stream = BufReader::with_capacity(blocksize, stream);

    if let Err(e) = process(&mut stream, group, stats, limits).await {
        stats.record_error(&e);
        match e {
            // status pollers probe with a throwaway group name
            Error::WrongGroup { .. } => tracing::debug!("Rejected request from {}: {}", peer, e),
            Error::Protocol(_) | Error::Framing(_) | Error::Payload(_) => {
                tracing::warn!("Rejected request from {}: {}", peer, e)
            }
            _ => tracing::debug!("Connection from {} failed: {}", peer, e),
        }
    }
}

async fn process(
    stream: &mut BufReader<TcpStream>,
    group: &Group,
    stats: &CoordinatorStats,
    limits: Limits,
) -> Result<()> {
    let frame = tokio::time::timeout(
        limits.read_timeout,
        read_frame::<_, Value>(stream, limits.max_frame_len),
    )
    .await
    .map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no request within {:?}", limits.read_timeout),
        ))
    })?;
    let Some(value) = frame? else {
        tracing::debug!("Connection closed before any request");
        return Ok(());
    };
    let request = Request::from_value(value)?;
    tracing::debug!(
        "{} request from '{}' for group '{}'",
        request.request,
        request.client_name,
        request.group_name
    );

    match group.register(&request)? {
        RegistryOutcome::Waiting => {
            stats.waits.inc();
            tracing::debug!(
                "Group '{}' not ready, closing connection to '{}'",
                group.name(),
                request.client_name
            );
        }
        RegistryOutcome::Complete(snapshot) => {
            stats.completions.inc();
            write_frame(stream.get_mut(), &snapshot).await?;
            tracing::debug!("Sent group data to '{}'", request.client_name);
        }
        RegistryOutcome::Departed { remaining } => {
            stats.departures.inc();
            tracing::info!(
                "'{}' completed, {} members remain in '{}'",
                request.client_name,
                remaining,
                group.name()
            );
        }
        RegistryOutcome::Cleared { reset } => {
            stats.departures.inc();
            tracing::debug!("'{}' cleared (reset: {})", request.client_name, reset);
        }
    }

    Ok(())
}

/// Running server
pub struct ServerHandle {
    addr: SocketAddr,
    stats: Arc<CoordinatorStats>,
    group: Arc<Group>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stats(&self) -> &Arc<CoordinatorStats> {
        &self.stats
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    /// Stop accepting; in-flight connections finish on their own
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }

    /// Wait for the accept loop to exit
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("server task failed: {}", e)))?
    }
}
