//! Node-side rendezvous client
//!
//! Each attempt opens a fresh connection, sends one `group_data` request and
//! reads until the coordinator closes. An empty close means the group is not
//! complete yet; the client backs off and tries again until the policy's
//! attempt or time budget runs out.

use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::common::utils::local_hostname;
use crate::common::{Config, Error, Result};
use crate::node::retry::RetryPolicy;
use crate::protocol::{read_reply, write_frame, GroupSnapshot, Reply, Request, RequestKind};

/// Bound on a single connect/send/receive cycle
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Who this node is within its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub group: String,
    pub client: String,
    pub role: String,
    pub hostname: String,
}

/// Successful rendezvous
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendezvous {
    pub snapshot: GroupSnapshot,
    /// Connections made, including the one that returned the snapshot
    pub attempts: u32,
}

enum State {
    Attempt,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct NodeClient {
    identity: NodeIdentity,
    coordinator: String,
    policy: RetryPolicy,
    max_frame_len: usize,
    io_timeout: Duration,
    group_size: Option<u32>,
}

impl NodeClient {
    pub fn new(
        group: impl Into<String>,
        client: impl Into<String>,
        role: impl Into<String>,
        coordinator: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            identity: NodeIdentity {
                group: group.into(),
                client: client.into(),
                role: role.into(),
                hostname: local_hostname(),
            },
            coordinator: coordinator.into(),
            policy,
            max_frame_len: crate::protocol::DEFAULT_MAX_FRAME_LEN,
            io_timeout: DEFAULT_IO_TIMEOUT,
            group_size: None,
        }
    }

    /// Client for the coordinator named in `config`
    pub fn from_config(
        group: impl Into<String>,
        client: impl Into<String>,
        role: impl Into<String>,
        config: &Config,
    ) -> Self {
        let mut node = Self::new(
            group,
            client,
            role,
            config.coordinator_addr(),
            RetryPolicy::from_config(config),
        );
        node.max_frame_len = config.max_frame_len;
        node
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.identity.hostname = hostname.into();
        self
    }

    pub fn with_coordinator(mut self, coordinator: impl Into<String>) -> Self {
        self.coordinator = coordinator.into();
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Declare the group size so the coordinator can reject a mismatch
    pub fn with_group_size(mut self, size: u32) -> Self {
        self.group_size = Some(size);
        self
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    fn request(&self, kind: RequestKind) -> Request {
        let mut request = Request::new(
            kind,
            self.identity.group.clone(),
            self.identity.client.clone(),
            self.identity.role.clone(),
        )
        .with_hostname(self.identity.hostname.clone());
        request.group_size = self.group_size;
        request
    }

    /// Block until the group is complete and return its snapshot
    pub async fn join(&self) -> Result<Rendezvous> {
        let started = Instant::now();
        let request = self.request(RequestKind::GroupData);
        let mut attempts = 0u32;
        let mut state = State::Attempt;

        tracing::info!(
            "Joining group '{}' as '{}' via {}",
            self.identity.group,
            self.identity.client,
            self.coordinator
        );

        loop {
            state = match state {
                State::Attempt => {
                    attempts += 1;
                    match self.exchange(&request, started).await {
                        Ok(Reply::Snapshot(snapshot)) => {
                            self.validate(&snapshot)?;
                            tracing::info!(
                                "Group '{}' complete after {} attempts",
                                self.identity.group,
                                attempts
                            );
                            return Ok(Rendezvous { snapshot, attempts });
                        }
                        Ok(Reply::Waiting) => {
                            tracing::debug!(
                                "Group '{}' not ready (attempt {})",
                                self.identity.group,
                                attempts
                            );
                            State::Backoff
                        }
                        Err(e) if e.is_retryable() => {
                            tracing::warn!("Attempt {} failed: {}", attempts, e);
                            State::Backoff
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Backoff => {
                    if !self.policy.allows_attempt(attempts + 1, started) {
                        return Err(Error::RendezvousTimeout {
                            group: self.identity.group.clone(),
                            attempts,
                            elapsed: started.elapsed(),
                        });
                    }
                    let mut delay = self.policy.delay_for_attempt(attempts);
                    if let Some(remaining) = self.policy.remaining(started) {
                        delay = delay.min(remaining);
                    }
                    tokio::time::sleep(delay).await;
                    State::Attempt
                }
            };
        }
    }

    /// Connect, send the request and read the reply, within one timeout
    async fn exchange(&self, request: &Request, started: Instant) -> Result<Reply> {
        let budget = match self.policy.remaining(started) {
            Some(remaining) if !remaining.is_zero() => remaining.min(self.io_timeout),
            _ => self.io_timeout,
        };

        tokio::time::timeout(budget, async {
            let mut stream = self.connect().await?;
            write_frame(&mut stream, request).await?;
            read_reply(&mut stream, self.max_frame_len).await
        })
        .await
        .map_err(|_| {
            Error::ConnectionFailed(format!(
                "no reply from {} within {:?}",
                self.coordinator, budget
            ))
        })?
    }

    async fn connect(&self) -> Result<TcpStream> {
        TcpStream::connect(&self.coordinator).await.map_err(|e| {
            Error::ConnectionFailed(format!("cannot connect to {}: {}", self.coordinator, e))
        })
    }

    fn validate(&self, snapshot: &GroupSnapshot) -> Result<()> {
        if snapshot.group != self.identity.group {
            return Err(Error::Protocol(format!(
                "received data for group '{}' while joining '{}'",
                snapshot.group, self.identity.group
            )));
        }
        if !snapshot.contains(&self.identity.client) {
            return Err(Error::Protocol(format!(
                "group '{}' completed without '{}'",
                snapshot.group, self.identity.client
            )));
        }
        Ok(())
    }

    /// Leave the group after consuming the snapshot (single attempt)
    pub async fn complete(&self) -> Result<()> {
        self.notify(RequestKind::Complete).await
    }

    /// Leave the group at the end of the job (single attempt)
    pub async fn clear(&self) -> Result<()> {
        self.notify(RequestKind::ClearGroup).await
    }

    async fn notify(&self, kind: RequestKind) -> Result<()> {
        let request = self.request(kind);
        let result = tokio::time::timeout(self.io_timeout, async {
            let mut stream = self.connect().await?;
            write_frame(&mut stream, &request).await?;
            // the coordinator answers departures by closing
            let mut sink = Vec::new();
            stream.read_to_end(&mut sink).await?;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_or_else(|_| {
            Err(Error::ConnectionFailed(format!(
                "no response from {} within {:?}",
                self.coordinator, self.io_timeout
            )))
        });

        if let Err(e) = &result {
            tracing::warn!(
                "'{}' could not send {} for group '{}': {}",
                self.identity.client,
                request.request,
                self.identity.group,
                e
            );
        }
        result
    }
}

/// Join `group` as `client` and return the completed snapshot
pub async fn join(
    group: &str,
    client: &str,
    role: &str,
    coordinator: &str,
    policy: RetryPolicy,
) -> Result<GroupSnapshot> {
    NodeClient::new(group, client, role, coordinator, policy)
        .join()
        .await
        .map(|rendezvous| rendezvous.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, read_frame};
    use std::collections::BTreeMap;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn snapshot(group: &str, names: &[&str]) -> GroupSnapshot {
        GroupSnapshot {
            group: group.to_string(),
            count: names.len() as u32,
            clients: names
                .iter()
                .map(|n| (n.to_string(), "group_data".to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Closes `waits` connections silently, then answers every request with `reply`
    async fn fake_coordinator(waits: usize, reply: GroupSnapshot) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut served = 0;
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut stream = BufReader::new(stream);
                let request: Option<Request> = read_frame(&mut stream, 1024).await.unwrap();
                assert_eq!(request.unwrap().request, RequestKind::GroupData);
                if served >= waits {
                    let frame = encode(&reply).unwrap();
                    stream.get_mut().write_all(&frame).await.unwrap();
                }
                served += 1;
            }
        });
        addr
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(20)
    }

    #[tokio::test]
    async fn test_join_counts_attempts() {
        let addr = fake_coordinator(3, snapshot("g1", &["A", "B"])).await;
        let client = NodeClient::new("g1", "A", "tester", addr, policy());

        let rendezvous = client.join().await.unwrap();
        assert_eq!(rendezvous.attempts, 4);
        assert_eq!(rendezvous.snapshot, snapshot("g1", &["A", "B"]));
    }

    #[tokio::test]
    async fn test_join_rejects_snapshot_without_self() {
        let addr = fake_coordinator(0, snapshot("g1", &["B", "C"])).await;
        let client = NodeClient::new("g1", "A", "tester", addr, policy());
        assert!(matches!(client.join().await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_join_rejects_foreign_group() {
        let addr = fake_coordinator(0, snapshot("g2", &["A", "B"])).await;
        let snapshot = join("g1", "A", "tester", &addr, policy()).await;
        assert!(matches!(snapshot, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_join_unreachable_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let policy = RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(3);
        let client = NodeClient::new("g1", "A", "tester", addr, policy);
        match client.join().await {
            Err(Error::RendezvousTimeout { group, attempts, .. }) => {
                assert_eq!(group, "g1");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_respects_deadline() {
        // never completes
        let addr = fake_coordinator(usize::MAX, snapshot("g1", &["A", "B"])).await;
        let policy = RetryPolicy::fixed(Duration::from_millis(20)).with_deadline(Duration::from_millis(200));
        let client = NodeClient::new("g1", "A", "tester", addr, policy);

        let started = Instant::now();
        assert!(matches!(
            client.join().await,
            Err(Error::RendezvousTimeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_request_carries_identity() {
        let client = NodeClient::new("g1", "A", "server", "127.0.0.1:1", policy())
            .with_hostname("dut-1")
            .with_group_size(2);
        let request = client.request(RequestKind::GroupData);
        assert_eq!(request.group_name, "g1");
        assert_eq!(request.client_name, "A");
        assert_eq!(request.role, "server");
        assert_eq!(request.hostname, "dut-1");
        assert_eq!(request.group_size, Some(2));
    }
}
