//! Coordinator status poller
//!
//! Speaks the rendezvous protocol against a dummy group so operators can
//! tell whether a coordinator is reachable and answering sanely. Problems
//! are collected as diagnostics instead of being raised; the worst one
//! decides the process exit code.

use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::common::utils::local_hostname;
use crate::common::Config;
use crate::protocol::{read_reply, write_frame, Reply, Request};

/// Client name used by probe requests
pub const POLLER_CLIENT: &str = "status-poller";

const POLLER_ROLE: &str = "poller";

/// Size announced for the dummy group; only the poller ever joins it
const PROBE_GROUP_SIZE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    /// Connection attempts per probe
    pub attempts: u32,
    /// Sleep after each failed connection attempt
    pub retry_delay: Duration,
    /// Bound on connect and on send+receive
    pub io_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay: Duration::from_secs(1),
            io_timeout: Duration::from_secs(5),
            max_frame_len: crate::protocol::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_frame_len: config.max_frame_len,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Clean = 0,
    Warning = 1,
    Error = 2,
}

/// Diagnostics gathered across all probes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PollReport {
    fn warn(&mut self, msg: String) {
        tracing::debug!("warning: {}", msg);
        self.warnings.push(msg);
    }

    fn error(&mut self, msg: String) {
        tracing::debug!("error: {}", msg);
        self.errors.push(msg);
    }

    pub fn severity(&self) -> Severity {
        if !self.errors.is_empty() {
            Severity::Error
        } else if !self.warnings.is_empty() {
            Severity::Warning
        } else {
            Severity::Clean
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.severity() as u8
    }

    pub fn is_clean(&self) -> bool {
        self.severity() == Severity::Clean
    }
}

impl From<&PollReport> for ExitCode {
    fn from(report: &PollReport) -> Self {
        ExitCode::from(report.exit_code())
    }
}

/// Probe the coordinator at `addr`: a `group_data` join, then a `clear_group`
pub async fn check(addr: &str, settings: &PollerSettings) -> PollReport {
    let mut report = PollReport::default();
    let group = Uuid::new_v4().to_string();
    let hostname = local_hostname();
    tracing::info!("Polling coordinator at {} with group {}", addr, group);

    let join = Request::group_data(&group, POLLER_CLIENT, POLLER_ROLE)
        .with_hostname(&hostname)
        .with_group_size(PROBE_GROUP_SIZE);
    if !probe(addr, &join, settings, &mut report).await {
        return report;
    }

    let clear = Request::clear_group(&group, POLLER_CLIENT, POLLER_ROLE).with_hostname(&hostname);
    probe(addr, &clear, settings, &mut report).await;

    report
}

/// Run one request; false when the coordinator could not be reached
async fn probe(addr: &str, request: &Request, settings: &PollerSettings, report: &mut PollReport) -> bool {
    let kind = &request.request;
    let Some(mut stream) = connect(addr, kind.as_str(), settings, report).await else {
        report.error(format!(
            "{}: cannot reach coordinator at {} after {} attempts",
            kind, addr, settings.attempts
        ));
        return false;
    };

    let exchange = tokio::time::timeout(settings.io_timeout, async {
        write_frame(&mut stream, request).await?;
        read_reply(&mut stream, settings.max_frame_len).await
    })
    .await;

    match exchange {
        Err(_) => report.warn(format!(
            "{}: no reply from {} within {:?}",
            kind, addr, settings.io_timeout
        )),
        Ok(Err(e)) => report.warn(format!("{}: {}", kind, e)),
        Ok(Ok(Reply::Waiting)) => tracing::debug!("{}: connection closed without data", kind),
        Ok(Ok(Reply::Snapshot(snapshot))) => report.warn(format!(
            "{}: coordinator returned data for dummy group '{}' with {} clients",
            kind,
            snapshot.group,
            snapshot.len()
        )),
    }
    true
}

async fn connect(
    addr: &str,
    kind: &str,
    settings: &PollerSettings,
    report: &mut PollReport,
) -> Option<TcpStream> {
    for attempt in 1..=settings.attempts {
        match tokio::time::timeout(settings.io_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if attempt > 1 {
                    report.warn(format!("{}: connected after {} attempts", kind, attempt));
                }
                return Some(stream);
            }
            Ok(Err(e)) => tracing::debug!(
                "{}: attempt {}/{} failed: {}",
                kind,
                attempt,
                settings.attempts,
                e
            ),
            Err(_) => tracing::debug!(
                "{}: attempt {}/{} timed out",
                kind,
                attempt,
                settings.attempts
            ),
        }
        tokio::time::sleep(settings.retry_delay).await;
    }
    None
}
