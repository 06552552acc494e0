//! Group dispatcher
//!
//! Turns a job description into a served group: parse the node list, size
//! the group, bind a coordinator for it and hand back a running handle.

use futures_util::future::{self, Either};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::common::stats::CoordinatorStats;
use crate::common::{Config, Error, Result};
use crate::coordinator::registry::{Group, GroupSpec};
use crate::coordinator::server::{CoordinatorServer, ServerHandle};

/// One entry of the job's node list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    /// Bare role name, one node
    Role(String),
    Counted {
        role: String,
        #[serde(default = "default_count")]
        count: u32,
    },
}

fn default_count() -> u32 {
    1
}

impl NodeSpec {
    pub fn role(&self) -> &str {
        match self {
            NodeSpec::Role(role) => role,
            NodeSpec::Counted { role, .. } => role,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            NodeSpec::Role(_) => 1,
            NodeSpec::Counted { count, .. } => *count,
        }
    }
}

/// Multi-node job description
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobDefinition {
    pub target_group: String,
    /// Overrides the configured port when set
    #[serde(default)]
    pub port: Option<u16>,
    pub nodes: Vec<NodeSpec>,
}

impl JobDefinition {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| Error::InvalidConfig(format!("invalid job definition: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read job file {}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    /// Nodes per role; repeated roles add up
    pub fn role_counts(&self) -> Result<BTreeMap<String, u32>> {
        let mut roles = BTreeMap::new();
        for node in &self.nodes {
            let count = roles.entry(node.role().to_string()).or_insert(0u32);
            *count = count.checked_add(node.count()).ok_or_else(|| {
                Error::InvalidConfig(format!("too many nodes for role '{}'", node.role()))
            })?;
        }
        Ok(roles)
    }

    pub fn expected_count(&self) -> Result<u32> {
        self.nodes.iter().try_fold(0u32, |total, node| {
            total.checked_add(node.count()).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "too many nodes in group '{}'",
                    self.target_group
                ))
            })
        })
    }

    pub fn group_spec(&self) -> Result<GroupSpec> {
        if self.nodes.iter().any(|n| n.role().is_empty()) {
            return Err(Error::InvalidConfig("node entry with empty role".into()));
        }
        GroupSpec::with_roles(self.target_group.clone(), self.role_counts()?)
    }
}

pub struct GroupDispatcher {
    job: JobDefinition,
    config: Config,
}

impl GroupDispatcher {
    pub fn new(job: JobDefinition, config: Config) -> Self {
        Self { job, config }
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    /// Address the coordinator will bind
    pub fn bind_addr(&self) -> String {
        let port = self.job.port.unwrap_or(self.config.port);
        format!("{}:{}", self.config.bind_host, port)
    }

    /// Create the group and start serving it
    pub async fn start(self) -> Result<DispatcherHandle> {
        let spec = self.job.group_spec()?;
        let expected = spec.expected_count();
        let group = Arc::new(Group::new(spec));
        let addr = self.bind_addr();

        let server = CoordinatorServer::bind(&addr, group, &self.config).await?;
        let server = server.spawn()?;
        tracing::info!(
            "Dispatching group '{}' ({} nodes) on {}",
            self.job.target_group,
            expected,
            server.local_addr()
        );

        Ok(DispatcherHandle { server })
    }
}

/// A dispatched group being served
pub struct DispatcherHandle {
    server: ServerHandle,
}

impl DispatcherHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn group(&self) -> &Arc<Group> {
        self.server.group()
    }

    pub fn stats(&self) -> &Arc<CoordinatorStats> {
        self.server.stats()
    }

    pub async fn stop(self) -> Result<()> {
        self.server.shutdown().await
    }

    /// Wait until the server exits on its own
    pub async fn wait(self) -> Result<()> {
        self.server.wait().await
    }

    /// Serve until Ctrl-C or until `timeout` elapses
    pub async fn run_until_interrupted(self, timeout: Option<Duration>) -> Result<()> {
        let deadline = match timeout {
            Some(d) => Either::Left(tokio::time::sleep(d)),
            None => Either::Right(future::pending::<()>()),
        };

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Interrupted, stopping coordinator");
            }
            _ = deadline => {
                tracing::info!("Timed out, stopping coordinator");
            }
        }

        self.stop().await
    }
}
