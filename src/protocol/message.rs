//! Registration requests and group snapshots

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::protocol::frame::read_frame;

/// Request type carried in the `request` field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Join the group, or poll until it is complete
    GroupData,
    /// Graceful departure after consuming the snapshot
    Complete,
    /// End-of-job departure; resets the group once every member cleared
    ClearGroup,
    /// Anything else. Decodes fine but is rejected by the coordinator.
    Unknown(String),
}

impl RequestKind {
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::GroupData => "group_data",
            RequestKind::Complete => "complete",
            RequestKind::ClearGroup => "clear_group",
            RequestKind::Unknown(other) => other,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "group_data" => RequestKind::GroupData,
            "complete" => RequestKind::Complete,
            "clear_group" => RequestKind::ClearGroup,
            other => RequestKind::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for RequestKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequestKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RequestKind::parse(&s))
    }
}

/// Registration request sent by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub group_name: String,
    pub client_name: String,
    pub request: RequestKind,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub role: String,
    /// Always `null` for the rendezvous requests
    #[serde(default)]
    pub message: Option<Value>,
    /// Group size as declared by the node, checked against the served group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<u32>,
}

impl Request {
    pub fn new(
        request: RequestKind,
        group_name: impl Into<String>,
        client_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            client_name: client_name.into(),
            request,
            hostname: String::new(),
            role: role.into(),
            message: None,
            group_size: None,
        }
    }

    pub fn group_data(
        group_name: impl Into<String>,
        client_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self::new(RequestKind::GroupData, group_name, client_name, role)
    }

    pub fn complete(
        group_name: impl Into<String>,
        client_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self::new(RequestKind::Complete, group_name, client_name, role)
    }

    pub fn clear_group(
        group_name: impl Into<String>,
        client_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self::new(RequestKind::ClearGroup, group_name, client_name, role)
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_group_size(mut self, size: u32) -> Self {
        self.group_size = Some(size);
        self
    }

    /// Interpret a decoded frame as a request.
    ///
    /// Missing or non-string identity fields are protocol errors, not
    /// payload errors: the JSON itself was fine.
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Protocol("request must be a JSON object".into()))?;

        for field in ["group_name", "client_name", "request"] {
            match obj.get(field) {
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(Error::Protocol(format!("'{}' must be a string", field)))
                }
                None => return Err(Error::Protocol(format!("missing '{}' in request", field))),
            }
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed request: {}", e)))
    }
}

/// Consolidated group payload delivered once the barrier is satisfied.
///
/// Serializes exactly as the success reply:
/// `{"group": .., "count": .., "clients": {name: last_request}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group: String,
    pub count: u32,
    pub clients: BTreeMap<String, String>,
}

impl GroupSnapshot {
    pub fn contains(&self, client_name: &str) -> bool {
        self.clients.contains_key(client_name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

/// What the coordinator answered to one `group_data`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Closed without writing: the group is not complete yet
    Waiting,
    Snapshot(GroupSnapshot),
}

impl Reply {
    /// Interpret a decoded reply frame.
    ///
    /// `{"response": "wait"}` is accepted as an explicit wait signal from
    /// older coordinators.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("response").and_then(Value::as_str) == Some("wait") {
            return Ok(Reply::Waiting);
        }
        serde_json::from_value(value)
            .map(Reply::Snapshot)
            .map_err(|e| Error::Protocol(format!("unexpected reply: {}", e)))
    }
}

/// Read the coordinator's reply; an empty close is [`Reply::Waiting`]
pub async fn read_reply<R>(reader: &mut R, max_len: usize) -> Result<Reply>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match read_frame::<_, Value>(reader, max_len).await? {
        Some(value) => Reply::from_value(value),
        None => Ok(Reply::Waiting),
    }
}
