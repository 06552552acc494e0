//! Group membership and barrier release
//!
//! A [`Group`] is created from a [`GroupSpec`] before any node connects and
//! lives as long as the coordinator process. Every registration runs under
//! the group's mutex, so deciding "the group just became complete" and
//! building the snapshot happen in the same critical section.
//!
//! Once complete, the snapshot is latched: members named in it keep
//! receiving the same value on every later `group_data`, even after peers
//! have departed with `complete`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::common::utils::validate_name;
use crate::common::{Error, Result};
use crate::protocol::{GroupSnapshot, Request, RequestKind};

/// Static description of a group, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    name: String,
    expected_count: u32,
    /// Per-role capacity; empty when roles are not constrained
    roles: BTreeMap<String, u32>,
}

impl GroupSpec {
    /// A group of `expected_count` nodes with any roles
    pub fn new(name: impl Into<String>, expected_count: u32) -> Result<Self> {
        let name = name.into();
        validate_name("group_name", &name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if expected_count < 2 {
            return Err(Error::InvalidConfig(format!(
                "group '{}' needs at least 2 nodes, got {}",
                name, expected_count
            )));
        }
        Ok(Self {
            name,
            expected_count,
            roles: BTreeMap::new(),
        })
    }

    /// A group whose size is the sum of its per-role counts
    pub fn with_roles(name: impl Into<String>, roles: BTreeMap<String, u32>) -> Result<Self> {
        if let Some((role, _)) = roles.iter().find(|(_, count)| **count == 0) {
            return Err(Error::InvalidConfig(format!(
                "role '{}' declares zero nodes",
                role
            )));
        }
        let total = roles
            .values()
            .try_fold(0u32, |total, count| total.checked_add(*count))
            .ok_or_else(|| Error::InvalidConfig("too many nodes in group".into()))?;
        let mut spec = Self::new(name, total)?;
        spec.roles = roles;
        Ok(spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected_count(&self) -> u32 {
        self.expected_count
    }

    pub fn roles(&self) -> &BTreeMap<String, u32> {
        &self.roles
    }
}

/// One node that has reported in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub last_request: RequestKind,
    pub role: String,
    pub hostname: String,
}

/// Result of one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOutcome {
    /// Group incomplete; the connection is closed without a reply
    Waiting,
    /// Barrier satisfied; the snapshot is sent to the caller
    Complete(GroupSnapshot),
    /// Member left via `complete`
    Departed { remaining: usize },
    /// Member left via `clear_group`; `reset` when that emptied a completed group
    Cleared { reset: bool },
}

/// Read-only view for logs and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub name: String,
    pub expected_count: u32,
    pub joined: usize,
    pub complete: bool,
    /// role → member names
    pub roles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct GroupState {
    members: BTreeMap<String, Member>,
    latched: Option<GroupSnapshot>,
}

/// A single group's membership, guarded by its own lock
#[derive(Debug)]
pub struct Group {
    spec: GroupSpec,
    state: Mutex<GroupState>,
}

impl Group {
    pub fn new(spec: GroupSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(GroupState::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    // The state is left consistent at every early return, so a panic
    // elsewhere while holding the lock does not invalidate it.
    fn state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one request to the group.
    ///
    /// Rejected requests (`ProtocolError`) never mutate the group.
    pub fn register(&self, request: &Request) -> Result<RegistryOutcome> {
        validate_name("client_name", &request.client_name)?;
        if request.group_name != self.spec.name {
            return Err(Error::WrongGroup {
                requested: request.group_name.clone(),
                served: self.spec.name.clone(),
            });
        }
        if let Some(size) = request.group_size {
            if size != self.spec.expected_count {
                return Err(Error::Protocol(format!(
                    "'{}' declares group size {} but group '{}' expects {}",
                    request.client_name, size, self.spec.name, self.spec.expected_count
                )));
            }
        }

        match &request.request {
            RequestKind::GroupData => self.join(request),
            RequestKind::Complete => Ok(self.depart(&request.client_name)),
            RequestKind::ClearGroup => Ok(self.clear(&request.client_name)),
            RequestKind::Unknown(other) => Err(Error::Protocol(format!(
                "unrecognised request '{}' from '{}'",
                other, request.client_name
            ))),
        }
    }

    /// Register `client_name` with the given request type and role
    pub fn register_client(
        &self,
        client_name: &str,
        request: RequestKind,
        role: &str,
    ) -> Result<RegistryOutcome> {
        let request = Request::new(request, self.spec.name.clone(), client_name, role);
        self.register(&request)
    }

    fn join(&self, request: &Request) -> Result<RegistryOutcome> {
        let client_name = &request.client_name;
        let mut state = self.state();

        if let Some(snapshot) = state.latched.clone() {
            if !snapshot.contains(client_name) {
                return Err(Error::Protocol(format!(
                    "group '{}' is already complete with {} members; refusing '{}'",
                    self.spec.name,
                    snapshot.len(),
                    client_name
                )));
            }
            if let Some(member) = state.members.get_mut(client_name) {
                member.last_request = RequestKind::GroupData;
            }
            return Ok(RegistryOutcome::Complete(snapshot));
        }

        if let Some(member) = state.members.get_mut(client_name) {
            if !request.role.is_empty() && member.role != request.role {
                tracing::debug!(
                    "'{}' re-registered as '{}', keeping role '{}'",
                    client_name,
                    request.role,
                    member.role
                );
            }
            member.last_request = RequestKind::GroupData;
            if !request.hostname.is_empty() {
                member.hostname = request.hostname.clone();
            }
            return Ok(RegistryOutcome::Waiting);
        }

        if state.members.len() >= self.spec.expected_count as usize {
            return Err(Error::Protocol(format!(
                "group '{}' is full ({} members); refusing '{}'",
                self.spec.name, self.spec.expected_count, client_name
            )));
        }
        self.check_role_capacity(&state, &request.role, client_name)?;

        state.members.insert(
            client_name.clone(),
            Member {
                last_request: RequestKind::GroupData,
                role: request.role.clone(),
                hostname: request.hostname.clone(),
            },
        );

        if state.members.len() == self.spec.expected_count as usize {
            let snapshot = GroupSnapshot {
                group: self.spec.name.clone(),
                count: self.spec.expected_count,
                clients: state
                    .members
                    .iter()
                    .map(|(name, member)| (name.clone(), member.last_request.to_string()))
                    .collect(),
            };
            tracing::info!(
                "Group '{}' complete with {} members",
                self.spec.name,
                snapshot.len()
            );
            state.latched = Some(snapshot.clone());
            return Ok(RegistryOutcome::Complete(snapshot));
        }

        Ok(RegistryOutcome::Waiting)
    }

    fn check_role_capacity(&self, state: &GroupState, role: &str, client_name: &str) -> Result<()> {
        if self.spec.roles.is_empty() {
            return Ok(());
        }
        let capacity = self.spec.roles.get(role).copied().ok_or_else(|| {
            Error::Protocol(format!(
                "'{}' declares role '{}' which group '{}' does not have",
                client_name, role, self.spec.name
            ))
        })?;
        let taken = state.members.values().filter(|m| m.role == role).count();
        if taken >= capacity as usize {
            return Err(Error::Protocol(format!(
                "role '{}' in group '{}' already has {} members; refusing '{}'",
                role, self.spec.name, capacity, client_name
            )));
        }
        Ok(())
    }

    fn depart(&self, client_name: &str) -> RegistryOutcome {
        let mut state = self.state();
        if state.members.remove(client_name).is_none() {
            tracing::debug!(
                "'{}' sent complete but is not a member of '{}'",
                client_name,
                self.spec.name
            );
        }
        RegistryOutcome::Departed {
            remaining: state.members.len(),
        }
    }

    fn clear(&self, client_name: &str) -> RegistryOutcome {
        let mut state = self.state();
        state.members.remove(client_name);
        let reset = state.latched.is_some() && state.members.is_empty();
        if reset {
            tracing::info!("Clearing group data for '{}'", self.spec.name);
            state.latched = None;
        }
        RegistryOutcome::Cleared { reset }
    }

    /// Number of members currently registered
    pub fn joined(&self) -> usize {
        self.state().members.len()
    }

    pub fn is_complete(&self) -> bool {
        self.state().latched.is_some()
    }

    /// The latched snapshot, if the barrier has been released
    pub fn snapshot(&self) -> Option<GroupSnapshot> {
        self.state().latched.clone()
    }

    pub fn member(&self, client_name: &str) -> Option<Member> {
        self.state().members.get(client_name).cloned()
    }

    pub fn status(&self) -> GroupStatus {
        let state = self.state();
        let mut roles: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, member) in &state.members {
            roles
                .entry(member.role.clone())
                .or_default()
                .push(name.clone());
        }
        GroupStatus {
            name: self.spec.name.clone(),
            expected_count: self.spec.expected_count,
            joined: state.members.len(),
            complete: state.latched.is_some(),
            roles,
        }
    }
}

/// All groups known to one process, each independently locked
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group; names are unique for the registry's lifetime
    pub fn create(&self, spec: GroupSpec) -> Result<Arc<Group>> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        if groups.contains_key(spec.name()) {
            return Err(Error::InvalidConfig(format!(
                "group '{}' already exists",
                spec.name()
            )));
        }
        tracing::info!(
            "The {} group will contain {} nodes",
            spec.name(),
            spec.expected_count()
        );
        let group = Arc::new(Group::new(spec));
        groups.insert(group.name().to_string(), group.clone());
        Ok(group)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Group names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route a request to its group
    pub fn register(&self, request: &Request) -> Result<RegistryOutcome> {
        let group = self.get(&request.group_name).ok_or_else(|| Error::WrongGroup {
            requested: request.group_name.clone(),
            served: self.names().join(","),
        })?;
        group.register(request)
    }
}
