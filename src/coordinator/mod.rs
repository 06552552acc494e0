//! Coordinator side of the rendezvous
//!
//! - [`registry`]: group membership and the completion barrier
//! - [`server`]: TCP front end, one request per connection
//! - [`dispatcher`]: job description → served group

pub mod dispatcher;
pub mod registry;
pub mod server;

pub use dispatcher::{DispatcherHandle, GroupDispatcher, JobDefinition, NodeSpec};
pub use registry::{Group, GroupRegistry, GroupSpec, GroupStatus, Member, RegistryOutcome};
pub use server::{CoordinatorServer, ServerHandle};
