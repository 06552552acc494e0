//! # nodesync
//!
//! Rendezvous coordination for multi-node test jobs:
//! - A coordinator that tracks group membership and releases a barrier
//!   once every expected node has reported in
//! - A length-prefixed JSON wire protocol shared by every participant
//! - A reconnecting node client with a bounded retry budget
//! - A status poller for operational health checks
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │         Coordinator (one group)          │
//! │   - Registry: members, barrier, latch    │
//! │   - One task per connection              │
//! └───────────┬──────────────────────────────┘
//!             │ TCP, one request per connection
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼──────────┐
//! │ Node A     │   │ Node B     │   │ Poller       │
//! │ group_data │   │ group_data │   │ dummy group  │
//! │ + retry    │   │ + retry    │   │ exit 0/1/2   │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Serve a group
//! ```bash
//! nodesync-coord serve --job ./job.json
//! ```
//!
//! ### Join from each node
//! ```bash
//! nodesync join --group g1 --client node-a --role server
//! nodesync complete --group g1 --client node-a --role server
//! ```
//!
//! ### Check the coordinator
//! ```bash
//! nodesync-poller; echo $?
//! ```

pub mod common;
pub mod coordinator;
pub mod node;
pub mod ops;
pub mod protocol;

pub use common::{Config, Error, Result};
pub use coordinator::{CoordinatorServer, GroupDispatcher, GroupRegistry, JobDefinition};
pub use node::{NodeClient, RetryPolicy};
pub use protocol::{GroupSnapshot, Request, RequestKind};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
