//! Node side of the rendezvous: a reconnecting client and its retry policy

pub mod client;
pub mod retry;

pub use client::{join, NodeClient, NodeIdentity, Rendezvous};
pub use retry::RetryPolicy;
