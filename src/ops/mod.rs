//! Operational tooling

pub mod poller;

pub use poller::{check, PollReport, PollerSettings, Severity};
