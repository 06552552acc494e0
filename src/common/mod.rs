//! Common utilities and types shared across nodesync

pub mod config;
pub mod error;
pub mod stats;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use utils::{local_hostname, parse_duration, validate_name};
