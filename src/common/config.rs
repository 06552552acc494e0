//! Configuration for nodesync components
//!
//! Coordinator, node clients and the status poller read the same file so
//! that every participant agrees on port and host. Sources are layered:
//! built-in defaults, then the TOML file, then `NODESYNC_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{Error, Result};

/// Default coordinator port
pub const DEFAULT_PORT: u16 = 3079;

/// Default location of the shared configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nodesync/coordinator.toml";

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "NODESYNC_CONFIG";

/// Prefix for per-key environment overrides (`NODESYNC_PORT`, ...)
pub const ENV_PREFIX: &str = "NODESYNC";

/// Global configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the coordinator listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host node clients connect to
    #[serde(default = "default_coordinator_hostname")]
    pub coordinator_hostname: String,

    /// Interface the coordinator binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Read buffer size; framing lengths are explicit so this only tunes I/O
    #[serde(default = "default_blocksize")]
    pub blocksize: usize,

    /// Initial delay between rendezvous attempts
    #[serde(default = "default_poll_delay")]
    pub poll_delay_secs: u64,

    /// Upper bound for the backoff delay
    #[serde(default = "default_max_poll_delay")]
    pub max_poll_delay_secs: u64,

    /// Overall deadline for a node to see its group complete
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,

    /// Largest frame body accepted from the wire
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// How long the coordinator waits for a connected peer to send its request
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Bind attempts before the coordinator gives up
    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_coordinator_hostname() -> String {
    "localhost".to_string()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_blocksize() -> usize {
    4 * 1024
}
fn default_poll_delay() -> u64 {
    1
}
fn default_max_poll_delay() -> u64 {
    30
}
fn default_join_timeout() -> u64 {
    300
}
fn default_max_frame_len() -> usize {
    1024 * 1024
}
fn default_read_timeout() -> u64 {
    30
}
fn default_bind_retries() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            coordinator_hostname: default_coordinator_hostname(),
            bind_host: default_bind_host(),
            blocksize: default_blocksize(),
            poll_delay_secs: default_poll_delay(),
            max_poll_delay_secs: default_max_poll_delay(),
            join_timeout_secs: default_join_timeout(),
            max_frame_len: default_max_frame_len(),
            read_timeout_secs: default_read_timeout(),
            bind_retries: default_bind_retries(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// `NODESYNC_CONFIG` overrides the path. A missing file yields defaults
    /// (still subject to environment overrides).
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        if self.blocksize == 0 {
            return Err(Error::InvalidConfig("blocksize must be non-zero".into()));
        }
        if self.coordinator_hostname.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "coordinator_hostname cannot be empty".into(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(Error::InvalidConfig("read_timeout_secs must be non-zero".into()));
        }
        if self.max_frame_len == 0 {
            return Err(Error::InvalidConfig("max_frame_len must be non-zero".into()));
        }
        Ok(())
    }

    /// Address node clients dial
    pub fn coordinator_addr(&self) -> String {
        format!("{}:{}", self.coordinator_hostname, self.port)
    }

    /// Address the coordinator binds
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    pub fn max_poll_delay(&self) -> Duration {
        Duration::from_secs(self.max_poll_delay_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
