//! # Cluster Configuration
//!
//! Serde-serializable configuration for the three roles in the cluster. Each
//! config has sensible defaults matching the reference deployment, can be
//! loaded from a JSON file, and can be overridden from the environment.
//!
//! ## Environment Overrides
//!
//! | Variable | Applies to | Meaning |
//! |---|---|---|
//! | `WORKER_ADDR` / `WORKER_PORT` | worker | listen address, or port on `0.0.0.0` |
//! | `COORDINATOR_PORT` | coordinator | listen port on `0.0.0.0` |
//! | `COORDINATOR_ADDR` | service | coordinator dial address |
//! | `WORKER_ADDRS` | coordinator | comma-separated worker endpoint set |
//! | `CONNECT_TIMEOUT_MS` | coordinator, service | dial timeout |
//! | `READ_TIMEOUT_MS` | all | bound on reading a full message |

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{ClusterError, ClusterResult};

/// Worker endpoints of the reference eight-node deployment
pub const DEFAULT_WORKER_ADDRS: [&str; 8] = [
    "sdr_worker1:9000",
    "sdr_worker2:9000",
    "sdr_worker3:9000",
    "sdr_worker4:9000",
    "sdr_worker5:9000",
    "sdr_worker6:9000",
    "sdr_worker7:9000",
    "sdr_worker8:9000",
];

const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024;

/// Consistency checks run on every loaded config
pub trait Validate {
    fn validate(&self) -> ClusterResult<()>;
}

/// Limits applied when a server reads one request to end-of-stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadLimits {
    /// Upper bound on reading the full request, in milliseconds
    pub read_timeout_ms: u64,
    /// Requests larger than this abort the connection
    pub max_message_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            read_timeout_ms: 30_000,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ReadLimits {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Configuration for a worker node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub limits: ReadLimits,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            limits: ReadLimits::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> ClusterResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ClusterResult<()> {
        if let Some(addr) = lookup("WORKER_ADDR") {
            self.bind_addr = addr;
        } else if let Some(port) = lookup("WORKER_PORT") {
            self.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(ms) = lookup("READ_TIMEOUT_MS") {
            self.limits.read_timeout_ms = parse_millis("READ_TIMEOUT_MS", &ms)?;
        }
        Ok(())
    }

}

impl Validate for WorkerConfig {
    fn validate(&self) -> ClusterResult<()> {
        validate_limits(&self.limits)
    }
}

/// Configuration for the coordinator, including the worker endpoint set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub bind_addr: String,
    /// Static worker endpoint set; every recommendation task goes to all of them
    pub workers: Vec<String>,
    /// Dial timeout per worker, in milliseconds
    pub connect_timeout_ms: u64,
    /// Bound on one worker exchange after connecting, in milliseconds
    pub worker_read_timeout_ms: u64,
    /// Limits for requests arriving from the service layer
    #[serde(default)]
    pub limits: ReadLimits,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            workers: DEFAULT_WORKER_ADDRS.iter().map(|s| s.to_string()).collect(),
            connect_timeout_ms: 3_000,
            worker_read_timeout_ms: 30_000,
            limits: ReadLimits::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> ClusterResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ClusterResult<()> {
        if let Some(port) = lookup("COORDINATOR_PORT") {
            self.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(list) = lookup("WORKER_ADDRS") {
            self.workers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(ms) = lookup("CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_millis("CONNECT_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("READ_TIMEOUT_MS") {
            let ms = parse_millis("READ_TIMEOUT_MS", &ms)?;
            self.limits.read_timeout_ms = ms;
            self.worker_read_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn worker_read_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_read_timeout_ms)
    }
}

impl Validate for CoordinatorConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.workers.is_empty() {
            return Err(ClusterError::Config {
                message: "worker endpoint set is empty".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 || self.worker_read_timeout_ms == 0 {
            return Err(ClusterError::Config {
                message: "worker timeouts must be greater than zero".to_string(),
            });
        }
        validate_limits(&self.limits)
    }
}

/// Configuration for the recommendation service's side of the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub coordinator_addr: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Time-to-live for cached recommendation lists
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached recommendation lists
    pub cache_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: "coordinator:8081".to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 60_000,
            cache_ttl_seconds: 3_600, // 1 hour
            cache_capacity: 1_000,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> ClusterResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ClusterResult<()> {
        if let Some(addr) = lookup("COORDINATOR_ADDR") {
            self.coordinator_addr = addr;
        }
        if let Some(ms) = lookup("CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_millis("CONNECT_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("READ_TIMEOUT_MS") {
            self.read_timeout_ms = parse_millis("READ_TIMEOUT_MS", &ms)?;
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ClusterError::Config {
                message: "coordinator timeouts must be greater than zero".to_string(),
            });
        }
        if self.cache_capacity == 0 {
            return Err(ClusterError::Config {
                message: "cache capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load any of the config structs from a JSON file and validate it
pub fn load_from_file<T>(path: impl AsRef<Path>) -> ClusterResult<T>
where
    T: serde::de::DeserializeOwned + Validate,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ClusterError::Config {
        message: format!("Failed to read config file '{}': {}", path.display(), e),
    })?;

    let config: T = serde_json::from_str(&content).map_err(|e| ClusterError::Config {
        message: format!("Failed to parse config file '{}': {}", path.display(), e),
    })?;
    config.validate()?;
    Ok(config)
}

fn parse_millis(key: &str, raw: &str) -> ClusterResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| ClusterError::Config {
        message: format!("{} must be a non-negative integer, got '{}'", key, raw),
    })
}

fn validate_limits(limits: &ReadLimits) -> ClusterResult<()> {
    if limits.read_timeout_ms == 0 || limits.max_message_bytes == 0 {
        return Err(ClusterError::Config {
            message: "read timeout and max message size must be greater than zero".to_string(),
        });
    }
    Ok(())
}
