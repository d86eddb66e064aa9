use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the receiver.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    /// The --log-level CLI flag overrides this.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared UDP/TCP ingest port. Default: 8125.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base directory for historical datapoint files.
    #[serde(default)]
    pub root: PathBuf,

    /// Ordered aggregation intervals in seconds. Index 0 is the primary
    /// retention whose output goes to the recent-values store.
    #[serde(default = "default_retentions")]
    pub retentions: Vec<u64>,

    /// Dispatcher pool configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Redis connection configuration (recent-values and name-registry
    /// stores).
    #[serde(default)]
    pub redis: RedisConfig,

    /// Operational metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,

    /// Heartbeat period driving all aggregation flushes. Default: 1s.
    /// Slot counts are `interval / heartbeat`.
    #[serde(default = "default_heartbeat", with = "humantime_serde")]
    pub heartbeat: Duration,
}

/// Dispatcher pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Number of line-parsing workers. Default: 100.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the ingest and per-datatype queues. Producers block when
    /// a queue is full. Default: 10000.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis host. Default: "127.0.0.1".
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Redis port. Default: 6379.
    #[serde(default = "default_redis_port")]
    pub port: u16,
}

/// Operational metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address. Default: ":9090". A bare ":port" binds all
    /// interfaces.
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8125
}

fn default_retentions() -> Vec<u64> {
    vec![10, 60, 600]
}

fn default_workers() -> usize {
    100
}

fn default_queue_size() -> usize {
    10_000
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

fn default_heartbeat() -> Duration {
    Duration::from_secs(1)
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            port: default_port(),
            root: PathBuf::new(),
            retentions: default_retentions(),
            dispatch: DispatchConfig::default(),
            redis: RedisConfig::default(),
            health: HealthConfig::default(),
            heartbeat: default_heartbeat(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            bail!("root is required");
        }

        if self.retentions.is_empty() {
            bail!("retentions must list at least one interval");
        }

        let heartbeat_secs = self.heartbeat.as_secs();
        if heartbeat_secs == 0 || self.heartbeat.subsec_nanos() != 0 {
            bail!("heartbeat must be a whole positive number of seconds");
        }

        for window in self.retentions.windows(2) {
            if window[1] <= window[0] {
                bail!(
                    "retentions must be strictly ascending, got {} after {}",
                    window[1],
                    window[0],
                );
            }
        }

        for &interval in &self.retentions {
            if interval == 0 || interval % heartbeat_secs != 0 {
                bail!(
                    "retention interval {interval}s must be a positive multiple \
                     of the {heartbeat_secs}s heartbeat",
                );
            }
        }

        if self.dispatch.workers == 0 {
            bail!("dispatch.workers must be positive");
        }

        if self.dispatch.queue_size == 0 {
            bail!("dispatch.queue_size must be positive");
        }

        if self.redis.host.is_empty() {
            bail!("redis.host is required");
        }

        Ok(())
    }

    /// Number of wheel slots for each retention: `interval / heartbeat`.
    pub fn slot_counts(&self) -> Vec<usize> {
        let heartbeat_secs = self.heartbeat.as_secs().max(1);
        self.retentions
            .iter()
            .map(|&interval| (interval / heartbeat_secs) as usize)
            .collect()
    }
}

impl RedisConfig {
    /// Connection URL for the redis client.
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}
