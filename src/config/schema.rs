//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the core.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the request-processing core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    /// Database connection pool settings.
    pub pool: PoolConfig,

    /// Task scheduler and per-request deadline settings.
    pub scheduler: SchedulerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections (leased + idle + opening).
    pub capacity: usize,

    /// How long `acquire` waits for a connection in milliseconds.
    pub acquire_timeout_ms: u64,

    /// Idle connections older than this are closed before handout.
    pub idle_ttl_secs: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            acquire_timeout_ms: 5_000,
            idle_ttl_secs: 300,
        }
    }
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads for the run loops. 0 means one per CPU core.
    pub worker_threads: usize,

    /// Per-request deadline in milliseconds.
    pub request_deadline_ms: u64,

    /// How long shutdown waits for in-flight tasks in seconds.
    pub drain_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Resolved worker count (0 expands to available parallelism).
    pub fn resolved_workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            request_deadline_ms: 30_000,
            drain_timeout_secs: 30,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Bind address of the scrape endpoint.
    pub metrics_address: String,

    /// Bounded buffer size for the fire-and-forget sink. Events beyond
    /// this are dropped, never backpressured onto requests.
    pub sink_buffer: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            sink_buffer: 1_024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = CoreConfig::default();
        assert!(config.pool.capacity > 0);
        assert!(config.scheduler.resolved_workers() >= 1);
        assert!(config.observability.sink_buffer > 0);
    }

    #[test]
    fn test_minimal_toml_parses() {
        let config: CoreConfig = toml::from_str("[pool]\ncapacity = 4\n").unwrap();
        assert_eq!(config.pool.capacity, 4);
        // Untouched sections keep defaults.
        assert_eq!(config.scheduler.request_deadline_ms, 30_000);
    }
}
