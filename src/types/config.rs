//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file and overridden by the
//! binary's command-line/environment flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::errors::Result;

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Control-surface server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Kernel lifecycle configuration.
    #[serde(default)]
    pub kernel: KernelConfig,

    /// Outbound queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Inbound dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Transport partitioning configuration.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Control surface bind address (HTTP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Kernel lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Name the kernel reports under in health output.
    pub name: String,

    /// Upper bound on a single manager's `start()`.
    #[serde(with = "humantime_serde")]
    pub start_timeout: Duration,

    /// Upper bound on a single manager's `close()`.
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "Kernel".to_string(),
            start_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(15),
        }
    }
}

/// Outbound queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded time the transport gets to flush on close.
    #[serde(with = "humantime_serde")]
    pub flush_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_secs(10),
        }
    }
}

/// Inbound dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of recently handled messages kept for introspection.
    pub recent_capacity: usize,

    /// Priority used when forwarding routable messages to the queue.
    pub default_priority: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 100,
            default_priority: 0,
        }
    }
}

/// Transport partitioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total number of partitions per topic.
    pub num_partitions: u32,

    /// Known categories pinned to a fixed partition.
    pub partition_map: BTreeMap<String, u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let partition_map = [
            "XLK", "XLV", "XLF", "XLY", "XLI", "XLP", "XLE", "XLU", "XLB", "XLC", "XLRE",
        ]
        .iter()
        .enumerate()
        .map(|(idx, sector)| (sector.to_string(), idx as u32))
        .collect();

        Self {
            num_partitions: 11,
            partition_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.kernel.name, "Kernel");
        assert_eq!(config.transport.num_partitions, 11);
        assert_eq!(config.transport.partition_map.get("XLRE"), Some(&10));
        assert_eq!(config.dispatch.recent_capacity, 100);
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let body = serde_json::json!({
            "kernel": { "name": "Edge", "start_timeout": "250ms" },
            "queue": { "flush_timeout": "2s" },
        });
        write!(file, "{}", body).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.kernel.name, "Edge");
        assert_eq!(config.kernel.start_timeout, Duration::from_millis(250));
        assert_eq!(config.kernel.close_timeout, Duration::from_secs(15));
        assert_eq!(config.queue.flush_timeout, Duration::from_secs(2));
        assert_eq!(config.server.listen_addr, "127.0.0.1:8000");
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = Config::from_file("/nonexistent/zeta.json").unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }
}
