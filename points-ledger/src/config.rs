//! Configuration for the points ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Point policy configuration
    pub points: PointsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/points-ledger"),
            service_name: "points-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            rocksdb: RocksDbConfig::default(),
            points: PointsConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Point policy
///
/// Submitting a report *spends* points while collecting waste *earns*
/// them. The asymmetry is intentional product policy, preserved here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    /// Points consumed when submitting a report
    pub report_cost: i64,

    /// Default points granted to the collector of a verified report
    pub collect_reward: i64,

    /// Sign-up grant for organization accounts
    pub organization_bonus: i64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            report_cost: 10,
            collect_reward: 10,
            organization_bonus: 100,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("POINTS_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("POINTS_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(cost) = std::env::var("POINTS_REPORT_COST") {
            config.points.report_cost = cost
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid POINTS_REPORT_COST: {}", e)))?;
        }

        Ok(config)
    }
}
