use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV_VAR: &str = "PIXELIZE_CONFIG";

/// Application configuration loaded from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker pool bounds and timers
    #[serde(default)]
    pub pool: PoolConfig,

    /// Chunking and offload thresholds
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Job scheduler and retention
    #[serde(default)]
    pub tasks: TaskConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on worker threads (unset: one less than the core count, at least 2)
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Idle workers kept alive past the idle timeout (unset: half of max, at least 1)
    #[serde(default)]
    pub min_workers: Option<usize>,

    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// A worker is terminated once its error count exceeds this
    #[serde(default = "default_max_worker_errors")]
    pub max_worker_errors: u32,
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_max_worker_errors() -> u32 {
    5
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            min_workers: None,
            task_timeout_ms: default_task_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_worker_errors: default_max_worker_errors(),
        }
    }
}

impl PoolConfig {
    /// Effective maximum pool size.
    pub fn resolved_max_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(default_max_workers)
            .max(1)
    }

    /// Effective minimum pool size, never above the maximum.
    pub fn resolved_min_workers(&self) -> usize {
        let max = self.resolved_max_workers();
        self.min_workers
            .unwrap_or_else(|| (max / 2).max(1))
            .min(max)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Number of logical cores, falling back to 1 when unknown.
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_max_workers() -> usize {
    available_cores().saturating_sub(1).max(2)
}

/// Performance optimizer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Reference buffer size for chunk recommendations
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: u64,

    #[serde(default = "default_offload_pixel_threshold")]
    pub offload_pixel_threshold: u64,

    #[serde(default = "default_offload_byte_threshold")]
    pub offload_byte_threshold: u64,

    /// Fraction of the memory budget above which plans degrade
    #[serde(default = "default_memory_pressure_ratio")]
    pub memory_pressure_ratio: f64,

    /// Floor for halved chunk sizes under memory pressure
    #[serde(default = "default_min_chunk_rows")]
    pub min_chunk_rows: u32,
}

fn default_max_buffer_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_offload_pixel_threshold() -> u64 {
    2_000_000
}

fn default_offload_byte_threshold() -> u64 {
    20 * 1024 * 1024
}

fn default_memory_pressure_ratio() -> f64 {
    0.8
}

fn default_min_chunk_rows() -> u32 {
    128
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: default_max_buffer_bytes(),
            offload_pixel_threshold: default_offload_pixel_threshold(),
            offload_byte_threshold: default_offload_byte_threshold(),
            memory_pressure_ratio: default_memory_pressure_ratio(),
            min_chunk_rows: default_min_chunk_rows(),
        }
    }
}

/// Task manager timers and retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_scheduler_interval_ms")]
    pub scheduler_interval_ms: u64,

    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Terminal jobs older than this are evicted
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Uploaded images older than this are evicted
    #[serde(default = "default_image_ttl_secs")]
    pub image_ttl_secs: u64,

    /// Capacity of the progress broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_scheduler_interval_ms() -> u64 {
    1_000
}

fn default_cleanup_interval_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_job_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_image_ttl_secs() -> u64 {
    60 * 60
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: default_scheduler_interval_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            job_ttl_secs: default_job_ttl_secs(),
            image_ttl_secs: default_image_ttl_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl TaskConfig {
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }

    pub fn job_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.job_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn image_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.image_ttl_secs.min(i64::MAX as u64) as i64)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// With no explicit path, `PIXELIZE_CONFIG` is consulted. A missing or
    /// unparsable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let env_path = std::env::var_os(CONFIG_ENV_VAR);
        let Some(path) = path.or(env_path.as_deref().map(Path::new)) else {
            tracing::debug!("No config file given, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_yaml_str(&content) {
                Ok(config) => {
                    tracing::info!(
                        path = %path.display(),
                        max_workers = config.pool.resolved_max_workers(),
                        min_workers = config.pool.resolved_min_workers(),
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(%e, path = %path.display(), "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "Failed to read config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.pool.task_timeout(), Duration::from_secs(30));
        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.pool.max_worker_errors, 5);
        assert_eq!(config.optimizer.max_buffer_bytes, 50 * 1024 * 1024);
        assert_eq!(config.optimizer.offload_pixel_threshold, 2_000_000);
        assert_eq!(config.optimizer.min_chunk_rows, 128);
        assert_eq!(config.tasks.scheduler_interval(), Duration::from_secs(1));
        assert_eq!(config.tasks.cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.tasks.job_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.tasks.image_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_default_pool_bounds() {
        let pool = PoolConfig::default();
        let max = pool.resolved_max_workers();

        assert!(max >= 2);
        assert_eq!(pool.resolved_min_workers(), (max / 2).max(1));
    }

    #[test]
    fn test_min_workers_never_exceeds_max() {
        let pool = PoolConfig {
            max_workers: Some(2),
            min_workers: Some(8),
            ..Default::default()
        };

        assert_eq!(pool.resolved_max_workers(), 2);
        assert_eq!(pool.resolved_min_workers(), 2);
    }

    #[test]
    fn test_zero_max_workers_is_raised_to_one() {
        let pool = PoolConfig {
            max_workers: Some(0),
            ..Default::default()
        };

        assert_eq!(pool.resolved_max_workers(), 1);
        assert_eq!(pool.resolved_min_workers(), 1);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let yaml = r#"
pool:
  max_workers: 4
  task_timeout_ms: 500
tasks:
  job_ttl_secs: 60
"#;

        let config = AppConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.pool.max_workers, Some(4));
        assert_eq!(config.pool.task_timeout(), Duration::from_millis(500));
        assert_eq!(config.pool.idle_timeout_ms, 60_000);
        assert_eq!(config.tasks.job_ttl_secs, 60);
        assert_eq!(config.tasks.image_ttl_secs, 3600);
        assert_eq!(config.optimizer, OptimizerConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip_preserves_values() {
        let mut config = AppConfig::default();
        config.pool.max_workers = Some(3);
        config.optimizer.memory_pressure_ratio = 0.5;

        let yaml = config.to_yaml_string().unwrap();
        let parsed = AppConfig::from_yaml_str(&yaml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool:\n  max_workers: 3\n  max_worker_errors: 2").unwrap();

        let config = AppConfig::load(Some(file.path()));

        assert_eq!(config.pool.max_workers, Some(3));
        assert_eq!(config.pool.max_worker_errors, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("missing.yaml")));

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_invalid_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool: [not, a, map").unwrap();

        let config = AppConfig::load(Some(file.path()));

        assert_eq!(config, AppConfig::default());
    }
}
