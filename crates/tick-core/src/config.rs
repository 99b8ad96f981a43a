//! Configuration parsing for the tick library service.
//!
//! Settings are read from a single JSON file. The top-level structure carries
//! logging metadata and a `library` block describing where shards live and how
//! they rotate and expire.
//!
//! # Example config
//!
//! ```json
//! {
//!   "service": { "module_name": "tick_library", "log_path": "/var/log/ticks" },
//!   "library": {
//!     "directory": "/var/lib/ticks",
//!     "rotation_threshold_bytes": 52428800,
//!     "retention_secs": 86400,
//!     "reclaim_interval_secs": 300,
//!     "bucket_secs": 60
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::TickError;

/// Default size above which the active shard is sealed (50 MiB).
pub const DEFAULT_ROTATION_THRESHOLD: u64 = 50 << 20;
/// Default shard retention (24 hours).
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
/// Default reclamation period (5 minutes).
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 5 * 60;
/// Default shard naming bucket (1 minute).
pub const DEFAULT_BUCKET_SECS: u64 = 60;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service metadata (name, log path).
    pub service: Option<ServiceMeta>,

    /// Storage settings for the trade library.
    pub library: LibraryConfig,
}

impl AppConfig {
    /// Returns the module name used for log file prefixes.
    pub fn module_name(&self) -> String {
        self.service
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "tick_library".to_string())
    }

    /// Returns the log path, if file logging is configured.
    pub fn log_path(&self) -> Option<String> {
        self.service.as_ref().and_then(|m| m.log_path.clone())
    }
}

/// Service metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Storage settings for one trade library directory.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Root directory holding the `trades_<secs>` shard files.
    pub directory: PathBuf,

    /// Byte size above which the active shard is sealed.
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold_bytes: u64,

    /// Age, in seconds, past which a shard's newest trade makes it reclaimable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Period of the background reclamation task.
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,

    /// Width of the time bucket a new shard's name is truncated to.
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
}

fn default_rotation_threshold() -> u64 {
    DEFAULT_ROTATION_THRESHOLD
}

fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}

fn default_reclaim_interval_secs() -> u64 {
    DEFAULT_RECLAIM_INTERVAL_SECS
}

fn default_bucket_secs() -> u64 {
    DEFAULT_BUCKET_SECS
}

impl LibraryConfig {
    /// Config for `directory` with every other field at its default.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rotation_threshold_bytes: DEFAULT_ROTATION_THRESHOLD,
            retention_secs: DEFAULT_RETENTION_SECS,
            reclaim_interval_secs: DEFAULT_RECLAIM_INTERVAL_SECS,
            bucket_secs: DEFAULT_BUCKET_SECS,
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    /// Reject values that would make the library misbehave.
    pub fn validate(&self) -> Result<(), TickError> {
        if self.directory.as_os_str().is_empty() {
            return Err(TickError::Config("library.directory must be set".into()));
        }
        if self.rotation_threshold_bytes == 0 {
            return Err(TickError::Config("rotation_threshold_bytes must be > 0".into()));
        }
        if self.bucket_secs == 0 {
            return Err(TickError::Config("bucket_secs must be > 0".into()));
        }
        if self.reclaim_interval_secs == 0 {
            return Err(TickError::Config("reclaim_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.library.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: AppConfig = serde_json::from_str(r#"{"library":{"directory":"/tmp/ticks"}}"#).unwrap();
        assert_eq!(cfg.library.rotation_threshold_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.library.retention(), Duration::from_secs(86_400));
        assert_eq!(cfg.library.reclaim_interval(), Duration::from_secs(300));
        assert_eq!(cfg.library.bucket_secs, 60);
        assert_eq!(cfg.module_name(), "tick_library");
        assert!(cfg.log_path().is_none());
    }

    #[test]
    fn zero_bucket_rejected() {
        let mut cfg = LibraryConfig::new("/tmp/ticks");
        cfg.bucket_secs = 0;
        assert!(matches!(cfg.validate(), Err(TickError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"service":{"module_name":"ticks"},"library":{"directory":"/data","retention_secs":60}}"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.module_name(), "ticks");
        assert_eq!(cfg.library.retention_secs, 60);
        assert_eq!(cfg.library.directory, PathBuf::from("/data"));
    }

    #[test]
    fn load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"library":{"directory":"/data","rotation_threshold_bytes":0}}"#).unwrap();
        assert!(load_config(&path).is_err());
    }
}
