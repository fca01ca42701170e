//! Configuration loading for bulksync.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! The default config file lives at `~/.config/bulksync/config.toml` (or the
//! platform equivalent).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Memory backpressure settings.
///
/// An absolute `ceiling_bytes` wins over `ceiling_percent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    /// Hard resident-memory ceiling for a run, in bytes
    #[serde(default)]
    pub ceiling_bytes: Option<u64>,

    /// Ceiling as a percent of total system memory.
    /// Range: (0.0, 100.0].
    #[serde(default = "default_ceiling_percent")]
    pub ceiling_percent: f64,
}

fn default_ceiling_percent() -> f64 {
    60.0
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            ceiling_bytes: None,
            ceiling_percent: default_ceiling_percent(),
        }
    }
}

/// Main synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Admitted ids the iterator aims for per fetch
    #[serde(default = "default_target_batch_size")]
    pub target_batch_size: usize,

    /// How far ahead of the cursor a ranged delete reaches, in batch spans
    #[serde(default = "default_delete_batch_multiple")]
    pub delete_batch_multiple: u64,

    /// Candidate count below which a run wipes the scope up front
    #[serde(default = "default_pre_delete_threshold")]
    pub pre_delete_threshold: u64,

    /// Consecutive fetches that examine nothing before a run is failed
    #[serde(default = "default_max_stalled_fetches")]
    pub max_stalled_fetches: usize,

    /// Skip documents whose builder fails instead of failing the run
    #[serde(default = "default_continue_on_build_error")]
    pub continue_on_build_error: bool,

    /// Maximum parent chain length walked when collecting ancestors
    #[serde(default = "default_ancestry_max_depth")]
    pub ancestry_max_depth: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Memory backpressure
    #[serde(default)]
    pub memory: MemorySettings,
}

fn default_target_batch_size() -> usize {
    150
}

fn default_delete_batch_multiple() -> u64 {
    20
}

fn default_pre_delete_threshold() -> u64 {
    3000
}

fn default_max_stalled_fetches() -> usize {
    1000
}

fn default_continue_on_build_error() -> bool {
    true
}

fn default_ancestry_max_depth() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_batch_size: default_target_batch_size(),
            delete_batch_multiple: default_delete_batch_multiple(),
            pre_delete_threshold: default_pre_delete_threshold(),
            max_stalled_fetches: default_max_stalled_fetches(),
            continue_on_build_error: default_continue_on_build_error(),
            ancestry_max_depth: default_ancestry_max_depth(),
            log_level: default_log_level(),
            memory: MemorySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/bulksync/config.toml)
    /// 3. Explicit config file (optional, must exist)
    /// 4. Environment variables (BULKSYNC_*, `__` between nested keys)
    pub fn load(config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "bulksync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("target_batch_size", default_target_batch_size() as i64)?
            .set_default(
                "delete_batch_multiple",
                default_delete_batch_multiple() as i64,
            )?
            .set_default(
                "pre_delete_threshold",
                default_pre_delete_threshold() as i64,
            )?
            .set_default("max_stalled_fetches", default_max_stalled_fetches() as i64)?
            .set_default("continue_on_build_error", default_continue_on_build_error())?
            .set_default("ancestry_max_depth", default_ancestry_max_depth() as i64)?
            .set_default("log_level", default_log_level())?
            .set_default("memory.ceiling_percent", default_ceiling_percent())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: BULKSYNC_TARGET_BATCH_SIZE, BULKSYNC_MEMORY__CEILING_BYTES, etc.
        builder = builder.add_source(
            Environment::with_prefix("BULKSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.target_batch_size == 0 {
            return Err(TypesError::Config(
                "target_batch_size must be > 0".to_string(),
            ));
        }
        if self.delete_batch_multiple == 0 {
            return Err(TypesError::Config(
                "delete_batch_multiple must be > 0".to_string(),
            ));
        }
        let pct = self.memory.ceiling_percent;
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(TypesError::Config(format!(
                "memory.ceiling_percent must be in (0, 100], got {}",
                pct
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.target_batch_size, 150);
        assert_eq!(settings.delete_batch_multiple, 20);
        assert_eq!(settings.pre_delete_threshold, 3000);
        assert_eq!(settings.max_stalled_fetches, 1000);
        assert!(settings.continue_on_build_error);
        assert!(settings.memory.ceiling_bytes.is_none());
        assert!((settings.memory.ceiling_percent - 60.0).abs() < f64::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sync.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "target_batch_size = 200").unwrap();
        writeln!(file, "pre_delete_threshold = 10").unwrap();
        writeln!(file, "[memory]").unwrap();
        writeln!(file, "ceiling_bytes = 1048576").unwrap();
        drop(file);

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.target_batch_size, 200);
        assert_eq!(settings.pre_delete_threshold, 10);
        assert_eq!(settings.memory.ceiling_bytes, Some(1_048_576));
        assert_eq!(settings.delete_batch_multiple, 20);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = Settings::load(Some("/definitely/not/here/bulksync.toml"));
        assert!(matches!(result, Err(TypesError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.target_batch_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.delete_batch_multiple = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.memory.ceiling_percent = 120.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.target_batch_size, settings.target_batch_size);

        let partial: Settings = serde_json::from_str(r#"{"target_batch_size": 50}"#).unwrap();
        assert_eq!(partial.target_batch_size, 50);
        assert_eq!(partial.pre_delete_threshold, 3000);
    }
}
