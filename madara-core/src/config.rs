//! Process-wide configuration for a knowledge base instance.
//!
//! Follows the same shape as the teacher's config: a TOML file with
//! per-field `#[serde(default = "...")]` hooks and a hand-written
//! `Default` impl so construction never depends on the file existing.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub karl: KarlConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
}

impl CoreConfig {
    /// Load `<root>/madara.toml`, falling back to defaults if absent.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join("madara.toml");
        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "no config file found, using CoreConfig::default()"
            );
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            record: RecordConfig::default(),
            context: ContextConfig::default(),
            karl: KarlConfig::default(),
            checkpoint: CheckpointConfig::default(),
            filters: FiltersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    #[serde(default = "RecordConfig::default_history_capacity")]
    pub default_history_capacity: usize,
    #[serde(default = "RecordConfig::default_precision")]
    pub default_precision: u32,
    #[serde(default)]
    pub default_fixed: bool,
}

impl RecordConfig {
    fn default_history_capacity() -> usize {
        0
    }
    fn default_precision() -> u32 {
        6
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            default_history_capacity: Self::default_history_capacity(),
            default_precision: Self::default_precision(),
            default_fixed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "ContextConfig::default_clock_increment")]
    pub default_clock_increment: i64,
    #[serde(default)]
    pub default_quality: u32,
}

impl ContextConfig {
    fn default_clock_increment() -> i64 {
        1
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_clock_increment: Self::default_clock_increment(),
            default_quality: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KarlConfig {
    #[serde(default = "KarlConfig::default_never_exit")]
    pub never_exit: bool,
    #[serde(default = "KarlConfig::default_poll_frequency")]
    pub default_poll_frequency_secs: f64,
    #[serde(default = "KarlConfig::default_max_wait_time")]
    pub default_max_wait_time_secs: f64,
}

impl KarlConfig {
    fn default_never_exit() -> bool {
        true
    }
    fn default_poll_frequency() -> f64 {
        0.1
    }
    fn default_max_wait_time() -> f64 {
        -1.0
    }
}

impl Default for KarlConfig {
    fn default() -> Self {
        Self {
            never_exit: Self::default_never_exit(),
            default_poll_frequency_secs: Self::default_poll_frequency(),
            default_max_wait_time_secs: Self::default_max_wait_time(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "CheckpointConfig::default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "CheckpointConfig::default_version")]
    pub version: u32,
}

impl CheckpointConfig {
    fn default_buffer_size() -> usize {
        64 * 1024
    }
    fn default_version() -> u32 {
        1
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            buffer_size: Self::default_buffer_size(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub rebroadcast_ttl: u32,
    #[serde(default = "FiltersConfig::default_participant_ttl")]
    pub participant_ttl: u32,
    #[serde(default)]
    pub send_bandwidth_limit: Option<u64>,
    #[serde(default)]
    pub total_bandwidth_limit: Option<u64>,
}

impl FiltersConfig {
    fn default_participant_ttl() -> u32 {
        10
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            rebroadcast_ttl: 0,
            participant_ttl: Self::default_participant_ttl(),
            send_bandwidth_limit: None,
            total_bandwidth_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.record.default_precision, 6);
        assert!(!cfg.record.default_fixed);
        assert_eq!(cfg.context.default_clock_increment, 1);
        assert!(cfg.karl.never_exit);
    }

    #[test]
    fn load_falls_back_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.checkpoint.version, 1);
    }

    #[test]
    fn load_parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("madara.toml"),
            "[record]\ndefault_precision = 3\n",
        )
        .unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.record.default_precision, 3);
        assert_eq!(cfg.record.default_history_capacity, 0);
    }
}
