use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const DATA_DIR: &str = ".tracksync";
const SNAPSHOT_FILE: &str = "tracksync.json";

/// Configuration for the sync engine.
///
/// Every field has a default, so a config file only needs the keys it
/// wants to override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding the local snapshot cache.
    pub data_dir: PathBuf,
    /// File name shared by the local cache and the cloud copy.
    pub snapshot_file: String,
    /// Base directory for `~`-relative source paths.
    pub home_dir: PathBuf,
    pub save_debounce_ms: u64,
    pub restore_cooldown_ms: u64,
    /// Wait after a bridge watch event before re-reading the files.
    pub settle_delay_ms: u64,
    /// A bridge file must be at least this much newer than our own last
    /// write to count as an external edit.
    pub self_write_threshold_ms: u64,
    pub cloud_poll_interval_secs: u64,
    /// Length of sprints synthesized by the legacy migration.
    pub sprint_length_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: home_dir.join(DATA_DIR),
            snapshot_file: SNAPSHOT_FILE.to_string(),
            home_dir,
            save_debounce_ms: 1000,
            restore_cooldown_ms: 1000,
            settle_delay_ms: 300,
            self_write_threshold_ms: 500,
            cloud_poll_interval_secs: 15,
            sprint_length_days: 14,
        }
    }
}

impl SyncConfig {
    /// Create a config rooted at `data_dir`, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot_file.trim().is_empty() {
            return Err(SyncError::Config("snapshot_file must not be empty".into()));
        }
        if self.sprint_length_days < 1 {
            return Err(SyncError::Config(format!(
                "sprint_length_days must be positive, got {}",
                self.sprint_length_days
            )));
        }
        Ok(())
    }

    /// Path of the local snapshot cache.
    pub fn local_snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn restore_cooldown(&self) -> Duration {
        Duration::from_millis(self.restore_cooldown_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn self_write_threshold(&self) -> Duration {
        Duration::from_millis(self.self_write_threshold_ms)
    }

    pub fn cloud_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cloud_poll_interval_secs)
    }
}
