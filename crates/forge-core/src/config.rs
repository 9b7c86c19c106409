// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

const CONFIG_FILE: &str = "config.json";

/// Persistent service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Root of the artifact store (uploads, outputs, scratch).
    pub data_dir: PathBuf,
    /// Maximum number of transformations running at once, across all runs.
    pub max_workers: usize,
    /// Capacity of each run's progress channel.
    pub event_buffer: usize,
    /// Wall-clock limit for a whole run.
    pub run_timeout_secs: u64,
    /// Age after which output artifacts are reaped.
    pub retention_secs: u64,
    /// JPEG quality used when a step doesn't specify one.
    pub default_jpeg_quality: u8,
    pub search: SizeSearchConfig,
    pub recovery: RecoveryConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_workers: 4,
            event_buffer: 16,
            run_timeout_secs: 900,
            retention_secs: 3600,
            default_jpeg_quality: 95,
            search: SizeSearchConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ForgeConfig {
    /// Defaults rooted at an explicit data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load `config.json` from `data_dir`, falling back to defaults when the
    /// file is absent or unreadable. The directory the file was found in is
    /// always the effective data directory.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let parsed = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| match serde_json::from_str::<ForgeConfig>(&data) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!(error = %err, "ignoring malformed config file");
                    None
                }
            });
        match parsed {
            Some(mut config) => {
                debug!("loaded config from data directory");
                config.data_dir = data_dir.to_path_buf();
                config
            }
            None => Self::with_data_dir(data_dir),
        }
    }

    /// Persist to `<data_dir>/config.json`.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.data_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Parameters of the adaptive size search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeSearchConfig {
    pub quality_min: u8,
    pub quality_max: u8,
    /// Per-round dimension multiplier once quality alone can't meet the target.
    pub scale_factor: f32,
    /// Neither dimension is shrunk below this many pixels.
    pub min_dimension: u32,
}

impl Default for SizeSearchConfig {
    fn default() -> Self {
        Self {
            quality_min: 30,
            quality_max: 95,
            scale_factor: 0.9,
            min_dimension: 10,
        }
    }
}

/// Settings for the layout recovery engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Directory holding the OCR models. Without it the engine recovers layout
    /// from the PDF text layer only.
    pub model_dir: Option<PathBuf>,
}

/// Default data directory: `FORGE_DATA_DIR`, else the XDG data dir.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FORGE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        // Last resort
        std::env::temp_dir()
    };
    base.join("file-forge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_at_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ForgeConfig::load(dir.path());
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.search.quality_min, 30);
        assert_eq!(config.search.quality_max, 95);
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ForgeConfig::with_data_dir(dir.path());
        config.max_workers = 2;
        config.search.min_dimension = 16;
        config.save().unwrap();

        let loaded = ForgeConfig::load(dir.path());
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"event_buffer": 4}"#).unwrap();
        let loaded = ForgeConfig::load(dir.path());
        assert_eq!(loaded.event_buffer, 4);
        assert_eq!(loaded.max_workers, 4);
    }
}
