use crate::error::{PipelineError, PipelineResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "photogramkit";

/// Tunables shared by every pipeline stage.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Camera subfolder names expected in every date-session.
    pub cameras: Vec<String>,
    /// Largest gap between neighbouring captures of one segment.
    pub max_gap_secs: i64,
    /// Segments with at least this many captures are specimen bursts.
    pub min_specimen_size: usize,
    pub specimen_prefix: String,
    pub calibration_dir: String,
    pub bug_log: String,
    pub profile_extension: String,
    /// Leading component of generated reconstruction project names.
    pub project_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cameras: vec!["top".to_string(), "middle".to_string(), "bottom".to_string()],
            max_gap_secs: 180,
            min_specimen_size: 6,
            specimen_prefix: "flower".to_string(),
            calibration_dir: "colorprofiles_namelabels".to_string(),
            bug_log: "bug.txt".to_string(),
            profile_extension: "dcp".to_string(),
            project_prefix: "2024".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `explicit` if given, otherwise from the user config
    /// directory when a file exists there, otherwise use defaults.
    pub fn load(explicit: Option<&Path>) -> PipelineResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.is_file()),
        };

        let config = match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                let raw = fs::read_to_string(&path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.cameras.is_empty() {
            return Err(PipelineError::Config {
                message: "at least one camera is required".to_string(),
            });
        }
        if self.cameras.iter().any(|c| c.is_empty() || c.starts_with('.')) {
            return Err(PipelineError::Config {
                message: format!("invalid camera name in {:?}", self.cameras),
            });
        }
        if self.max_gap_secs < 0 {
            return Err(PipelineError::Config {
                message: format!("max_gap_secs must not be negative, got {}", self.max_gap_secs),
            });
        }
        if Duration::try_seconds(self.max_gap_secs).is_none() {
            return Err(PipelineError::Config {
                message: format!("max_gap_secs is out of range, got {}", self.max_gap_secs),
            });
        }
        if self.min_specimen_size == 0 {
            return Err(PipelineError::Config {
                message: "min_specimen_size must be at least 1".to_string(),
            });
        }
        if self.specimen_prefix.is_empty() || self.calibration_dir.is_empty() {
            return Err(PipelineError::Config {
                message: "specimen_prefix and calibration_dir must not be empty".to_string(),
            });
        }
        if self.calibration_dir.starts_with(&self.specimen_prefix) {
            return Err(PipelineError::Config {
                message: format!(
                    "calibration_dir {:?} would be mistaken for a specimen folder",
                    self.calibration_dir
                ),
            });
        }
        Ok(())
    }

    /// Saturates for values `validate` would reject.
    pub fn max_gap(&self) -> Duration {
        Duration::try_seconds(self.max_gap_secs).unwrap_or(Duration::MAX)
    }

    pub fn specimen_folder_name(&self, index: u32) -> String {
        format!("{}{}", self.specimen_prefix, index)
    }
}
