use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The capture time field is absent or does not parse as `YYYY:MM:DD HH:MM:SS`.
    #[error("Capture time missing or unreadable for {}", path.display())]
    MetadataMissing { path: PathBuf },

    #[error("Metadata service error: {message}")]
    MetadataService { message: String },

    /// Calibration profile lookup must match exactly one file.
    #[error("Expected exactly one calibration profile in {}, found {found}", dir.display())]
    ProfileAmbiguous { dir: PathBuf, found: usize },

    #[error("{engine} failed for {unit}: {status}")]
    ExternalEngineFailure {
        engine: String,
        unit: String,
        status: String,
    },

    #[error("No {format} photos found for {unit}")]
    NoPhotos { unit: String, format: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A unit of work (camera stream, photo, specimen) that failed without
/// aborting its batch.
#[derive(Debug)]
pub struct UnitFailure {
    pub unit: String,
    pub error: PipelineError,
}

impl UnitFailure {
    pub fn new(unit: impl Into<String>, error: PipelineError) -> Self {
        Self {
            unit: unit.into(),
            error,
        }
    }
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.unit, self.error)
    }
}
