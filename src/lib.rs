//! Photogrammetry pipeline for botanical specimen photography: sort raw
//! multi-camera captures into specimen folders, color calibrate them with an
//! external color engine and build one 3D model per specimen with an external
//! reconstruction engine.

pub mod config;
pub mod core;
pub mod error;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, UnitFailure};
