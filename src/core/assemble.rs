//! Placing segments into the per-session output layout.
//!
//! Specimen indices are aligned across cameras by position only: the Nth
//! specimen segment of every camera lands in `flowerN`. Nothing checks that
//! those segments show the same physical specimen; a dropped or split burst on
//! one camera shifts every later specimen of that camera.

use crate::config::PipelineConfig;
use crate::core::capture::Capture;
use crate::core::segment::SegmentKind;
use crate::error::PipelineResult;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-session specimen index of every camera, starting at 1.
///
/// Each camera advances only on its own specimen segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecimenCounters {
    next: BTreeMap<String, u32>,
}

impl SpecimenCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, camera: &str) -> u32 {
        self.next.get(camera).copied().unwrap_or(1)
    }

    pub fn advance(&mut self, camera: &str) -> u32 {
        let next = self.current(camera) + 1;
        self.next.insert(camera.to_string(), next);
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Calibration,
    Specimen,
}

/// Where one segment goes.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub area: Area,
    pub index: u32,
    pub camera: String,
    pub captures: Vec<Capture>,
}

/// Folder layout of one sorted date-session.
#[derive(Debug, Clone)]
pub struct OutputLayout<'a> {
    session_dir: PathBuf,
    config: &'a PipelineConfig,
}

impl<'a> OutputLayout<'a> {
    pub fn new(session_dir: impl Into<PathBuf>, config: &'a PipelineConfig) -> Self {
        Self {
            session_dir: session_dir.into(),
            config,
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn specimen_dir(&self, index: u32, camera: &str) -> PathBuf {
        self.session_dir
            .join(self.config.specimen_folder_name(index))
            .join(camera)
    }

    pub fn calibration_dir(&self, index: u32, camera: &str) -> PathBuf {
        self.session_dir
            .join(&self.config.calibration_dir)
            .join(self.config.specimen_folder_name(index))
            .join(camera)
    }

    pub fn destination(&self, placement: &Placement) -> PathBuf {
        match placement.area {
            Area::Calibration => self.calibration_dir(placement.index, &placement.camera),
            Area::Specimen => self.specimen_dir(placement.index, &placement.camera),
        }
    }

    /// Copy a placement's captures into its folder, returning the number of
    /// files copied. Existing files with the same name are overwritten.
    pub fn apply(&self, placement: &Placement) -> PipelineResult<usize> {
        let dest_dir = self.destination(placement);
        fs::create_dir_all(&dest_dir)?;

        for capture in &placement.captures {
            fs::copy(&capture.path, dest_dir.join(&capture.name))?;
        }

        log::debug!(
            "Copied {} capture(s) to {}",
            placement.captures.len(),
            dest_dir.display()
        );
        Ok(placement.captures.len())
    }
}

/// Decide where every segment of one camera goes, advancing that camera's
/// counter once per specimen segment.
///
/// Calibration segments are filed under the camera's current index, which is
/// the specimen about to be shot (or, after the last specimen, one past it).
pub fn plan_camera(
    segments: Vec<Vec<Capture>>,
    camera: &str,
    counters: &mut SpecimenCounters,
    min_specimen_size: usize,
) -> Vec<Placement> {
    let mut placements = Vec::with_capacity(segments.len());

    for captures in segments {
        let index = counters.current(camera);
        let area = match SegmentKind::classify(captures.len(), min_specimen_size) {
            SegmentKind::Calibration => Area::Calibration,
            SegmentKind::Specimen => {
                counters.advance(camera);
                Area::Specimen
            }
        };
        placements.push(Placement {
            area,
            index,
            camera: camera.to_string(),
            captures,
        });
    }

    placements
}
