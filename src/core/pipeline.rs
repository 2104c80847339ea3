//! `relax`: sort, color and build in one go, resumable across the manual
//! profile-making step.
//!
//! Progress is persisted in the sort output folder after every stage, so a
//! run stopped at the checkpoint (or interrupted later) picks up after the
//! last completed stage instead of sorting again. A stage that left failed
//! units is not marked complete and runs again on the next invocation,
//! together with every stage after it.

use crate::config::PipelineConfig;
use crate::core::build::{BuildReport, BuildService};
use crate::core::capture::ImageFormat;
use crate::core::color::{ColorReport, ColorService};
use crate::core::engine::EngineRunner;
use crate::core::metadata::MetadataSource;
use crate::core::sort::{SortReport, SortService};
use crate::error::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE_NAME: &str = ".photogramkit-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub input_raw: Option<PathBuf>,
    pub sorted_at: Option<DateTime<Utc>>,
    pub colored_at: Option<DateTime<Utc>>,
    pub built_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn path(sorted_root: &Path) -> PathBuf {
        sorted_root.join(STATE_FILE_NAME)
    }

    /// Saved state, or a fresh one when none exists yet.
    pub fn load(sorted_root: &Path) -> PipelineResult<Self> {
        let path = Self::path(sorted_root);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, sorted_root: &Path) -> PipelineResult<()> {
        fs::create_dir_all(sorted_root)?;
        fs::write(Self::path(sorted_root), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn clear(sorted_root: &Path) -> PipelineResult<()> {
        match fs::remove_file(Self::path(sorted_root)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Decides whether calibration profiles are ready so coloring may start.
pub trait ProfileGate {
    fn profiles_ready(&self, sorted_root: &Path) -> PipelineResult<bool>;
}

/// Gate with a fixed answer.
pub struct FixedGate(pub bool);

impl ProfileGate for FixedGate {
    fn profiles_ready(&self, _sorted_root: &Path) -> PipelineResult<bool> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RelaxPaths {
    pub input_raw: PathBuf,
    pub output_sort: PathBuf,
    pub output_color: PathBuf,
    pub output_model: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RelaxEngines {
    pub darktable: PathBuf,
    pub metashape: PathBuf,
    pub script: PathBuf,
}

/// What one `relax` invocation did. Stages skipped because they were
/// already complete have no report.
#[derive(Debug, Default)]
pub struct RelaxOutcome {
    pub sort: Option<SortReport>,
    pub color: Option<ColorReport>,
    pub build: Option<BuildReport>,
    /// Stopped at the profile checkpoint.
    pub paused: bool,
}

fn completed_at(stage: &str, failures: usize) -> Option<DateTime<Utc>> {
    if failures == 0 {
        Some(Utc::now())
    } else {
        log::warn!(
            "{} left {} failure(s); it runs again on the next relax",
            stage,
            failures
        );
        None
    }
}

pub struct Relax<'a> {
    pub config: &'a PipelineConfig,
    pub metadata: &'a dyn MetadataSource,
    pub runner: &'a dyn EngineRunner,
    pub gate: &'a dyn ProfileGate,
    pub format: ImageFormat,
}

impl<'a> Relax<'a> {
    pub fn run(&self, paths: &RelaxPaths, engines: &RelaxEngines) -> PipelineResult<RelaxOutcome> {
        let mut state = PipelineState::load(&paths.output_sort)?;
        let mut outcome = RelaxOutcome::default();

        if state.sorted_at.is_none() {
            log::info!("Step 1/3: sorting photos");
            let sort = SortService::new(self.config, self.metadata, self.format);
            let report = sort.run(&paths.input_raw, &paths.output_sort)?;
            state.input_raw = Some(paths.input_raw.clone());
            state.sorted_at = completed_at("sort", report.failures.len());
            state.colored_at = None;
            state.built_at = None;
            state.save(&paths.output_sort)?;
            outcome.sort = Some(report);
        } else {
            log::info!("Step 1/3: sort already done, skipping");
        }

        if state.colored_at.is_none() {
            if !self.gate.profiles_ready(&paths.output_sort)? {
                log::info!("Paused before coloring; run relax again once profiles exist");
                outcome.paused = true;
                return Ok(outcome);
            }
            log::info!("Step 2/3: applying color calibration");
            let color = ColorService::new(self.config, self.runner, &engines.darktable, self.format);
            let report = color.run(&paths.output_sort, &paths.output_color)?;
            state.colored_at = completed_at("color", report.failures.len());
            state.built_at = None;
            state.save(&paths.output_sort)?;
            outcome.color = Some(report);
        } else {
            log::info!("Step 2/3: color already done, skipping");
        }

        if state.built_at.is_none() {
            log::info!("Step 3/3: building 3D models");
            // The color engine always writes TIFF.
            let build = BuildService::new(
                self.config,
                self.runner,
                &engines.metashape,
                &engines.script,
                ImageFormat::Tiff,
            );
            let report = build.run(&paths.output_color, &paths.output_model)?;
            // Models built from partial color output are not final.
            state.built_at = state
                .colored_at
                .and_then(|_| completed_at("build", report.failures.len()));
            state.save(&paths.output_sort)?;
            outcome.build = Some(report);
        } else {
            log::info!("Step 3/3: build already done, skipping");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Invocation;
    use crate::core::engine::testing::FakeRunner;
    use crate::core::metadata::MetadataSession;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    /// Every photo was shot 20 seconds after the previous one, judged by
    /// the number in its file name.
    struct SteadyClock;

    impl MetadataSession for SteadyClock {
        fn read_capture_time(&mut self, path: &Path) -> PipelineResult<NaiveDateTime> {
            let stem = path.file_stem().unwrap().to_string_lossy();
            let n: i64 = stem.trim_start_matches("IMG_").parse().unwrap();
            let start = NaiveDate::from_ymd_opt(2024, 7, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap();
            Ok(start + Duration::seconds(20 * n))
        }
    }

    impl MetadataSource for SteadyClock {
        fn open_session(&self) -> PipelineResult<Box<dyn MetadataSession + '_>> {
            Ok(Box::new(SteadyClock))
        }
    }

    fn setup(root: &Path) -> (RelaxPaths, RelaxEngines) {
        for camera in ["top", "middle", "bottom"] {
            let dir = root.join("raw/070324").join(camera);
            fs::create_dir_all(&dir).unwrap();
            for i in 1..=6 {
                fs::write(dir.join(format!("IMG_{:04}.CR3", i)), b"raw").unwrap();
            }
        }
        (
            RelaxPaths {
                input_raw: root.join("raw"),
                output_sort: root.join("sorted"),
                output_color: root.join("colored"),
                output_model: root.join("models"),
            },
            RelaxEngines {
                darktable: PathBuf::from("darktable-cli"),
                metashape: PathBuf::from("metashape"),
                script: PathBuf::from("build.py"),
            },
        )
    }

    #[test]
    fn test_state_round_trip_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let state = PipelineState {
            input_raw: Some(PathBuf::from("/raw")),
            sorted_at: Some(Utc::now()),
            ..PipelineState::default()
        };
        state.save(temp_dir.path()).unwrap();
        assert_eq!(PipelineState::load(temp_dir.path()).unwrap(), state);

        PipelineState::clear(temp_dir.path()).unwrap();
        PipelineState::clear(temp_dir.path()).unwrap();
        assert_eq!(PipelineState::load(temp_dir.path()).unwrap(), PipelineState::default());
    }

    #[test]
    fn test_pause_then_resume_without_resorting() {
        let temp_dir = TempDir::new().unwrap();
        let (paths, engines) = setup(temp_dir.path());
        let config = PipelineConfig::default();
        let runner = FakeRunner::new(|_: &Invocation| false);

        let first = Relax {
            config: &config,
            metadata: &SteadyClock,
            runner: &runner,
            gate: &FixedGate(false),
            format: ImageFormat::Cr3,
        }
        .run(&paths, &engines)
        .unwrap();
        assert!(first.paused);
        assert_eq!(first.sort.as_ref().unwrap().specimen_copies, 18);
        assert!(first.color.is_none());
        assert!(runner.calls.borrow().is_empty());

        // The human drops one profile per camera.
        for camera in ["top", "middle", "bottom"] {
            let dir = paths
                .output_sort
                .join("070324/colorprofiles_namelabels/flower1")
                .join(camera);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("profile.dcp"), b"dcp").unwrap();
        }

        let second = Relax {
            config: &config,
            metadata: &SteadyClock,
            runner: &runner,
            gate: &FixedGate(true),
            format: ImageFormat::Cr3,
        }
        .run(&paths, &engines)
        .unwrap();
        assert!(!second.paused);
        assert!(second.sort.is_none());
        assert_eq!(second.color.as_ref().unwrap().calibrated, 18);
        assert!(second.color.as_ref().unwrap().failures.is_empty());

        // The fake color engine writes nothing, so there is nothing to build.
        let build = second.build.as_ref().unwrap();
        assert_eq!(build.built, 0);

        let state = PipelineState::load(&paths.output_sort).unwrap();
        assert!(state.sorted_at.is_some());
        assert!(state.colored_at.is_some());
        assert!(state.built_at.is_some());
    }

    #[test]
    fn test_failed_color_runs_again_on_resume() {
        let temp_dir = TempDir::new().unwrap();
        let (paths, engines) = setup(temp_dir.path());
        let config = PipelineConfig {
            cameras: vec!["top".to_string()],
            ..PipelineConfig::default()
        };
        let runner = FakeRunner::new(|_: &Invocation| false);

        // Confirmed too early: no profile exists yet.
        let first = Relax {
            config: &config,
            metadata: &SteadyClock,
            runner: &runner,
            gate: &FixedGate(true),
            format: ImageFormat::Cr3,
        }
        .run(&paths, &engines)
        .unwrap();
        let color = first.color.as_ref().unwrap();
        assert_eq!(color.calibrated, 0);
        assert_eq!(color.failures.len(), 6);
        assert!(runner.calls.borrow().is_empty());

        let state = PipelineState::load(&paths.output_sort).unwrap();
        assert!(state.sorted_at.is_some());
        assert!(state.colored_at.is_none());
        assert!(state.built_at.is_none());

        let dir = paths
            .output_sort
            .join("070324/colorprofiles_namelabels/flower1/top");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("top.dcp"), b"dcp").unwrap();

        let second = Relax {
            config: &config,
            metadata: &SteadyClock,
            runner: &runner,
            gate: &FixedGate(true),
            format: ImageFormat::Cr3,
        }
        .run(&paths, &engines)
        .unwrap();
        assert!(second.sort.is_none());
        assert_eq!(second.color.as_ref().unwrap().calibrated, 6);
        assert_eq!(runner.calls.borrow().len(), 6);
        assert!(second.build.is_some());

        let state = PipelineState::load(&paths.output_sort).unwrap();
        assert!(state.colored_at.is_some());
        assert!(state.built_at.is_some());
    }
}
