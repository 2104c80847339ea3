use crate::config::PipelineConfig;
use crate::core::capture::ImageFormat;
use crate::core::engine::{EngineRunner, Invocation};
use crate::core::progress;
use crate::core::scanner::{list_dirs, list_photos, list_with_extension};
use crate::error::{PipelineError, PipelineResult, UnitFailure};
use std::fs;
use std::path::{Path, PathBuf};

/// One photo to push through the color engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorJob {
    pub photo: PathBuf,
    pub output: PathBuf,
    /// Folder expected to hold exactly one profile for this photo.
    pub profile_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct ColorReport {
    pub calibrated: usize,
    pub failures: Vec<UnitFailure>,
}

/// The profile file in `dir`. Zero or several candidates is an error; a
/// profile is never borrowed from another photo.
pub fn locate_profile(dir: &Path, extension: &str) -> PipelineResult<PathBuf> {
    let mut profiles = list_with_extension(dir, extension)?;
    if profiles.len() == 1 {
        Ok(profiles.remove(0))
    } else {
        Err(PipelineError::ProfileAmbiguous {
            dir: dir.to_path_buf(),
            found: profiles.len(),
        })
    }
}

/// Applies per-specimen, per-camera color profiles with an external color
/// engine (darktable-cli).
pub struct ColorService<'a> {
    config: &'a PipelineConfig,
    runner: &'a dyn EngineRunner,
    engine: PathBuf,
    format: ImageFormat,
}

impl<'a> ColorService<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        runner: &'a dyn EngineRunner,
        engine: impl Into<PathBuf>,
        format: ImageFormat,
    ) -> Self {
        Self {
            config,
            runner,
            engine: engine.into(),
            format,
        }
    }

    /// Every photo below the sorted root, paired with its output path and
    /// profile folder. Calibration folders are not photos to calibrate.
    pub fn collect_jobs(&self, sorted_root: &Path, output_root: &Path) -> PipelineResult<Vec<ColorJob>> {
        let mut jobs = Vec::new();

        for (session, session_dir) in list_dirs(sorted_root)? {
            let profiles_root = session_dir.join(&self.config.calibration_dir);

            for (specimen, specimen_dir) in list_dirs(&session_dir)? {
                if specimen == self.config.calibration_dir {
                    continue;
                }
                for (camera, camera_dir) in list_dirs(&specimen_dir)? {
                    let out_dir = output_root.join(&session).join(&specimen).join(&camera);
                    let profile_dir = profiles_root.join(&specimen).join(&camera);

                    for photo in list_photos(&camera_dir, self.format)? {
                        let stem = photo
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        jobs.push(ColorJob {
                            output: out_dir.join(format!("{}.tiff", stem)),
                            profile_dir: profile_dir.clone(),
                            photo,
                        });
                    }
                }
            }
        }

        Ok(jobs)
    }

    pub fn run(&self, sorted_root: &Path, output_root: &Path) -> PipelineResult<ColorReport> {
        fs::create_dir_all(output_root)?;
        let jobs = self.collect_jobs(sorted_root, output_root)?;
        log::info!("Color calibrating {} photo(s)", jobs.len());

        let mut report = ColorReport::default();
        let pb = progress::bar(jobs.len(), "color");
        for job in &jobs {
            pb.set_message(job.photo.display().to_string());
            match self.calibrate(job) {
                Ok(()) => report.calibrated += 1,
                Err(e) => {
                    pb.suspend(|| log::warn!("Skipping {}: {}", job.photo.display(), e));
                    report
                        .failures
                        .push(UnitFailure::new(job.photo.display().to_string(), e));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(report)
    }

    pub fn calibrate(&self, job: &ColorJob) -> PipelineResult<()> {
        let profile = locate_profile(&job.profile_dir, &self.config.profile_extension)?;
        if let Some(parent) = job.output.parent() {
            fs::create_dir_all(parent)?;
        }

        let invocation = Invocation::new(&self.engine)
            .arg(&job.photo)
            .arg(&job.output)
            .arg("--icc-file")
            .arg(&profile);
        let unit = job.photo.display().to_string();

        let outcome = self
            .runner
            .run(&invocation)
            .map_err(|e| PipelineError::ExternalEngineFailure {
                engine: invocation.engine_name(),
                unit: unit.clone(),
                status: e.to_string(),
            })?;
        if !outcome.success {
            return Err(PipelineError::ExternalEngineFailure {
                engine: invocation.engine_name(),
                unit,
                status: outcome.status_text(),
            });
        }
        Ok(())
    }
}
