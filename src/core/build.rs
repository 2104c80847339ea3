use crate::config::PipelineConfig;
use crate::core::capture::ImageFormat;
use crate::core::engine::{EngineRunner, Invocation};
use crate::core::progress;
use crate::core::scanner::{list_dirs, list_photos};
use crate::error::{PipelineError, PipelineResult, UnitFailure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File the reconstruction script reads from its working directory.
pub const TEMP_CONFIG_NAME: &str = "temp_config.json";

/// Per-project input handed to the reconstruction engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub photo_files: Vec<PathBuf>,
    pub project_name: String,
}

/// Where a specimen's project is saved and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTarget {
    pub project_dir: PathBuf,
    pub project_name: String,
}

impl ProjectTarget {
    /// Specimen folders renamed to `species_site_accession_replicate` are
    /// grouped by species; anything else stays grouped by date-session.
    pub fn for_specimen(
        config: &PipelineConfig,
        output_root: &Path,
        session: &str,
        specimen: &str,
    ) -> Self {
        let parts: Vec<&str> = specimen.split('_').collect();
        match parts.as_slice() {
            [species, site, accession, replicate]
                if parts.iter().all(|p| !p.is_empty()) =>
            {
                Self {
                    project_dir: output_root.join(species),
                    project_name: format!(
                        "{}_{}_{}_{}",
                        config.project_prefix, site, accession, replicate
                    ),
                }
            }
            _ => Self {
                project_dir: output_root.join(session),
                project_name: format!("{}_{}", session, specimen),
            },
        }
    }
}

/// Removes the temporary config when dropped, whatever happened in between.
struct TempConfig {
    path: PathBuf,
}

impl TempConfig {
    /// The guard exists before the first byte is written, so a partial file
    /// is removed too.
    fn write(dir: &Path, config: &ReconstructionConfig) -> PipelineResult<Self> {
        let raw = serde_json::to_vec_pretty(config)?;
        let guard = Self {
            path: dir.join(TEMP_CONFIG_NAME),
        };
        fs::write(&guard.path, raw)?;
        Ok(guard)
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub unit: String,
    pub photos: Vec<PathBuf>,
    pub target: ProjectTarget,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: usize,
    pub failures: Vec<UnitFailure>,
}

/// Builds one 3D model per specimen with an external reconstruction engine
/// (Metashape running a project script).
pub struct BuildService<'a> {
    config: &'a PipelineConfig,
    runner: &'a dyn EngineRunner,
    engine: PathBuf,
    script: PathBuf,
    format: ImageFormat,
}

impl<'a> BuildService<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        runner: &'a dyn EngineRunner,
        engine: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        format: ImageFormat,
    ) -> Self {
        Self {
            config,
            runner,
            engine: engine.into(),
            script: script.into(),
            format,
        }
    }

    /// One job per specimen folder of every session in the color-calibrated
    /// root, with absolute photo paths from all of its camera folders.
    pub fn collect_jobs(&self, colored_root: &Path, output_root: &Path) -> PipelineResult<Vec<BuildJob>> {
        let mut jobs = Vec::new();

        for (session, session_dir) in list_dirs(colored_root)? {
            for (specimen, specimen_dir) in list_dirs(&session_dir)? {
                if specimen == self.config.calibration_dir {
                    continue;
                }

                let mut photos = Vec::new();
                for (_, camera_dir) in list_dirs(&specimen_dir)? {
                    for photo in list_photos(&camera_dir, self.format)? {
                        photos.push(std::path::absolute(&photo)?);
                    }
                }
                photos.sort();

                jobs.push(BuildJob {
                    unit: format!("{}/{}", session, specimen),
                    photos,
                    target: ProjectTarget::for_specimen(
                        self.config,
                        output_root,
                        &session,
                        &specimen,
                    ),
                });
            }
        }

        Ok(jobs)
    }

    pub fn run(&self, colored_root: &Path, output_root: &Path) -> PipelineResult<BuildReport> {
        fs::create_dir_all(output_root)?;
        let output_root = std::path::absolute(output_root)?;
        let jobs = self.collect_jobs(colored_root, &output_root)?;
        log::info!("Building {} specimen model(s)", jobs.len());

        let mut report = BuildReport::default();
        let pb = progress::bar(jobs.len(), "build");
        for job in &jobs {
            pb.set_message(job.target.project_name.clone());
            let result = if job.photos.is_empty() {
                Err(PipelineError::NoPhotos {
                    unit: job.unit.clone(),
                    format: self.format.to_string(),
                })
            } else {
                pb.suspend(|| self.build(job))
            };

            match result {
                Ok(()) => {
                    log::info!("Built project {}", job.target.project_name);
                    report.built += 1;
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", job.unit, e);
                    report.failures.push(UnitFailure::new(job.unit.clone(), e));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(report)
    }

    /// Run the engine for one specimen with its temporary config in place.
    pub fn build(&self, job: &BuildJob) -> PipelineResult<()> {
        fs::create_dir_all(&job.target.project_dir)?;
        let _config = TempConfig::write(
            &job.target.project_dir,
            &ReconstructionConfig {
                photo_files: job.photos.clone(),
                project_name: job.target.project_name.clone(),
            },
        )?;

        let invocation = Invocation::new(&self.engine)
            .arg("-r")
            .arg(&self.script)
            .current_dir(&job.target.project_dir);

        let outcome = self
            .runner
            .run(&invocation)
            .map_err(|e| PipelineError::ExternalEngineFailure {
                engine: invocation.engine_name(),
                unit: job.unit.clone(),
                status: e.to_string(),
            })?;
        if !outcome.success {
            return Err(PipelineError::ExternalEngineFailure {
                engine: invocation.engine_name(),
                unit: job.unit.clone(),
                status: outcome.status_text(),
            });
        }
        Ok(())
    }
}
