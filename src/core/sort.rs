use crate::config::PipelineConfig;
use crate::core::assemble::{Area, OutputLayout, SpecimenCounters, plan_camera};
use crate::core::capture::{Capture, ImageFormat};
use crate::core::consistency::{BugRecord, append_bug_log, check};
use crate::core::metadata::MetadataSource;
use crate::core::scanner::{list_dirs, list_photos};
use crate::core::segment::segment;
use crate::error::{PipelineResult, UnitFailure};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

#[derive(Debug, Default)]
pub struct SortReport {
    pub sessions: usize,
    pub streams: usize,
    pub photos_read: usize,
    pub specimen_copies: usize,
    pub calibration_copies: usize,
    pub bugs: Vec<BugRecord>,
    pub failures: Vec<UnitFailure>,
}

impl SortReport {
    pub fn photos_copied(&self) -> usize {
        self.specimen_copies + self.calibration_copies
    }

    fn merge(&mut self, other: SortReport) {
        self.sessions += other.sessions;
        self.streams += other.streams;
        self.photos_read += other.photos_read;
        self.specimen_copies += other.specimen_copies;
        self.calibration_copies += other.calibration_copies;
        self.bugs.extend(other.bugs);
        self.failures.extend(other.failures);
    }
}

/// Groups raw captures of every date-session into specimen folders.
pub struct SortService<'a> {
    config: &'a PipelineConfig,
    metadata: &'a dyn MetadataSource,
    format: ImageFormat,
}

impl<'a> SortService<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        metadata: &'a dyn MetadataSource,
        format: ImageFormat,
    ) -> Self {
        Self {
            config,
            metadata,
            format,
        }
    }

    /// Sort `input/<session>/<camera>/*` into `output/<session>/...`.
    ///
    /// Sessions run in parallel, each with its own counters and output
    /// folder. A failing camera stream or session is reported and skipped;
    /// only an unusable input or output root fails the whole run.
    pub fn run(&self, input: &Path, output: &Path) -> PipelineResult<SortReport> {
        fs::create_dir_all(output)?;
        let sessions = list_dirs(input)?;
        log::info!(
            "Sorting {} date-session(s) from {}",
            sessions.len(),
            input.display()
        );

        let outcomes: Vec<SortReport> = sessions
            .par_iter()
            .map(|(name, dir)| match self.sort_session(name, dir, &output.join(name)) {
                Ok(report) => report,
                Err(e) => SortReport {
                    sessions: 1,
                    failures: vec![UnitFailure::new(name.clone(), e)],
                    ..SortReport::default()
                },
            })
            .collect();

        let mut report = SortReport::default();
        for outcome in outcomes {
            report.merge(outcome);
        }

        append_bug_log(&output.join(&self.config.bug_log), &report.bugs)?;
        Ok(report)
    }

    /// Sort one date-session. Camera streams run one after another.
    pub fn sort_session(
        &self,
        session: &str,
        session_dir: &Path,
        output_dir: &Path,
    ) -> PipelineResult<SortReport> {
        let layout = OutputLayout::new(output_dir, self.config);
        let mut counters = SpecimenCounters::new();
        let mut report = SortReport {
            sessions: 1,
            ..SortReport::default()
        };

        for camera in &self.config.cameras {
            let camera_dir = session_dir.join(camera);
            if !camera_dir.is_dir() {
                log::warn!("{}: no {} camera folder", session, camera);
                continue;
            }
            report.streams += 1;

            let unit = format!("{}/{}", session, camera);
            let captures = match self.read_stream(session, camera, &camera_dir) {
                Ok(captures) => captures,
                Err(e) => {
                    log::error!("{}: {}", unit, e);
                    report.failures.push(UnitFailure::new(unit, e));
                    continue;
                }
            };
            report.photos_read += captures.len();

            let stream: Vec<(Capture, _)> = captures
                .into_iter()
                .map(|capture| {
                    let taken_at = capture.taken_at;
                    (capture, taken_at)
                })
                .collect();
            let segments = segment(&stream, self.config.max_gap());
            let placements = plan_camera(
                segments,
                camera,
                &mut counters,
                self.config.min_specimen_size,
            );
            log::info!(
                "{}: {} segment(s), {} specimen(s)",
                unit,
                placements.len(),
                placements.iter().filter(|p| p.area == Area::Specimen).count()
            );

            for placement in &placements {
                match layout.apply(placement) {
                    Ok(copied) => match placement.area {
                        Area::Specimen => report.specimen_copies += copied,
                        Area::Calibration => report.calibration_copies += copied,
                    },
                    Err(e) => {
                        log::error!("{}: {}", unit, e);
                        report.failures.push(UnitFailure::new(unit.clone(), e));
                        break;
                    }
                }
            }
        }

        // Copies already made stay counted when the check itself fails.
        if output_dir.is_dir() {
            match check(output_dir, self.config) {
                Ok(bugs) => report.bugs = bugs,
                Err(e) => {
                    log::error!("{}: consistency check failed: {}", session, e);
                    report.failures.push(UnitFailure::new(session.to_string(), e));
                }
            }
        }
        Ok(report)
    }

    /// Read capture times for one camera stream through a single metadata
    /// session. The first unreadable file aborts the stream.
    pub fn read_stream(
        &self,
        session: &str,
        camera: &str,
        camera_dir: &Path,
    ) -> PipelineResult<Vec<Capture>> {
        let photos = list_photos(camera_dir, self.format)?;
        if photos.is_empty() {
            return Ok(Vec::new());
        }

        let mut metadata = self.metadata.open_session()?;
        let mut captures = Vec::with_capacity(photos.len());
        for path in photos {
            let taken_at = metadata.read_capture_time(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            captures.push(Capture {
                name,
                path,
                taken_at,
                camera: camera.to_string(),
                session: session.to_string(),
            });
        }
        Ok(captures)
    }
}
