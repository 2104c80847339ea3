use crate::config::PipelineConfig;
use crate::core::scanner::list_dirs;
use crate::error::PipelineResult;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A specimen folder without one of the expected camera subfolders.
///
/// Usually a specimen burst on that camera was shorter than the specimen
/// threshold and ended up in the calibration area instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugRecord {
    pub specimen_dir: PathBuf,
    pub missing_camera: String,
}

impl std::fmt::Display for BugRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is missing: {} camera",
            self.specimen_dir.display(),
            self.missing_camera
        )
    }
}

/// Find specimen folders of one sorted session that lack a camera subfolder.
pub fn check(session_dir: &Path, config: &PipelineConfig) -> PipelineResult<Vec<BugRecord>> {
    let mut records = Vec::new();

    for (name, specimen_dir) in list_dirs(session_dir)? {
        if name == config.calibration_dir || !name.starts_with(&config.specimen_prefix) {
            continue;
        }

        for camera in &config.cameras {
            if !specimen_dir.join(camera).is_dir() {
                records.push(BugRecord {
                    specimen_dir: specimen_dir.clone(),
                    missing_camera: camera.clone(),
                });
            }
        }
    }

    Ok(records)
}

/// Append one line per record to the bug log, creating it if needed.
pub fn append_bug_log(log_path: &Path, records: &[BugRecord]) -> PipelineResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    for record in records {
        writeln!(out, "{}", record)?;
    }

    log::warn!(
        "Recorded {} missing camera folder(s) in {}",
        records.len(),
        log_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_dirs(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    #[test]
    fn test_missing_middle_is_one_record() {
        let temp_dir = TempDir::new().unwrap();
        make_dirs(temp_dir.path(), &["flower1/top", "flower1/bottom"]);

        let records = check(temp_dir.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].missing_camera, "middle");
        assert!(records[0].specimen_dir.ends_with("flower1"));
    }

    #[test]
    fn test_complete_specimen_has_no_records() {
        let temp_dir = TempDir::new().unwrap();
        make_dirs(
            temp_dir.path(),
            &["flower1/top", "flower1/middle", "flower1/bottom"],
        );

        let records = check(temp_dir.path(), &PipelineConfig::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_calibration_area_and_other_folders_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        make_dirs(
            temp_dir.path(),
            &[
                "colorprofiles_namelabels/flower1/top",
                "notes",
                ".hidden_flower",
                "flower2/top",
                "flower2/middle",
            ],
        );

        let records = check(temp_dir.path(), &PipelineConfig::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].specimen_dir.ends_with("flower2"));
        assert_eq!(records[0].missing_camera, "bottom");
    }

    #[test]
    fn test_bug_log_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("bug.txt");
        let record = BugRecord {
            specimen_dir: PathBuf::from("/out/070324/flower3"),
            missing_camera: "top".to_string(),
        };

        append_bug_log(&log_path, &[record.clone()]).unwrap();
        append_bug_log(&log_path, &[record]).unwrap();
        append_bug_log(&log_path, &[]).unwrap();

        let content = fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "/out/070324/flower3 is missing: top camera");
    }
}
