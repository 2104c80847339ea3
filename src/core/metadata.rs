//! Capture-time extraction.
//!
//! A [`MetadataSource`] opens one [`MetadataSession`] per camera stream so
//! that backends with a costly startup (an external `exiftool` process) pay
//! it once per stream rather than once per file.

use crate::error::{PipelineError, PipelineResult};
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// EXIF datetime format: "YYYY:MM:DD HH:MM:SS"
pub const CAPTURE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub trait MetadataSession {
    /// Original capture date/time of the photo at `path`.
    fn read_capture_time(&mut self, path: &Path) -> PipelineResult<NaiveDateTime>;
}

pub trait MetadataSource: Sync {
    fn open_session(&self) -> PipelineResult<Box<dyn MetadataSession + '_>>;
}

pub fn parse_capture_time(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('\0');
    match NaiveDateTime::parse_from_str(trimmed, CAPTURE_TIME_FORMAT) {
        Ok(dt) => Some(dt),
        Err(_) => {
            log::warn!("Failed to parse capture time: {:?}", raw);
            None
        }
    }
}

/// Backend driving an external `exiftool` in `-stay_open` mode.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the stay-open flags, e.g. the script path
    /// when `program` is `perl`.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl MetadataSource for ExifTool {
    fn open_session(&self) -> PipelineResult<Box<dyn MetadataSession + '_>> {
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PipelineError::MetadataService {
                message: format!("failed to start {}: {}", self.program.display(), e),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok(Box::new(ExifToolSession {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
            _ => {
                let _ = child.kill();
                Err(PipelineError::MetadataService {
                    message: "exiftool pipes unavailable".to_string(),
                })
            }
        }
    }
}

pub struct ExifToolSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl MetadataSession for ExifToolSession {
    fn read_capture_time(&mut self, path: &Path) -> PipelineResult<NaiveDateTime> {
        let file_arg = exiftool_file_arg(path)?;
        writeln!(self.stdin, "-s3")?;
        writeln!(self.stdin, "-DateTimeOriginal")?;
        writeln!(self.stdin, "{}", file_arg)?;
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        // Output ends with a `{ready}` line.
        let mut value: Option<String> = None;
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(PipelineError::MetadataService {
                    message: "exiftool exited unexpectedly".to_string(),
                });
            }
            let line = line.trim_end();
            if line == "{ready}" {
                break;
            }
            if value.is_none() && !line.is_empty() {
                value = Some(line.to_string());
            }
        }

        value
            .as_deref()
            .and_then(parse_capture_time)
            .ok_or_else(|| PipelineError::MetadataMissing {
                path: path.to_path_buf(),
            })
    }
}

/// A path as one line of an exiftool argument file. Names exiftool would
/// read as an option get a `./` prefix; non-UTF-8 or multi-line paths cannot
/// be passed at all.
fn exiftool_file_arg(path: &Path) -> PipelineResult<String> {
    let raw = path.to_str().ok_or_else(|| PipelineError::MetadataService {
        message: format!("path is not valid UTF-8: {}", path.display()),
    })?;
    if raw.contains(['\n', '\r']) {
        return Err(PipelineError::MetadataService {
            message: format!("path contains a line break: {:?}", raw),
        });
    }
    if raw.starts_with('-') {
        Ok(format!("./{}", raw))
    } else {
        Ok(raw.to_string())
    }
}

impl Drop for ExifToolSession {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "-stay_open");
        let _ = writeln!(self.stdin, "False");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

/// In-process EXIF reader for containers `kamadak-exif` understands
/// (JPEG, TIFF, DNG, PNG, HEIF, WebP).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_capture_time(&self, file_path: &Path) -> PipelineResult<NaiveDateTime> {
        let missing = || PipelineError::MetadataMissing {
            path: file_path.to_path_buf(),
        };

        let file = File::open(file_path)?;
        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(e) => {
                log::debug!("No EXIF in {}: {}", file_path.display(), e);
                return Err(missing());
            }
        };

        exif_reader
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .and_then(|field| self.field_to_string(&field.value))
            .and_then(|raw| parse_capture_time(&raw))
            .ok_or_else(missing)
    }

    fn field_to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Ascii(vec) => vec.first().map(|ascii_val| {
                String::from_utf8_lossy(ascii_val)
                    .trim_end_matches('\0')
                    .to_string()
            }),
            _ => None,
        }
    }
}

impl MetadataSession for ExifService {
    fn read_capture_time(&mut self, path: &Path) -> PipelineResult<NaiveDateTime> {
        self.extract_capture_time(path)
    }
}

impl MetadataSource for ExifService {
    fn open_session(&self) -> PipelineResult<Box<dyn MetadataSession + '_>> {
        Ok(Box::new(*self))
    }
}
