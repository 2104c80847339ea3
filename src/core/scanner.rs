use crate::core::capture::ImageFormat;
use crate::error::PipelineResult;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Photos of `format` directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_photos(dir: &Path, format: ImageFormat) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut photos = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if is_hidden(&name) || !entry.file_type().is_file() {
            continue;
        }
        if format.matches(entry.path()) {
            photos.push(entry.into_path());
        }
    }
    Ok(photos)
}

/// Files with extension `ext` (case-insensitive) directly inside `dir`.
pub fn list_with_extension(dir: &Path, ext: &str) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let wanted = ext.to_lowercase();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Non-hidden subdirectories of `dir` as `(name, path)`, sorted by name.
pub fn list_dirs(dir: &Path) -> PipelineResult<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) || !entry.file_type().is_dir() {
            continue;
        }
        dirs.push((name, entry.into_path()));
    }
    Ok(dirs)
}
