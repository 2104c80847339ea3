use chrono::NaiveDateTime;
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// One photograph read from a camera stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub path: PathBuf,
    pub taken_at: NaiveDateTime,
    pub camera: String,
    pub session: String,
}

/// Image formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ImageFormat {
    #[value(name = "CR3")]
    Cr3,
    #[value(name = "JPEG")]
    Jpeg,
    #[value(name = "PNG")]
    Png,
    #[value(name = "TIFF")]
    Tiff,
    #[value(name = "DNG")]
    Dng,
}

impl ImageFormat {
    /// Lowercase extensions that belong to this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Cr3 => &["cr3"],
            ImageFormat::Jpeg => &["jpg", "jpeg"],
            ImageFormat::Png => &["png"],
            ImageFormat::Tiff => &["tif", "tiff"],
            ImageFormat::Dng => &["dng"],
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions().contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Cr3 => "CR3",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Dng => "DNG",
        };
        f.write_str(name)
    }
}
