use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image file extensions accepted by the resolver (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// What the user selected as the source of a conversion.
///
/// Once a job starts, the `InputSpec` it was built from is never mutated; selecting a
/// new input replaces the whole value (and drops any extraction it owned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// A flat folder of images (not recursed).
    Folder(Utf8PathBuf),

    /// A zip archive, extracted to a private temporary directory.
    ZipArchive(Utf8PathBuf),

    /// Folders registered for batch mode, in registration order.
    BatchFolderList(Vec<Utf8PathBuf>),
}

impl InputSpec {
    /// Classify a single dropped/selected path as a folder or a zip archive.
    ///
    /// Returns `None` for anything that is neither a directory nor a `.zip` file.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Option<Self> {
        let path = path.into();
        if path.is_dir() {
            Some(Self::Folder(path))
        } else if is_zip_path(&path) && path.is_file() {
            Some(Self::ZipArchive(path))
        } else {
            None
        }
    }

    /// Path shown to the user for this input.
    pub fn label(&self) -> String {
        match self {
            Self::Folder(path) | Self::ZipArchive(path) => path.to_string(),
            Self::BatchFolderList(folders) => format!("{} batch folder(s)", folders.len()),
        }
    }
}

/// True when the path carries a `.zip` extension (any case).
pub fn is_zip_path(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// True when the file name has one of [`SUPPORTED_EXTENSIONS`].
pub fn has_supported_extension(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// A file that looks like an image by extension but has not been decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    pub path: Utf8PathBuf,

    /// Basename for flat folders, `/`-separated relative path for archives.
    pub display_name: String,
}

impl CandidateImage {
    pub fn new(path: impl Into<Utf8PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }
}

/// Sort candidates into page order: display name, case-insensitive, ascending.
///
/// Ties on the lowercased name fall back to the exact name so the order never
/// depends on directory listing order.
pub fn sort_candidates(candidates: &mut [CandidateImage]) {
    candidates.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

/// Outcome of checking every candidate of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Candidates that decoded, in resolver order.
    pub valid: Vec<CandidateImage>,

    /// Display names of candidates that failed to decode, in resolver order.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A job with nothing valid cannot produce a PDF.
    pub fn is_invalid(&self) -> bool {
        self.valid.is_empty()
    }
}

/// Page-size setting as chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    #[default]
    Fit,
    Shrink,
    Original,
}

impl PageMode {
    /// Label used by the front end.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fit => "A4 (fit)",
            Self::Shrink => "A4 (no upscale)",
            Self::Original => "Original size",
        }
    }
}

impl fmt::Display for PageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fit" | "a4" | "a4 (fit)" => Ok(Self::Fit),
            "shrink" | "no-upscale" | "a4 (no upscale)" => Ok(Self::Shrink),
            "original" | "original size" => Ok(Self::Original),
            other => Err(format!(
                "unknown page mode '{other}' (expected fit, shrink or original)"
            )),
        }
    }
}

/// Page geometry rule applied to every page of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// A4 page, image scaled up or down to fit.
    FitA4,
    /// A4 page, image only ever scaled down.
    ShrinkA4,
    /// Page equals the image size, no scaling.
    Original,
}

/// One conversion execution. Built fresh for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Folder (or extraction root) the candidates were resolved from.
    pub input_root: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    pub policy: LayoutPolicy,
}

/// Per-folder status in a batch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Ok,
    /// PDF written, but this many files were skipped as unreadable.
    Warning(usize),
    Error(String),
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Warning(count) => write!(f, "Warning ({count} skipped)"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// One line of the batch summary, in folder registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResultEntry {
    pub source_label: String,
    pub status: BatchStatus,
    pub output_path: Option<Utf8PathBuf>,
}

impl BatchResultEntry {
    pub fn is_error(&self) -> bool {
        matches!(self.status, BatchStatus::Error(_))
    }
}
