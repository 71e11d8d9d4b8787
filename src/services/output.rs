//! Output path derivation shared by single and batch jobs.

use crate::models::Settings;
use camino::{Utf8Path, Utf8PathBuf};

/// Base name used when the input path has no usable final component.
const FALLBACK_BASE: &str = "output";

/// Compute where the PDF for `input` goes.
///
/// The base name is the input's final component (zip extension stripped for
/// archives). The directory is the fixed output directory when it is enabled
/// and non-blank, otherwise the zip's parent or the folder itself.
pub fn derive_output_path(input: &Utf8Path, is_zip: bool, settings: &Settings) -> Utf8PathBuf {
    let base = if is_zip {
        input.file_stem()
    } else {
        input.file_name()
    }
    .filter(|name| !name.is_empty())
    .unwrap_or(FALLBACK_BASE);

    let dir = match settings.effective_fixed_dir() {
        Some(fixed) => Utf8PathBuf::from(fixed),
        None if is_zip => input
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default(),
        None => input.to_path_buf(),
    };

    ensure_pdf_extension(dir.join(format!("{base}.pdf")))
}

/// Append `.pdf` unless the file name already ends with it (any case).
pub fn ensure_pdf_extension(path: Utf8PathBuf) -> Utf8PathBuf {
    let has_suffix = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if has_suffix {
        path
    } else {
        Utf8PathBuf::from(format!("{path}.pdf"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> Settings {
        Settings {
            use_fixed_output: false,
            fixed_output_dir: "/ignored".into(),
        }
    }

    #[test]
    fn test_folder_without_fixed_dir_writes_inside_folder() {
        let output = derive_output_path(Utf8Path::new("/photos/trip"), false, &disabled());
        assert_eq!(output, Utf8PathBuf::from("/photos/trip/trip.pdf"));
    }

    #[test]
    fn test_zip_with_fixed_dir() {
        let settings = Settings::with_output_dir("/out");
        let output = derive_output_path(Utf8Path::new("/in/album.zip"), true, &settings);
        assert_eq!(output, Utf8PathBuf::from("/out/album.pdf"));
    }

    #[test]
    fn test_zip_without_fixed_dir_writes_next_to_archive() {
        let output = derive_output_path(Utf8Path::new("/in/album.ZIP"), true, &disabled());
        assert_eq!(output, Utf8PathBuf::from("/in/album.pdf"));
    }

    #[test]
    fn test_enabled_but_blank_fixed_dir_falls_back_to_input() {
        let settings = Settings::with_output_dir("  ");
        let output = derive_output_path(Utf8Path::new("/photos/trip"), false, &settings);
        assert_eq!(output, Utf8PathBuf::from("/photos/trip/trip.pdf"));
    }

    #[test]
    fn test_root_folder_uses_fallback_name() {
        let output = derive_output_path(Utf8Path::new("/"), false, &disabled());
        assert_eq!(output.file_name(), Some("output.pdf"));
    }

    #[test]
    fn test_ensure_pdf_extension() {
        assert_eq!(
            ensure_pdf_extension(Utf8PathBuf::from("/a/report")),
            Utf8PathBuf::from("/a/report.pdf")
        );
        assert_eq!(
            ensure_pdf_extension(Utf8PathBuf::from("/a/report.PDF")),
            Utf8PathBuf::from("/a/report.PDF")
        );
        assert_eq!(
            ensure_pdf_extension(Utf8PathBuf::from("/a/report.v2")),
            Utf8PathBuf::from("/a/report.v2.pdf")
        );
    }
}
