//! Image set resolution: turns an [`InputSpec`] into an ordered candidate list.
//!
//! Folders are listed flat. Zip archives are extracted into a private temporary
//! directory which is then walked recursively; the extraction lives exactly as
//! long as the [`ExtractedArchive`] that owns it.

use crate::models::{CandidateImage, InputSpec, has_supported_extension, sort_candidates};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while enumerating an input.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to read folder {path}: {source}")]
    FolderUnreadable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open archive {path}: {message}")]
    ArchiveUnreadable { path: Utf8PathBuf, message: String },

    #[error("Failed to extract archive {path}: {message}")]
    ExtractionFailed { path: Utf8PathBuf, message: String },

    #[error("Batch folders are resolved when each folder's job runs")]
    BatchInput,
}

impl ResolveError {
    fn extraction(path: &Utf8Path, err: impl ToString) -> Self {
        Self::ExtractionFailed {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// A zip archive unpacked into a process-private temporary directory.
///
/// The directory is removed exactly once: by [`close`](Self::close) or, failing
/// that, on drop. Removal errors are logged and swallowed.
#[derive(Debug)]
pub struct ExtractedArchive {
    archive: Utf8PathBuf,
    root: Utf8PathBuf,
    dir: Option<TempDir>,
}

impl ExtractedArchive {
    /// The zip file this extraction came from.
    pub fn archive(&self) -> &Utf8Path {
        &self.archive
    }

    /// Root of the extracted tree.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Remove the extraction directory now.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("Removed extraction directory {}", self.root),
                Err(e) => tracing::debug!(
                    "Ignoring failure to remove extraction directory {}: {}",
                    self.root,
                    e
                ),
            }
        }
    }
}

impl Drop for ExtractedArchive {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A resolved single input: ordered candidates plus the root they live under.
#[derive(Debug)]
pub struct ResolvedInput {
    pub spec: InputSpec,
    pub root: Utf8PathBuf,
    pub candidates: Vec<CandidateImage>,

    /// Present for zip inputs; dropping it deletes the extracted files.
    pub extraction: Option<ExtractedArchive>,
}

/// Service that enumerates candidate images for folders and zip archives.
#[derive(Debug, Clone, Default)]
pub struct ImageSetResolver;

impl ImageSetResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a folder or zip input.
    ///
    /// Batch lists are rejected with [`ResolveError::BatchInput`]; each batch
    /// folder goes through [`list_folder`](Self::list_folder) when its job runs.
    pub fn resolve(&self, spec: &InputSpec) -> Result<ResolvedInput, ResolveError> {
        match spec {
            InputSpec::Folder(folder) => {
                let candidates = self.list_folder(folder)?;
                Ok(ResolvedInput {
                    spec: spec.clone(),
                    root: folder.clone(),
                    candidates,
                    extraction: None,
                })
            }
            InputSpec::ZipArchive(archive) => {
                let extraction = self.extract_archive(archive)?;
                let candidates = self.walk_tree(extraction.root());
                Ok(ResolvedInput {
                    spec: spec.clone(),
                    root: extraction.root().to_path_buf(),
                    candidates,
                    extraction: Some(extraction),
                })
            }
            InputSpec::BatchFolderList(_) => Err(ResolveError::BatchInput),
        }
    }

    /// Non-recursive listing of `folder`, filtered by extension and sorted.
    pub fn list_folder(&self, folder: &Utf8Path) -> Result<Vec<CandidateImage>, ResolveError> {
        let unreadable = |source| ResolveError::FolderUnreadable {
            path: folder.to_path_buf(),
            source,
        };

        let mut candidates = Vec::new();
        for entry in fs::read_dir(folder).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;

            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("Skipping non UTF-8 file name in {}", folder);
                continue;
            };

            let path = folder.join(&name);
            if !path.is_file() || !has_supported_extension(&path) {
                continue;
            }

            candidates.push(CandidateImage::new(path, name));
        }

        sort_candidates(&mut candidates);
        tracing::debug!("Found {} candidate image(s) in {}", candidates.len(), folder);
        Ok(candidates)
    }

    /// Extract every entry of `archive` into a fresh temporary directory.
    ///
    /// Entries whose names would land outside the extraction root are skipped.
    pub fn extract_archive(&self, archive: &Utf8Path) -> Result<ExtractedArchive, ResolveError> {
        let unreadable = |message: String| ResolveError::ArchiveUnreadable {
            path: archive.to_path_buf(),
            message,
        };

        let file = File::open(archive).map_err(|e| unreadable(e.to_string()))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;

        let dir = tempfile::Builder::new()
            .prefix("pdfmaker_zip_")
            .tempdir()
            .map_err(|e| ResolveError::extraction(archive, e))?;
        let root = utf8_path(dir.path()).map_err(|e| ResolveError::extraction(archive, e))?;

        // From here on the TempDir is owned by `extracted`, so an early return
        // still removes the partial extraction.
        let extracted = ExtractedArchive {
            archive: archive.to_path_buf(),
            root,
            dir: Some(dir),
        };

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| ResolveError::extraction(archive, e))?;

            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!("Skipping unsafe archive entry: {}", entry.name());
                continue;
            };
            let out_path = extracted.root.as_std_path().join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| ResolveError::extraction(archive, e))?;
            } else {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| ResolveError::extraction(archive, e))?;
                }
                let mut outfile =
                    File::create(&out_path).map_err(|e| ResolveError::extraction(archive, e))?;
                io::copy(&mut entry, &mut outfile)
                    .map_err(|e| ResolveError::extraction(archive, e))?;
            }
        }

        tracing::info!(
            "Extracted {} entries from {} into {}",
            zip.len(),
            archive,
            extracted.root
        );
        Ok(extracted)
    }

    /// Recursive walk of `root`; display names are `/`-separated relative paths.
    pub fn walk_tree(&self, root: &Utf8Path) -> Vec<CandidateImage> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                tracing::warn!("Skipping non UTF-8 path: {}", entry.path().display());
                continue;
            };
            if !has_supported_extension(path) {
                continue;
            }

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let display_name = relative
                .components()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("/");

            candidates.push(CandidateImage::new(path, display_name));
        }

        sort_candidates(&mut candidates);
        tracing::debug!("Found {} candidate image(s) under {}", candidates.len(), root);
        candidates
    }
}

fn utf8_path(path: &Path) -> Result<Utf8PathBuf, String> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| format!("path is not valid UTF-8: {}", p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_folder() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_list_folder_filters_and_sorts() {
        let (_guard, folder) = temp_folder();
        for name in ["b.PNG", "a.jpg", "notes.txt", "C.gif", "archive.zip"] {
            fs::write(folder.join(name), b"x").unwrap();
        }
        fs::create_dir(folder.join("d.png")).unwrap();

        let candidates = ImageSetResolver::new().list_folder(&folder).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.display_name.as_str()).collect();

        assert_eq!(names, vec!["a.jpg", "b.PNG", "C.gif"]);
        assert_eq!(candidates[0].path, folder.join("a.jpg"));
    }

    #[test]
    fn test_list_folder_does_not_recurse() {
        let (_guard, folder) = temp_folder();
        fs::create_dir(folder.join("sub")).unwrap();
        fs::write(folder.join("sub").join("inner.png"), b"x").unwrap();
        fs::write(folder.join("top.png"), b"x").unwrap();

        let candidates = ImageSetResolver::new().list_folder(&folder).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].display_name, "top.png");
    }

    #[test]
    fn test_missing_folder_names_path() {
        let (_guard, folder) = temp_folder();
        let missing = folder.join("does-not-exist");

        let err = ImageSetResolver::new().list_folder(&missing).unwrap_err();
        assert!(matches!(err, ResolveError::FolderUnreadable { .. }));
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_batch_input_is_not_resolved_up_front() {
        let spec = InputSpec::BatchFolderList(vec![Utf8PathBuf::from("/a")]);
        let err = ImageSetResolver::new().resolve(&spec).unwrap_err();
        assert!(matches!(err, ResolveError::BatchInput));
    }

    #[test]
    fn test_corrupt_archive_is_resolution_error() {
        let (_guard, folder) = temp_folder();
        let archive = folder.join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = ImageSetResolver::new()
            .resolve(&InputSpec::ZipArchive(archive))
            .unwrap_err();
        assert!(matches!(err, ResolveError::ArchiveUnreadable { .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;
        use std::io::Write;

        const EXTENSIONS: [&str; 7] = ["png", "JPG", "jpeg", "Gif", "bmp", "txt", "pdf"];

        fn file_names() -> impl Strategy<Value = Vec<String>> {
            prop::collection::hash_set("[a-z0-9]{1,8}", 0..12).prop_flat_map(|stems| {
                let stems: Vec<String> = stems.into_iter().collect();
                let count = stems.len();
                prop::collection::vec(0..EXTENSIONS.len(), count).prop_map(move |exts| {
                    stems
                        .iter()
                        .zip(exts)
                        .map(|(stem, ext)| format!("{stem}.{}", EXTENSIONS[ext]))
                        .collect()
                })
            })
        }

        fn is_sorted(names: &[&str]) -> bool {
            names
                .windows(2)
                .all(|w| w[0].to_lowercase() <= w[1].to_lowercase())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn folder_listing_counts_and_orders(names in file_names()) {
                let (_guard, folder) = temp_folder();
                for name in &names {
                    fs::write(folder.join(name), b"x").unwrap();
                }

                let candidates = ImageSetResolver::new().list_folder(&folder).unwrap();
                let listed: Vec<&str> = candidates.iter().map(|c| c.display_name.as_str()).collect();
                let expected = names
                    .iter()
                    .filter(|n| has_supported_extension(Utf8Path::new(n)))
                    .count();

                prop_assert_eq!(listed.len(), expected);
                prop_assert!(is_sorted(&listed));
            }

            #[test]
            fn flat_zip_matches_folder_listing(names in file_names()) {
                let (_guard, folder) = temp_folder();
                let source = folder.join("source");
                fs::create_dir(&source).unwrap();
                let archive = folder.join("source.zip");

                let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
                for name in &names {
                    fs::write(source.join(name), b"x").unwrap();
                    writer
                        .start_file(name.as_str(), zip::write::SimpleFileOptions::default())
                        .unwrap();
                    writer.write_all(b"x").unwrap();
                }
                writer.finish().unwrap();

                let resolver = ImageSetResolver::new();
                let from_folder: HashSet<String> = resolver
                    .list_folder(&source)
                    .unwrap()
                    .into_iter()
                    .map(|c| c.display_name)
                    .collect();
                let resolved = resolver.resolve(&InputSpec::ZipArchive(archive)).unwrap();
                let from_zip: Vec<&str> = resolved
                    .candidates
                    .iter()
                    .map(|c| c.display_name.as_str())
                    .collect();

                prop_assert_eq!(from_zip.len(), from_folder.len());
                prop_assert!(from_zip.iter().all(|n| from_folder.contains(*n)));
                prop_assert!(is_sorted(&from_zip));
            }
        }
    }
}
