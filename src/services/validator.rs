use crate::models::{CandidateImage, ValidationResult};
use image::ImageReader;

/// Checks that each candidate can be opened as an image.
///
/// Only the header is parsed (format detection plus dimensions), so a
/// truncated pixel stream can still pass here and fail later in assembly.
#[derive(Debug, Clone, Default)]
pub struct ImageValidator;

impl ImageValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `candidates` in order.
    ///
    /// `on_progress(index, total, message)` is called *before* each file is
    /// opened, with a 1-based index. A failing file is recorded by display name
    /// and never stops the run.
    pub fn validate<F>(&self, candidates: &[CandidateImage], mut on_progress: F) -> ValidationResult
    where
        F: FnMut(usize, usize, String),
    {
        let total = candidates.len();
        let mut result = ValidationResult::default();

        for (i, candidate) in candidates.iter().enumerate() {
            let index = i + 1;
            on_progress(
                index,
                total,
                format!("Checking {}/{}: {}", index, total, candidate.display_name),
            );

            match self.check(candidate) {
                Ok((width, height)) => {
                    tracing::debug!("{} is {}x{}", candidate.display_name, width, height);
                    result.valid.push(candidate.clone());
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable image {}: {}", candidate.display_name, e);
                    result.warnings.push(candidate.display_name.clone());
                }
            }
        }

        tracing::info!(
            "Validated {} candidate(s): {} valid, {} skipped",
            total,
            result.valid.len(),
            result.warnings.len()
        );
        result
    }

    /// Read the header of one image and return its dimensions.
    pub fn check(&self, candidate: &CandidateImage) -> image::ImageResult<(u32, u32)> {
        ImageReader::open(&candidate.path)?
            .with_guessed_format()?
            .into_dimensions()
    }
}
