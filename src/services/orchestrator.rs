//! Job orchestration: one single-input job, or a sequential batch of folder jobs.
//!
//! The runner itself is synchronous. Callers put it on a blocking worker and
//! forward the emitted [`JobEvent`]s to the front end; events are emitted in
//! the order the work happens.

use crate::metrics::Metrics;
use crate::models::{BatchResultEntry, BatchStatus, CandidateImage, Job, LayoutPolicy, Settings};
use crate::services::assembler::{AssemblyError, PdfAssembler, WriteError};
use crate::services::output::derive_output_path;
use crate::services::resolver::{ImageSetResolver, ResolveError};
use crate::services::validator::ImageValidator;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Progress text emitted right before assembly starts.
pub const GENERATING_MESSAGE: &str = "Generating PDF...";

/// Errors that end a job. Their messages are what the user sees.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("No valid images found.")]
    NoValidImages,

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Messages from a running job to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress {
        current: usize,
        total: usize,
        message: String,
    },

    /// Single job finished and wrote `output_path`.
    Completed {
        output_path: Utf8PathBuf,
        warnings: Vec<String>,
    },

    /// Single job failed; nothing was written.
    Failed { message: String },

    /// Batch finished; one entry per folder in registration order.
    BatchCompleted { results: Vec<BatchResultEntry> },
}

impl JobEvent {
    /// True for the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// Executes jobs: validate, then assemble and write.
#[derive(Debug, Clone)]
pub struct JobRunner {
    resolver: ImageSetResolver,
    validator: ImageValidator,
    metrics: Arc<Metrics>,
}

impl JobRunner {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            resolver: ImageSetResolver::new(),
            validator: ImageValidator::new(),
            metrics,
        }
    }

    /// Run one job over already-resolved `candidates`.
    ///
    /// Emits progress for every candidate, then [`GENERATING_MESSAGE`], then
    /// exactly one terminal event.
    pub fn run_single<F>(&self, job: &Job, candidates: &[CandidateImage], mut emit: F)
    where
        F: FnMut(JobEvent),
    {
        tracing::info!(
            "Starting job for {} -> {} ({:?}, {} candidate(s))",
            job.input_root,
            job.output_path,
            job.policy,
            candidates.len()
        );

        let terminal = match self.execute(candidates, &job.output_path, job.policy, &mut emit) {
            Ok(warnings) => JobEvent::Completed {
                output_path: job.output_path.clone(),
                warnings,
            },
            Err(e) => {
                tracing::error!("Job for {} failed: {}", job.input_root, e);
                JobEvent::Failed {
                    message: e.to_string(),
                }
            }
        };

        emit(terminal);
    }

    /// Run every folder in `folders`, in order, and report one entry per folder.
    ///
    /// A failing folder is recorded and the batch moves on. Before each folder
    /// a progress event `Processing i/n: <folder>` is emitted; the terminal
    /// [`JobEvent::BatchCompleted`] carries the same list that is returned.
    pub fn run_batch<F>(
        &self,
        folders: &[Utf8PathBuf],
        settings: &Settings,
        policy: LayoutPolicy,
        mut emit: F,
    ) -> Vec<BatchResultEntry>
    where
        F: FnMut(JobEvent),
    {
        let total = folders.len();
        let mut results = Vec::with_capacity(total);
        tracing::info!("Starting batch of {} folder(s)", total);

        for (i, folder) in folders.iter().enumerate() {
            emit(JobEvent::Progress {
                current: i + 1,
                total,
                message: format!("Processing {}/{}: {}", i + 1, total, folder),
            });

            let output_path = derive_output_path(folder, false, settings);
            let entry = match self.run_folder(folder, &output_path, policy) {
                Ok(warnings) if warnings.is_empty() => BatchResultEntry {
                    source_label: folder.to_string(),
                    status: BatchStatus::Ok,
                    output_path: Some(output_path),
                },
                Ok(warnings) => BatchResultEntry {
                    source_label: folder.to_string(),
                    status: BatchStatus::Warning(warnings.len()),
                    output_path: Some(output_path),
                },
                Err(e) => {
                    tracing::warn!("Batch folder {} failed: {}", folder, e);
                    BatchResultEntry {
                        source_label: folder.to_string(),
                        status: BatchStatus::Error(e.to_string()),
                        output_path: None,
                    }
                }
            };
            results.push(entry);
        }

        let failed = results.iter().filter(|r| r.is_error()).count();
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            total - failed,
            failed
        );

        emit(JobEvent::BatchCompleted {
            results: results.clone(),
        });
        results
    }

    fn run_folder(
        &self,
        folder: &Utf8Path,
        output_path: &Utf8Path,
        policy: LayoutPolicy,
    ) -> Result<Vec<String>, JobError> {
        let candidates = match self.resolver.list_folder(folder) {
            Ok(candidates) => candidates,
            Err(e) => {
                self.metrics.record_job_failed();
                return Err(e.into());
            }
        };

        // Per-image progress stays out of the batch stream.
        self.execute(&candidates, output_path, policy, &mut |_| {})
    }

    /// Validate, assemble and write. Returns the skipped display names.
    fn execute(
        &self,
        candidates: &[CandidateImage],
        output_path: &Utf8Path,
        policy: LayoutPolicy,
        emit: &mut dyn FnMut(JobEvent),
    ) -> Result<Vec<String>, JobError> {
        let started = Instant::now();
        let result = self.validate_and_write(candidates, output_path, policy, emit);

        self.metrics.record_job_time(started.elapsed());
        if result.is_err() {
            self.metrics.record_job_failed();
        }
        result
    }

    fn validate_and_write(
        &self,
        candidates: &[CandidateImage],
        output_path: &Utf8Path,
        policy: LayoutPolicy,
        emit: &mut dyn FnMut(JobEvent),
    ) -> Result<Vec<String>, JobError> {
        let total = candidates.len();
        let validation = self.validator.validate(candidates, |current, total, message| {
            emit(JobEvent::Progress {
                current,
                total,
                message,
            })
        });
        self.metrics
            .record_validation(total, validation.warnings.len());

        if validation.is_invalid() {
            return Err(JobError::NoValidImages);
        }

        emit(JobEvent::Progress {
            current: total,
            total,
            message: GENERATING_MESSAGE.to_string(),
        });

        let assembler = PdfAssembler::new(policy);
        let title = output_path.file_stem().unwrap_or("pdfmaker");
        let bytes = assembler.assemble(&validation.valid, title)?;
        assembler.write(&bytes, output_path)?;

        self.metrics.record_job_completed(validation.valid.len());
        Ok(validation.warnings)
    }
}
