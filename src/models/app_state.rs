use crate::models::{BatchResultEntry, PageMode, Settings};
use crate::services::update::UpdatePhase;
use camino::{Utf8Path, Utf8PathBuf};

/// How many skipped file names a result summary lists before eliding the rest.
pub const WARNING_PREVIEW_LIMIT: usize = 5;

/// Single source of truth for everything the front end renders.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Workers never touch it: their results arrive as events and are applied by
/// the front-end tick through [`update()`](crate::state::StateManager::update).
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Input selection
    pub input_label: Option<String>,
    pub candidate_names: Vec<String>,
    pub output_path: Option<Utf8PathBuf>,
    pub batch_folders: Vec<Utf8PathBuf>,
    /// A folder listing or zip extraction is running in the background.
    pub is_resolving: bool,

    // Settings
    pub page_mode: PageMode,
    pub settings: Settings,

    // Job state
    pub is_converting: bool,
    pub progress_current: usize,
    pub progress_total: usize,
    pub progress_text: String,
    pub status_text: String,

    // Results of the last job
    pub last_output: Option<Utf8PathBuf>,
    pub last_warnings: Vec<String>,
    pub last_error: Option<String>,
    pub batch_results: Vec<BatchResultEntry>,

    // Self-update
    pub update_phase: UpdatePhase,
}

impl AppState {
    /// A single job can start: something to convert and nothing running.
    pub fn can_create(&self) -> bool {
        !self.is_converting
            && !self.is_resolving
            && !self.candidate_names.is_empty()
            && self.output_path.is_some()
    }

    /// A batch can start: folders registered and nothing running.
    pub fn can_run_batch(&self) -> bool {
        !self.is_converting && !self.is_resolving && !self.batch_folders.is_empty()
    }

    /// Status line for the current selection.
    pub fn ready_status(&self) -> String {
        if self.candidate_names.is_empty() {
            "No supported images found.".to_string()
        } else {
            format!("{} image(s) ready.", self.candidate_names.len())
        }
    }

    /// Clear the per-job fields before a new job starts.
    pub fn reset_job_state(&mut self) {
        self.progress_current = 0;
        self.progress_total = 0;
        self.progress_text.clear();
        self.last_output = None;
        self.last_warnings.clear();
        self.last_error = None;
        self.batch_results.clear();
    }
}

/// Message shown after a successful single job.
///
/// Lists at most [`WARNING_PREVIEW_LIMIT`] skipped names, then `... and N more`.
pub fn success_summary(output: &Utf8Path, warnings: &[String]) -> String {
    let mut message = format!("PDF created: {output}");

    if !warnings.is_empty() {
        let shown = warnings.len().min(WARNING_PREVIEW_LIMIT);
        message.push_str("\n\nSkipped unreadable files:\n");
        message.push_str(&warnings[..shown].join("\n"));

        let extra = warnings.len() - shown;
        if extra > 0 {
            message.push_str(&format!("\n... and {extra} more"));
        }
    }

    message
}

/// Message shown after a failed single job.
pub fn failure_summary(message: &str) -> String {
    format!("Failed to create PDF: {message}")
}
