// State management module
//
// StateManager wraps AppState with thread-safe access using Arc<RwLock<T>>
// and emits change events for the front end to render.

use crate::models::{AppState, BatchResultEntry, PageMode, Settings};
use crate::services::update::UpdatePhase;
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify the front end about state changes without requiring
/// it to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A new folder or zip was selected (or the selection was cleared)
    InputChanged {
        label: Option<String>,
        image_count: usize,
    },

    /// The output path for the next single job changed
    OutputPathChanged { path: Option<Utf8PathBuf> },

    /// Batch folder registration changed
    BatchFoldersChanged { count: usize },

    /// A job (single or batch) has started
    ConversionStarted { total: usize },

    /// Progress has been updated during a job
    ProgressUpdated {
        current: usize,
        total: usize,
        message: String,
    },

    /// A single job wrote its PDF
    ConversionSucceeded {
        output: Utf8PathBuf,
        warnings: Vec<String>,
    },

    /// A single job failed
    ConversionFailed { message: String },

    /// A batch finished; one entry per folder
    BatchFinished { results: Vec<BatchResultEntry> },

    /// Status line changed
    StatusChanged { text: String },

    /// Page mode or output settings changed
    SettingsChanged,

    /// Self-update moved to a new phase
    UpdatePhaseChanged { phase: UpdatePhase },
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 100 events.
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    /// Create a StateManager seeded with `state`
    pub fn with_state(state: AppState) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(state)),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_converting);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, detects what changed and
    /// broadcasts one event per change.
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.input_label != new.input_label || old.candidate_names != new.candidate_names {
            changes.push(StateChange::InputChanged {
                label: new.input_label.clone(),
                image_count: new.candidate_names.len(),
            });
        }

        if old.output_path != new.output_path {
            changes.push(StateChange::OutputPathChanged {
                path: new.output_path.clone(),
            });
        }

        if old.batch_folders != new.batch_folders {
            changes.push(StateChange::BatchFoldersChanged {
                count: new.batch_folders.len(),
            });
        }

        if !old.is_converting && new.is_converting {
            changes.push(StateChange::ConversionStarted {
                total: new.progress_total,
            });
        }

        if new.is_converting
            && (old.progress_current != new.progress_current
                || old.progress_total != new.progress_total
                || old.progress_text != new.progress_text)
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress_current,
                total: new.progress_total,
                message: new.progress_text.clone(),
            });
        }

        if old.is_converting && !new.is_converting {
            if let Some(message) = &new.last_error {
                changes.push(StateChange::ConversionFailed {
                    message: message.clone(),
                });
            } else if !new.batch_results.is_empty() {
                changes.push(StateChange::BatchFinished {
                    results: new.batch_results.clone(),
                });
            } else if let Some(output) = &new.last_output {
                changes.push(StateChange::ConversionSucceeded {
                    output: output.clone(),
                    warnings: new.last_warnings.clone(),
                });
            }
        }

        if old.status_text != new.status_text {
            changes.push(StateChange::StatusChanged {
                text: new.status_text.clone(),
            });
        }

        if old.page_mode != new.page_mode || old.settings != new.settings {
            changes.push(StateChange::SettingsChanged);
        }

        if old.update_phase != new.update_phase {
            changes.push(StateChange::UpdatePhaseChanged {
                phase: new.update_phase.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Mark a selection as being scanned in the background
    pub fn start_resolving(&self, label: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.is_resolving = true;
            state.status_text = format!("Scanning {label}...");
        })
    }

    /// Record a selection that could not be listed or extracted
    pub fn fail_resolving(&self, message: String) -> Vec<StateChange> {
        self.update(|state| {
            state.is_resolving = false;
            state.status_text = message;
        })
    }

    /// Replace the current selection with a resolved input
    pub fn set_input(
        &self,
        label: String,
        candidate_names: Vec<String>,
        output_path: Option<Utf8PathBuf>,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.is_resolving = false;
            state.input_label = Some(label);
            state.candidate_names = candidate_names;
            state.output_path = output_path;
            state.status_text = state.ready_status();
        })
    }

    /// Forget the current selection
    pub fn clear_input(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.input_label = None;
            state.candidate_names.clear();
            state.output_path = None;
            state.status_text = state.ready_status();
        })
    }

    pub fn set_output_path(&self, path: Option<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| state.output_path = path)
    }

    /// Add a folder to the batch list; already registered folders are ignored
    pub fn register_batch_folder(&self, folder: Utf8PathBuf) -> Vec<StateChange> {
        self.update(|state| {
            if !state.batch_folders.contains(&folder) {
                state.batch_folders.push(folder);
            }
        })
    }

    pub fn clear_batch_folders(&self) -> Vec<StateChange> {
        self.update(|state| state.batch_folders.clear())
    }

    pub fn set_page_mode(&self, mode: PageMode) -> Vec<StateChange> {
        self.update(|state| state.page_mode = mode)
    }

    pub fn set_settings(&self, settings: Settings) -> Vec<StateChange> {
        self.update(|state| state.settings = settings)
    }

    /// Mark a job as running; `total` is the progress maximum
    pub fn start_conversion(&self, total: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_job_state();
            state.is_converting = true;
            state.progress_total = total;
            state.progress_text = "Preparing...".to_string();
            state.status_text = "Generating PDF...".to_string();
        })
    }

    pub fn update_progress(&self, current: usize, total: usize, message: String) -> Vec<StateChange> {
        self.update(|state| {
            state.progress_current = current;
            state.progress_total = total.max(1);
            state.progress_text = message;
        })
    }

    /// Record a successful single job
    pub fn finish_conversion(&self, output: Utf8PathBuf, warnings: Vec<String>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_converting = false;
            state.progress_text.clear();
            state.last_output = Some(output);
            state.last_warnings = warnings;
            state.status_text = state.ready_status();
        })
    }

    /// Record a failed single job
    pub fn fail_conversion(&self, message: String) -> Vec<StateChange> {
        self.update(|state| {
            state.is_converting = false;
            state.progress_text.clear();
            state.last_error = Some(message);
            state.status_text = state.ready_status();
        })
    }

    /// Record a finished batch
    pub fn finish_batch(&self, results: Vec<BatchResultEntry>) -> Vec<StateChange> {
        self.update(|state| {
            let failed = results.iter().filter(|r| r.is_error()).count();
            state.is_converting = false;
            state.progress_text.clear();
            state.status_text = format!(
                "Batch finished: {} of {} folder(s) converted.",
                results.len() - failed,
                results.len()
            );
            state.batch_results = results;
        })
    }

    pub fn set_update_phase(&self, phase: UpdatePhase) -> Vec<StateChange> {
        self.update(|state| state.update_phase = phase)
    }

    /// Get an Arc reference to the state for use in worker threads
    pub fn state_arc(&self) -> Arc<RwLock<AppState>> {
        Arc::clone(&self.state)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
