//! Data models for pdfmaker.
//!
//! - [`AppState`]: the state the front end renders, owned by [`StateManager`](crate::state::StateManager)
//! - [`InputSpec`], [`CandidateImage`], [`ValidationResult`], [`Job`]: one conversion
//! - [`PageMode`] / [`LayoutPolicy`]: the page-size setting and the geometry rule it selects
//! - [`BatchResultEntry`]: one line of a batch report
//! - [`Settings`]: the persisted `settings.json`

pub mod app_state;
pub mod job;
pub mod settings;

pub use app_state::{AppState, WARNING_PREVIEW_LIMIT, failure_summary, success_summary};
pub use job::{
    BatchResultEntry, BatchStatus, CandidateImage, InputSpec, Job, LayoutPolicy, PageMode,
    SUPPORTED_EXTENSIONS, ValidationResult, has_supported_extension, is_zip_path, sort_candidates,
};
pub use settings::Settings;
