// pdfmaker - Image folders and zip archives to one PDF per input
//
// This is the library crate containing the job pipeline, self-update and state.
// The binary crate (main.rs) provides the command-line front end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::SettingsManager;
pub use metrics::Metrics;
pub use models::{AppState, PageMode, Settings};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
