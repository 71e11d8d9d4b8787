//! Services module - the conversion pipeline and the self-update subsystem.
//!
//! Everything here is front-end agnostic: services take explicit inputs, report
//! progress through callbacks, and return typed errors. Nothing in this module
//! touches [`StateManager`](crate::state::StateManager) directly.
//!
//! # Components
//!
//! - [`ImageSetResolver`]: folder and zip inputs to an ordered candidate list
//! - [`ImageValidator`]: header check per candidate, splitting valid from skipped
//! - [`select_layout`] / [`LayoutPolicy::place`](crate::models::LayoutPolicy::place): page geometry
//! - [`PdfAssembler`]: one page per image, atomic write to the destination
//! - [`JobRunner`]: single jobs and sequential batches, emitting [`JobEvent`]s
//! - [`update`]: release check, installer download and watchdog handoff
//!
//! # Usage Example
//!
//! ```ignore
//! use pdfmaker::services::{ImageSetResolver, JobRunner};
//!
//! let resolved = ImageSetResolver::new().resolve(&spec)?;
//! let runner = JobRunner::new(metrics);
//! runner.run_single(&job, &resolved.candidates, |event| println!("{event:?}"));
//! ```

pub mod assembler;
pub mod layout;
pub mod orchestrator;
pub mod output;
pub mod resolver;
pub mod update;
pub mod validator;

pub use assembler::{AssemblyError, PdfAssembler, WriteError};
pub use layout::{A4_SIZE_PT, PagePlacement, select_layout};
pub use orchestrator::{GENERATING_MESSAGE, JobError, JobEvent, JobRunner};
pub use output::{derive_output_path, ensure_pdf_extension};
pub use resolver::{ExtractedArchive, ImageSetResolver, ResolveError, ResolvedInput};
pub use update::{UpdateCycle, UpdateError, UpdateEvent, UpdateManager, UpdatePhase};
pub use validator::ImageValidator;
