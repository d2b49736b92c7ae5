//! Orchestration of model runs.
//!
//! A [`ModelRun`] sizes, scripts and submits one model directory and,
//! depending on its [`ArchiveMode`], archives it once the job ends. A
//! [`MultiRun`] does the same for every model found under a root.

pub mod config;
pub mod error;
pub mod multi;
pub mod run;

pub use config::{ArchiveMode, ArchiveSettings, MonitorSettings, RunConfig, SubmitOptions};
pub use error::RunError;
pub use multi::{MultiRun, RunOutcome};
pub use run::{ModelRun, Submission};
