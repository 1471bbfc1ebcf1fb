//! I/O support for cdyn contact dynamics runs.
//!
//! This crate provides:
//! - **DAT/STA** step result writers and the contact **active-set report**
//! - **JSON-based restart** persistence of named state vectors

mod error;
mod output;
mod restart;

pub use error::{IoError, Result};
pub use output::{
    ContactNodeRecord, ContactNodeState, ElementRecord, JobReport, JobStatus, NamedField,
    ResultWriter, StepRecord,
};
pub use restart::{
    RESTART_SCHEMA_VERSION, RestartState, load_restart, restart_file_name, save_restart,
};
