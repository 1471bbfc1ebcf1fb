//! Error taxonomy of the integrator/contact core.
//!
//! Configuration, convergence and geometry failures are separate variants so
//! the time loop (and its caller) can tell them apart. The only soft failure,
//! a fixed-point active-set search that exceeds its budget, is not an error
//! unless the run is configured to abort on it.

use thiserror::Error;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    /// Invalid parameters or an unsupported combination of options.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "Newton unconverged in {iterations} iterations \
         (residual {residual_norm:.6e}, increment {increment_norm:.6e})"
    )]
    NewtonUnconverged {
        /// Iterations performed before giving up
        iterations: usize,
        /// Residual norm of the last iterate
        residual_norm: f64,
        /// Norm of the last displacement increment
        increment_norm: f64,
    },

    /// Fixed-point budget exceeded while configured to abort, or a
    /// semi-smooth Newton loop that ended with the set still changing.
    #[error("active set unconverged after {steps} active set steps in time step {step}")]
    ActiveSetUnconverged { step: usize, steps: usize },

    /// Degenerate contact geometry (zero-length normal or segment).
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("linear solver failed: {0}")]
    LinearSolver(#[from] BackendError),

    #[error("element evaluation failed: {0}")]
    Element(String),

    #[error("restart error: {0}")]
    Restart(String),

    #[error(transparent)]
    Io(#[from] cdyn_io::IoError),
}

impl SolverError {
    pub fn config(msg: impl Into<String>) -> Self {
        SolverError::Configuration(msg.into())
    }
}
