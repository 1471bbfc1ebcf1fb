//! Linear solver backends.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │   ActiveSetNewtonSolver (Newton loop)       │
//! │   DynamicSystem::to_linear_system_data()    │
//! └──────────────────┬─────────────────────────┘
//!                    │ LinearSystemData (COO triplets + rhs)
//! ┌──────────────────▼─────────────────────────┐
//! │          dyn LinearSolver                   │
//! ├─────────────────────┬──────────────────────┤
//! │   NativeBackend     │   BiCgStabBackend     │
//! │   (dense LU)        │   (CSR, Jacobi,       │
//! │                     │    adaptive tol.)     │
//! └─────────────────────┴──────────────────────┘
//! ```

mod bicgstab;
mod native;
mod traits;

pub use bicgstab::BiCgStabBackend;
pub use native::NativeBackend;
pub use traits::*;

use crate::config::LinearSolverKind;

/// Backend for the configured solver kind.
pub fn create_backend(kind: LinearSolverKind) -> Box<dyn LinearSolver> {
    match kind {
        LinearSolverKind::Direct => Box::new(NativeBackend::new()),
        LinearSolverKind::BiCgStab {
            tolerance,
            max_iterations,
        } => Box::new(BiCgStabBackend::new(tolerance, max_iterations)),
    }
}

/// The default backend (dense LU).
pub fn default_backend() -> Box<dyn LinearSolver> {
    create_backend(LinearSolverKind::Direct)
}
