//! Backend trait definitions for the linear solver service.
//!
//! The Newton loop hands every linearized system `A x = b` to a
//! [`LinearSolver`]. Element- and contact-level computations stay in
//! nalgebra (small, dense matrices); only the global solve is abstracted.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Error type for backend operations.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Sparse matrix in COO (coordinate/triplet) format.
///
/// Interchange format between the assembled [`DynamicSystem`](crate::DynamicSystem)
/// and the backends. Duplicate entries are summed.
#[derive(Debug, Clone, Default)]
pub struct SparseTripletsF64 {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTripletsF64 {
    /// Collect the nonzero entries of a dense matrix.
    pub fn from_dense(matrix: &DMatrix<f64>) -> Self {
        let mut triplets = Self {
            nrows: matrix.nrows(),
            ncols: matrix.ncols(),
            ..Self::default()
        };
        for j in 0..matrix.ncols() {
            for i in 0..matrix.nrows() {
                let value = matrix[(i, j)];
                if value != 0.0 {
                    triplets.row_indices.push(i);
                    triplets.col_indices.push(j);
                    triplets.values.push(value);
                }
            }
        }
        triplets
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.nrows, self.ncols);
        for k in 0..self.nnz() {
            dense[(self.row_indices[k], self.col_indices[k])] += self.values[k];
        }
        dense
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<f64>, BackendError> {
        let coo = CooMatrix::try_from_triplets(
            self.nrows,
            self.ncols,
            self.row_indices.clone(),
            self.col_indices.clone(),
            self.values.clone(),
        )
        .map_err(|e| BackendError(format!("invalid triplets: {e}")))?;
        Ok(CsrMatrix::from(&coo))
    }
}

/// A linear system ready for solving: A * x = b.
///
/// Dirichlet rows/columns are already blanked.
#[derive(Debug, Clone)]
pub struct LinearSystemData {
    pub matrix: SparseTripletsF64,
    pub rhs: DVector<f64>,
    /// Total number of unknowns (displacements and multipliers)
    pub num_unknowns: usize,
    /// Indices of constrained DOFs (for diagnostics)
    pub constrained_dofs: Vec<usize>,
}

/// Per-call solver flags.
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions<'a> {
    pub initial_guess: Option<&'a DVector<f64>>,
    /// Factorize / set up the operator anew.
    pub refactor: bool,
    /// Keep the preconditioner of the previous call.
    pub reuse_preconditioner: bool,
}

impl Default for SolveOptions<'_> {
    fn default() -> Self {
        Self {
            initial_guess: None,
            refactor: true,
            reuse_preconditioner: false,
        }
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm (if available)
    pub residual_norm: Option<f64>,
    /// Human-readable solver name (e.g., "nalgebra-LU", "BiCGStab-Jacobi")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
pub trait LinearSolver: Send {
    fn name(&self) -> &str;

    /// Solve A * x = b.
    fn solve_linear(
        &mut self,
        system: &LinearSystemData,
        options: &SolveOptions<'_>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError>;

    /// Loosen or tighten the linear tolerance for the next solve, given the
    /// desired nonlinear residual `target`, the current one `worst_case` and
    /// the required `improvement` factor. Direct solvers ignore it.
    fn adapt_tolerance(&mut self, _target: f64, _worst_case: f64, _improvement: f64) {}

    /// Restore the configured tolerance.
    fn reset_tolerance(&mut self) {}
}
