//! Native backend using nalgebra's dense LU decomposition.
//!
//! Suitable for the small-to-medium augmented systems of contact problems
//! (the multiplier rows make the matrix unsymmetric and indefinite, which LU
//! with partial pivoting handles directly).

use super::traits::*;
use nalgebra::{DVector, Dyn, LU};

/// Dense LU backend. Keeps the last factorization so a call with
/// `refactor == false` can reuse it.
#[derive(Default)]
pub struct NativeBackend {
    factorization: Option<(usize, LU<f64, Dyn, Dyn>)>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for NativeBackend {
    fn name(&self) -> &str {
        "nalgebra-LU"
    }

    fn solve_linear(
        &mut self,
        system: &LinearSystemData,
        options: &SolveOptions<'_>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        let n = system.num_unknowns;
        if system.rhs.len() != n || system.matrix.nrows != n || system.matrix.ncols != n {
            return Err(BackendError(format!(
                "dimension mismatch: {}x{} matrix, {} rhs entries, {n} unknowns",
                system.matrix.nrows,
                system.matrix.ncols,
                system.rhs.len()
            )));
        }

        let cached = self.factorization.as_ref().is_some_and(|(dim, _)| *dim == n);
        if options.refactor || !cached {
            self.factorization = Some((n, system.matrix.to_dense().lu()));
        }

        let (_, lu) = self
            .factorization
            .as_ref()
            .ok_or_else(|| BackendError("missing LU factorization".into()))?;
        let x = lu
            .solve(&system.rhs)
            .ok_or(BackendError("Singular matrix in LU decomposition".into()))?;

        Ok((
            x,
            SolveInfo {
                iterations: 1,
                residual_norm: None,
                solver_name: self.name().to_string(),
            },
        ))
    }
}
