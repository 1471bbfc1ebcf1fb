//! The linearized system of one Newton iteration.
//!
//! Unknowns are ordered `[Δd (structural DOFs) | Δz (contact multipliers)]`:
//!
//! ```text
//! ┌                     ┐ ┌    ┐     ┌     ┐
//! │ K_eff    -(1-αf) Bᵀ │ │ Δd │     │ R_u │
//! │                     │ │    │ = - │     │
//! │ C_d      C_z        │ │ Δz │     │ R_c │
//! └                     ┘ └    ┘     └     ┘
//! ```
//!
//! The structural block comes from the generalized-alpha integrator, the
//! coupling and constraint rows from the contact manager. A system is built
//! from scratch every iteration and dropped after the solve.

use nalgebra::{DMatrix, DVector};

use crate::backend::{LinearSolver, LinearSystemData, SolveOptions, SparseTripletsF64};
use crate::boundary_conditions::apply_dirichlet_to_system;
use crate::error::{Result, SolverError};

#[derive(Debug, Clone)]
pub struct DynamicSystem {
    /// Effective matrix of the augmented system
    pub matrix: DMatrix<f64>,
    /// Residual that vanishes at equilibrium
    pub residual: DVector<f64>,
    /// Number of structural DOFs
    pub num_dofs: usize,
    /// Number of multiplier unknowns appended after the structural DOFs
    pub num_multipliers: usize,
    /// Dirichlet-constrained structural DOFs (after blanking)
    pub constrained_dofs: Vec<usize>,
}

impl DynamicSystem {
    /// Create a zeroed system.
    pub fn new(num_dofs: usize, num_multipliers: usize) -> Self {
        let n = num_dofs + num_multipliers;
        Self {
            matrix: DMatrix::zeros(n, n),
            residual: DVector::zeros(n),
            num_dofs,
            num_multipliers,
            constrained_dofs: Vec::new(),
        }
    }

    pub fn num_unknowns(&self) -> usize {
        self.num_dofs + self.num_multipliers
    }

    /// Copy the structural tangent and residual into the leading block.
    pub fn set_structural(&mut self, tangent: &DMatrix<f64>, residual: &DVector<f64>) {
        let n = self.num_dofs;
        self.matrix.view_mut((0, 0), (n, n)).copy_from(tangent);
        self.residual.rows_mut(0, n).copy_from(residual);
    }

    /// Structural part of the residual.
    pub fn structural_residual(&self) -> DVector<f64> {
        self.residual.rows(0, self.num_dofs).into_owned()
    }

    /// Euclidean norm of the full residual (structural and constraint rows).
    pub fn residual_norm(&self) -> f64 {
        self.residual.norm()
    }

    /// Blank rows/columns of Dirichlet DOFs (identity row, zero residual).
    ///
    /// `toggle` covers the structural DOFs only; multiplier rows are never
    /// constrained.
    pub fn blank_dirichlet(&mut self, toggle: &[bool]) {
        let mut increment = DVector::zeros(self.num_unknowns());
        apply_dirichlet_to_system(
            &mut self.matrix,
            &mut increment,
            &mut self.residual,
            toggle,
        );
        self.constrained_dofs = constrained(toggle);
    }

    /// Zero the residual at Dirichlet DOFs without touching the matrix.
    pub fn blank_dirichlet_residual(&mut self, toggle: &[bool]) {
        for dof in constrained(toggle) {
            self.residual[dof] = 0.0;
        }
    }

    /// Check for empty rows, which would make the system singular.
    pub fn validate(&self) -> Result<()> {
        for (i, row) in self.matrix.row_iter().enumerate() {
            if row.iter().all(|v| *v == 0.0) {
                let kind = if i < self.num_dofs {
                    "structural DOF"
                } else {
                    "multiplier"
                };
                return Err(SolverError::Configuration(format!(
                    "empty matrix row for {kind} {i} (unsupported DOF or missing boundary condition)"
                )));
            }
        }
        Ok(())
    }

    /// Convert to backend format; the right-hand side is `-residual`.
    pub fn to_linear_system_data(&self) -> LinearSystemData {
        LinearSystemData {
            matrix: SparseTripletsF64::from_dense(&self.matrix),
            rhs: -&self.residual,
            num_unknowns: self.num_unknowns(),
            constrained_dofs: self.constrained_dofs.clone(),
        }
    }

    /// Solve for the increment `[Δd | Δz]`.
    pub fn solve_with_backend(
        &self,
        backend: &mut dyn LinearSolver,
        options: &SolveOptions<'_>,
    ) -> Result<DVector<f64>> {
        let data = self.to_linear_system_data();
        let (solution, info) = backend.solve_linear(&data, options)?;
        tracing::trace!(
            solver = %info.solver_name,
            iterations = info.iterations,
            residual = ?info.residual_norm,
            "linear solve"
        );
        Ok(solution)
    }
}

fn constrained(toggle: &[bool]) -> Vec<usize> {
    toggle
        .iter()
        .enumerate()
        .filter_map(|(dof, &fixed)| fixed.then_some(dof))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use approx::assert_relative_eq;

    fn spring_chain() -> DynamicSystem {
        let mut system = DynamicSystem::new(2, 0);
        let k = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 1.0]);
        let r = DVector::from_vec(vec![0.5, -1.0]);
        system.set_structural(&k, &r);
        system
    }

    #[test]
    fn blanking_creates_identity_rows() {
        let mut system = spring_chain();
        system.blank_dirichlet(&[true, false]);

        assert_eq!(system.matrix[(0, 0)], 1.0);
        assert_eq!(system.matrix[(0, 1)], 0.0);
        assert_eq!(system.matrix[(1, 0)], 0.0);
        assert_eq!(system.residual[0], 0.0);
        assert_eq!(system.residual[1], -1.0);
        assert_eq!(system.constrained_dofs, vec![0]);
    }

    #[test]
    fn solve_returns_negative_residual_direction() {
        let mut system = spring_chain();
        system.blank_dirichlet(&[true, false]);
        let mut backend = NativeBackend::new();
        let x = system
            .solve_with_backend(&mut backend, &SolveOptions::default())
            .expect("solve");
        assert_relative_eq!(x[0], 0.0);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn multiplier_block_is_appended() {
        let mut system = DynamicSystem::new(2, 2);
        let k = DMatrix::identity(2, 2);
        system.set_structural(&k, &DVector::from_vec(vec![1.0, 2.0]));
        assert_eq!(system.num_unknowns(), 4);
        assert_eq!(system.structural_residual().len(), 2);
        assert_relative_eq!(system.residual_norm(), 5.0_f64.sqrt());
    }

    #[test]
    fn empty_multiplier_row_fails_validation() {
        let mut system = DynamicSystem::new(1, 1);
        system.set_structural(&DMatrix::identity(1, 1), &DVector::zeros(1));
        assert!(matches!(
            system.validate(),
            Err(SolverError::Configuration(msg)) if msg.contains("multiplier")
        ));
    }
}
