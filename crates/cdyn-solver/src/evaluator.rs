//! Interface to the element layer.
//!
//! The integrator never looks inside elements: it asks an
//! [`ElementEvaluator`] for internal forces and tangent stiffness at a
//! given displacement field, for the (constant) mass matrix, and for
//! stress/strain output.

use nalgebra::{DMatrix, DVector};

use crate::config::{StrainOutput, StressOutput};
use crate::error::Result;

/// Input of one element evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    /// Total displacement at the evaluation point (`d_mid` or `d_np1`)
    pub displacement: &'a DVector<f64>,
    /// Displacement change since the previous evaluation, scaled to the
    /// evaluation point; zero at the predictor
    pub residual_displacement: &'a DVector<f64>,
    pub time: f64,
    pub dt: f64,
    pub alpha_f: f64,
}

/// Assembled internal force vector and tangent stiffness.
#[derive(Debug, Clone)]
pub struct ElementResponse {
    pub internal_force: DVector<f64>,
    pub stiffness: DMatrix<f64>,
}

/// Scalar stress/strain measures of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementResult {
    pub element: usize,
    pub stress: Option<f64>,
    pub strain: Option<f64>,
}

pub trait ElementEvaluator: Send {
    /// Number of structural DOFs.
    fn num_dofs(&self) -> usize;

    /// DOFs per node; contact geometry needs it to locate node coordinates.
    fn dofs_per_node(&self) -> usize;

    fn num_nodes(&self) -> usize {
        self.num_dofs() / self.dofs_per_node().max(1)
    }

    fn num_elements(&self) -> usize;

    fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<ElementResponse>;

    /// Global mass matrix (constant in time).
    fn mass_matrix(&self) -> Result<DMatrix<f64>>;

    /// Hook at the end of an accepted step (history variables).
    fn update_step(&mut self, _displacement: &DVector<f64>) -> Result<()> {
        Ok(())
    }

    /// Per-element stress/strain output; empty if not supported.
    fn element_results(
        &self,
        _displacement: &DVector<f64>,
        _stress: StressOutput,
        _strain: StrainOutput,
    ) -> Result<Vec<ElementResult>> {
        Ok(Vec::new())
    }
}
