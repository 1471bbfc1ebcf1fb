//! Boundary conditions and loading.
//!
//! This module handles:
//! - Prescribed displacements (Dirichlet), scaled by a [`LoadCurve`]
//! - Concentrated nodal loads (Neumann), scaled by a [`LoadCurve`]
//! - Blanking of Dirichlet rows/columns in a linearized system
//!
//! DOFs are numbered node-wise: `dof = node * dofs_per_node + component`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Time scaling of a boundary value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "curve")]
pub enum LoadCurve {
    #[default]
    Constant,
    /// Linear from 0 at `t = 0` to 1 at `end_time`, constant afterwards.
    Ramp { end_time: f64 },
    /// Piecewise linear `(time, factor)` table, clamped at both ends.
    Table { points: Vec<(f64, f64)> },
}

impl LoadCurve {
    pub fn factor(&self, time: f64) -> f64 {
        match self {
            LoadCurve::Constant => 1.0,
            LoadCurve::Ramp { end_time } => {
                if *end_time <= 0.0 {
                    1.0
                } else {
                    (time / end_time).clamp(0.0, 1.0)
                }
            }
            LoadCurve::Table { points } => interpolate(points, time),
        }
    }
}

fn interpolate(points: &[(f64, f64)], time: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if time <= first.0 {
        return first.1;
    }
    if time >= last.0 {
        return last.1;
    }
    points
        .windows(2)
        .find(|w| time >= w[0].0 && time <= w[1].0)
        .map_or(last.1, |w| {
            let span = w[1].0 - w[0].0;
            if span <= 0.0 {
                w[1].1
            } else {
                w[0].1 + (w[1].1 - w[0].1) * (time - w[0].0) / span
            }
        })
}

/// Degree of freedom identifier (0-based node and component)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DofId {
    pub node: usize,
    /// Component index (0 = X, 1 = Y, 2 = Z)
    pub component: usize,
}

impl DofId {
    pub fn new(node: usize, component: usize) -> Self {
        Self { node, component }
    }

    /// Global equation number.
    pub fn global(&self, dofs_per_node: usize) -> usize {
        self.node * dofs_per_node + self.component
    }
}

/// A prescribed displacement on a range of node components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementBC {
    pub node: usize,
    /// First component to constrain (0-based)
    pub first_dof: usize,
    /// Last component to constrain (0-based, inclusive)
    pub last_dof: usize,
    /// Prescribed value at curve factor 1 (0.0 for fixed)
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub curve: LoadCurve,
}

impl DisplacementBC {
    pub fn new(node: usize, first_dof: usize, last_dof: usize, value: f64) -> Self {
        Self {
            node,
            first_dof,
            last_dof,
            value,
            curve: LoadCurve::Constant,
        }
    }

    #[must_use]
    pub fn with_curve(mut self, curve: LoadCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn affected_dofs(&self) -> Vec<DofId> {
        (self.first_dof..=self.last_dof)
            .map(|component| DofId::new(self.node, component))
            .collect()
    }
}

/// A concentrated load on one node component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentratedLoad {
    pub node: usize,
    pub dof: usize,
    pub magnitude: f64,
    #[serde(default)]
    pub curve: LoadCurve,
}

impl ConcentratedLoad {
    pub fn new(node: usize, dof: usize, magnitude: f64) -> Self {
        Self {
            node,
            dof,
            magnitude,
            curve: LoadCurve::Constant,
        }
    }

    #[must_use]
    pub fn with_curve(mut self, curve: LoadCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn dof_id(&self) -> DofId {
        DofId::new(self.node, self.dof)
    }
}

/// Prescribed values and the toggle mask at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletState {
    pub values: DVector<f64>,
    /// `true` where the DOF is prescribed
    pub toggle: Vec<bool>,
}

impl DirichletState {
    pub fn num_constrained(&self) -> usize {
        self.toggle.iter().filter(|t| **t).count()
    }
}

/// Complete boundary condition and loading specification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryConditions {
    #[serde(default)]
    pub displacement_bcs: Vec<DisplacementBC>,
    #[serde(default)]
    pub concentrated_loads: Vec<ConcentratedLoad>,
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_displacement_bc(&mut self, bc: DisplacementBC) {
        self.displacement_bcs.push(bc);
    }

    pub fn add_concentrated_load(&mut self, load: ConcentratedLoad) {
        self.concentrated_loads.push(load);
    }

    /// Fix all components of a node. Nothing is added for `dofs_per_node == 0`.
    pub fn fix_node(&mut self, node: usize, dofs_per_node: usize) {
        if let Some(last_dof) = dofs_per_node.checked_sub(1) {
            self.add_displacement_bc(DisplacementBC::new(node, 0, last_dof, 0.0));
        }
    }

    /// Prescribed values and toggle mask at `time`.
    pub fn evaluate_dirichlet(
        &self,
        time: f64,
        dofs_per_node: usize,
        num_dofs: usize,
    ) -> Result<DirichletState> {
        let mut values = DVector::zeros(num_dofs);
        let mut toggle = vec![false; num_dofs];
        for bc in &self.displacement_bcs {
            let value = bc.value * bc.curve.factor(time);
            for dof in bc.affected_dofs() {
                let index = checked_dof(dof, dofs_per_node, num_dofs)?;
                values[index] = value;
                toggle[index] = true;
            }
        }
        Ok(DirichletState { values, toggle })
    }

    /// External force vector at `time`.
    pub fn evaluate_neumann(
        &self,
        time: f64,
        dofs_per_node: usize,
        num_dofs: usize,
    ) -> Result<DVector<f64>> {
        let mut force = DVector::zeros(num_dofs);
        for load in &self.concentrated_loads {
            let index = checked_dof(load.dof_id(), dofs_per_node, num_dofs)?;
            force[index] += load.magnitude * load.curve.factor(time);
        }
        Ok(force)
    }
}

fn checked_dof(dof: DofId, dofs_per_node: usize, num_dofs: usize) -> Result<usize> {
    if dof.component >= dofs_per_node {
        return Err(SolverError::Configuration(format!(
            "node {} has no component {} ({} DOFs per node)",
            dof.node, dof.component, dofs_per_node
        )));
    }
    let index = dof.global(dofs_per_node);
    if index >= num_dofs {
        return Err(SolverError::Configuration(format!(
            "boundary condition on unknown node {}",
            dof.node
        )));
    }
    Ok(index)
}

/// Blank Dirichlet DOFs of a linearized system.
///
/// Rows and columns of toggled DOFs are zeroed with a unit diagonal, and the
/// residual and increment entries are zeroed: within a time step the
/// increment at a Dirichlet DOF is always zero because the prescribed value
/// was applied by the predictor. `toggle` may be shorter than the system;
/// trailing unknowns are left free.
pub fn apply_dirichlet_to_system(
    matrix: &mut DMatrix<f64>,
    increment: &mut DVector<f64>,
    residual: &mut DVector<f64>,
    toggle: &[bool],
) {
    for (dof, _) in toggle.iter().enumerate().filter(|(_, fixed)| **fixed) {
        matrix.row_mut(dof).fill(0.0);
        matrix.column_mut(dof).fill(0.0);
        matrix[(dof, dof)] = 1.0;
        residual[dof] = 0.0;
        increment[dof] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ramp_curve_saturates() {
        let ramp = LoadCurve::Ramp { end_time: 2.0 };
        assert_relative_eq!(ramp.factor(0.5), 0.25);
        assert_relative_eq!(ramp.factor(3.0), 1.0);
        assert_relative_eq!(ramp.factor(-1.0), 0.0);
    }

    #[test]
    fn table_curve_interpolates_linearly() {
        let table = LoadCurve::Table {
            points: vec![(0.0, 0.0), (1.0, 2.0), (2.0, 2.0)],
        };
        assert_relative_eq!(table.factor(0.25), 0.5);
        assert_relative_eq!(table.factor(1.5), 2.0);
        assert_relative_eq!(table.factor(5.0), 2.0);
        assert_relative_eq!(LoadCurve::Table { points: vec![] }.factor(1.0), 0.0);
    }

    #[test]
    fn fixing_a_node_without_dofs_adds_nothing() {
        let mut bcs = BoundaryConditions::new();
        bcs.fix_node(3, 0);
        assert!(bcs.displacement_bcs.is_empty());
        bcs.fix_node(3, 2);
        assert_eq!(bcs.displacement_bcs.len(), 1);
    }

    #[test]
    fn dirichlet_values_follow_curve() {
        let mut bcs = BoundaryConditions::new();
        bcs.fix_node(0, 2);
        bcs.add_displacement_bc(
            DisplacementBC::new(1, 1, 1, -0.2).with_curve(LoadCurve::Ramp { end_time: 1.0 }),
        );

        let state = bcs.evaluate_dirichlet(0.5, 2, 4).expect("valid bcs");
        assert_eq!(state.toggle, vec![true, true, false, true]);
        assert_relative_eq!(state.values[3], -0.1);
        assert_eq!(state.num_constrained(), 3);
    }

    #[test]
    fn neumann_loads_accumulate() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 0, 5.0));
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 0, -2.0));
        let force = bcs.evaluate_neumann(0.0, 1, 2).expect("valid loads");
        assert_relative_eq!(force[1], 3.0);
    }

    #[test]
    fn out_of_range_dof_is_rejected() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_displacement_bc(DisplacementBC::new(0, 0, 2, 0.0));
        assert!(matches!(
            bcs.evaluate_dirichlet(0.0, 2, 4),
            Err(SolverError::Configuration(_))
        ));

        let mut loads = BoundaryConditions::new();
        loads.add_concentrated_load(ConcentratedLoad::new(7, 0, 1.0));
        assert!(loads.evaluate_neumann(0.0, 1, 2).is_err());
    }

    #[test]
    fn apply_dirichlet_blanks_rows_and_columns() {
        let mut matrix = DMatrix::from_element(3, 3, 2.0);
        let mut increment = DVector::from_element(3, 1.0);
        let mut residual = DVector::from_element(3, 4.0);
        apply_dirichlet_to_system(&mut matrix, &mut increment, &mut residual, &[false, true]);

        assert_eq!(matrix.row(1).iter().sum::<f64>(), 1.0);
        assert_eq!(matrix.column(1).iter().sum::<f64>(), 1.0);
        assert_eq!(matrix[(2, 2)], 2.0);
        assert_eq!(residual[1], 0.0);
        assert_eq!(increment[1], 0.0);
        assert_eq!(residual[2], 4.0);
    }
}
