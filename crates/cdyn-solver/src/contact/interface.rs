//! Two-dimensional node-to-segment mortar geometry.
//!
//! Slave nodes lie on an ordered polyline; master segments are node pairs
//! `[a, b]` whose left normal (the direction `a → b` rotated by +90°) faces
//! the slave side. With a lumped slave operator the mortar coupling reduces to
//!
//! ```text
//! D_jj = tributary length of slave node j
//! M_ja = D_jj (1 - ξ),   M_jb = D_jj ξ
//! g̃_j  = n_j · (D_jj x_j - M_ja x_a - M_jb x_b)
//! ```
//!
//! where `ξ` is the local coordinate of the closest-point projection of slave
//! node `j` onto master segment `[a, b]`. The operators act on stacked
//! 2-vectors: row `2j + k` holds the coefficients of component `k` of slave
//! node `j`, columns are structural DOFs.

use std::collections::BTreeSet;

use nalgebra::{DVector, Vector2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Weighted gap assigned to slave nodes without a master partner.
pub const UNPROJECTED_GAP: f64 = 1.0e12;

const LENGTH_TOLERANCE: f64 = 1.0e-12;

/// Slave and master side of one contact interface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactInterfaceDefinition {
    /// Slave nodes in order along the slave polyline
    pub slave_nodes: Vec<usize>,
    /// Master segments `[a, b]`, left normal pointing towards the slave side
    pub master_segments: Vec<[usize; 2]>,
}

impl ContactInterfaceDefinition {
    pub fn new(slave_nodes: Vec<usize>, master_segments: Vec<[usize; 2]>) -> Self {
        Self {
            slave_nodes,
            master_segments,
        }
    }

    pub fn num_slave_nodes(&self) -> usize {
        self.slave_nodes.len()
    }

    pub fn validate(&self, num_nodes: usize) -> Result<()> {
        if self.slave_nodes.len() < 2 {
            return Err(SolverError::config(
                "contact interface needs at least two slave nodes",
            ));
        }
        if self.master_segments.is_empty() {
            return Err(SolverError::config("contact interface has no master segments"));
        }

        let mut slaves = BTreeSet::new();
        for &node in &self.slave_nodes {
            if node >= num_nodes {
                return Err(SolverError::config(format!(
                    "slave node {node} does not exist"
                )));
            }
            if !slaves.insert(node) {
                return Err(SolverError::config(format!(
                    "slave node {node} listed twice"
                )));
            }
        }
        for (i, &[a, b]) in self.master_segments.iter().enumerate() {
            if a >= num_nodes || b >= num_nodes {
                return Err(SolverError::config(format!(
                    "master segment {i} references an unknown node"
                )));
            }
            if a == b {
                return Err(SolverError::config(format!(
                    "master segment {i} connects node {a} to itself"
                )));
            }
            if slaves.contains(&a) || slaves.contains(&b) {
                return Err(SolverError::config(format!(
                    "master segment {i} shares a node with the slave side"
                )));
            }
        }
        Ok(())
    }
}

/// Closest-point projection onto a master segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub segment: usize,
    /// Local coordinate along the segment, clamped to `[0, 1]`
    pub xi: f64,
}

/// Mortar quantities of one slave node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaveGeometry {
    /// Lumped mortar weight `D_jj`
    pub weight: f64,
    pub normal: Vector2<f64>,
    pub tangent: Vector2<f64>,
    pub projection: Option<Projection>,
    pub weighted_gap: f64,
}

/// Mortar operators `D`, `M` and the coupling `B = D - M`.
#[derive(Debug, Clone)]
pub struct MortarOperators {
    pub d: CsrMatrix<f64>,
    pub m: CsrMatrix<f64>,
    pub coupling: CsrMatrix<f64>,
}

impl MortarOperators {
    pub fn zeros(num_slave_nodes: usize, num_dofs: usize) -> Self {
        let rows = 2 * num_slave_nodes;
        Self {
            d: CsrMatrix::zeros(rows, num_dofs),
            m: CsrMatrix::zeros(rows, num_dofs),
            coupling: CsrMatrix::zeros(rows, num_dofs),
        }
    }

    /// `B x` split per slave node: entry `j` is the weighted relative
    /// vector of slave node `j`.
    pub fn weighted(&self, x: &DVector<f64>) -> Vec<Vector2<f64>> {
        let product = &self.coupling * x;
        product
            .as_slice()
            .chunks_exact(2)
            .map(|lane| Vector2::new(lane[0], lane[1]))
            .collect()
    }

    /// `Bᵀ z` over all structural DOFs.
    pub fn coupling_transpose_mul(&self, z: &DVector<f64>) -> DVector<f64> {
        &self.coupling.transpose() * z
    }

    /// Nonzero `(dof, value)` entries of row `row` of `B`.
    pub fn coupling_row(&self, row: usize) -> Vec<(usize, f64)> {
        let lane = self.coupling.row(row);
        lane.col_indices()
            .iter()
            .copied()
            .zip(lane.values().iter().copied())
            .collect()
    }
}

/// Current position of `node`: reference plus in-plane displacement.
pub fn current_position(
    reference: &[Vector2<f64>],
    displacement: &DVector<f64>,
    dofs_per_node: usize,
    node: usize,
) -> Vector2<f64> {
    let base = node * dofs_per_node;
    reference[node] + Vector2::new(displacement[base], displacement[base + 1])
}

struct Segment {
    start: Vector2<f64>,
    direction: Vector2<f64>,
    length_sq: f64,
    normal: Vector2<f64>,
    tangent: Vector2<f64>,
}

impl Segment {
    fn local_coordinate(&self, point: &Vector2<f64>) -> f64 {
        (point - self.start).dot(&self.direction) / self.length_sq
    }

    fn normal_distance(&self, point: &Vector2<f64>) -> f64 {
        (point - self.start).dot(&self.normal)
    }

    fn closest_distance(&self, point: &Vector2<f64>) -> f64 {
        let xi = self.local_coordinate(point).clamp(0.0, 1.0);
        (point - (self.start + self.direction * xi)).norm()
    }
}

/// Evaluate weights, projections, weighted gaps and the mortar operators at
/// the given displacement.
///
/// Deterministic in its inputs: the same displacement always yields the same
/// operators and gaps.
pub fn evaluate_mortar(
    definition: &ContactInterfaceDefinition,
    reference: &[Vector2<f64>],
    displacement: &DVector<f64>,
    dofs_per_node: usize,
    projection_tolerance: f64,
) -> Result<(Vec<SlaveGeometry>, MortarOperators)> {
    let position = |node| current_position(reference, displacement, dofs_per_node, node);

    let segments = definition
        .master_segments
        .iter()
        .enumerate()
        .map(|(i, &[a, b])| {
            let start = position(a);
            let direction = position(b) - start;
            let length_sq = direction.norm_squared();
            if length_sq.sqrt() < LENGTH_TOLERANCE {
                return Err(SolverError::Geometry(format!(
                    "master segment {i} ({a}, {b}) has zero length"
                )));
            }
            let tangent = direction / length_sq.sqrt();
            Ok(Segment {
                start,
                direction,
                length_sq,
                normal: Vector2::new(-tangent.y, tangent.x),
                tangent,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let slave_positions: Vec<_> = definition.slave_nodes.iter().map(|&n| position(n)).collect();
    let num_slave = slave_positions.len();
    let num_dofs = displacement.len();
    let mut d = CooMatrix::new(2 * num_slave, num_dofs);
    let mut m = CooMatrix::new(2 * num_slave, num_dofs);
    let mut coupling = CooMatrix::new(2 * num_slave, num_dofs);
    let mut geometry = Vec::with_capacity(num_slave);

    for (j, point) in slave_positions.iter().enumerate() {
        let node = definition.slave_nodes[j];
        let weight = tributary_length(&slave_positions, j);
        if weight < LENGTH_TOLERANCE {
            return Err(SolverError::Geometry(format!(
                "slave node {node} has zero mortar weight"
            )));
        }

        let candidate = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                let xi = s.local_coordinate(point);
                (-projection_tolerance..=1.0 + projection_tolerance).contains(&xi)
            })
            .min_by(|(_, s1), (_, s2)| {
                s1.normal_distance(point)
                    .abs()
                    .total_cmp(&s2.normal_distance(point).abs())
            })
            .map(|(i, _)| i);

        for k in 0..2 {
            d.push(2 * j + k, node * dofs_per_node + k, weight);
            coupling.push(2 * j + k, node * dofs_per_node + k, weight);
        }

        let slave = match candidate {
            Some(index) => {
                let segment = &segments[index];
                let xi = segment.local_coordinate(point).clamp(0.0, 1.0);
                let [a, b] = definition.master_segments[index];
                for k in 0..2 {
                    for (master, factor) in [(a, 1.0 - xi), (b, xi)] {
                        let dof = master * dofs_per_node + k;
                        m.push(2 * j + k, dof, weight * factor);
                        coupling.push(2 * j + k, dof, -weight * factor);
                    }
                }
                let projected = segment.start + segment.direction * xi;
                SlaveGeometry {
                    weight,
                    normal: segment.normal,
                    tangent: segment.tangent,
                    projection: Some(Projection { segment: index, xi }),
                    weighted_gap: weight * segment.normal.dot(&(point - projected)),
                }
            }
            None => {
                let nearest = segments
                    .iter()
                    .min_by(|s1, s2| {
                        s1.closest_distance(point).total_cmp(&s2.closest_distance(point))
                    })
                    .ok_or_else(|| SolverError::config("contact interface has no master segments"))?;
                SlaveGeometry {
                    weight,
                    normal: nearest.normal,
                    tangent: nearest.tangent,
                    projection: None,
                    weighted_gap: UNPROJECTED_GAP,
                }
            }
        };
        geometry.push(slave);
    }

    let operators = MortarOperators {
        d: CsrMatrix::from(&d),
        m: CsrMatrix::from(&m),
        coupling: CsrMatrix::from(&coupling),
    };
    Ok((geometry, operators))
}

/// Half the length of the adjacent slave polyline pieces.
fn tributary_length(points: &[Vector2<f64>], j: usize) -> f64 {
    let before = j
        .checked_sub(1)
        .map_or(0.0, |i| (points[j] - points[i]).norm());
    let after = points
        .get(j + 1)
        .map_or(0.0, |next| (next - points[j]).norm());
    0.5 * (before + after)
}
