//! 2-node truss elements in 1, 2 or 3 dimensions.
//!
//! The truss resists only axial forces. With `d0 = X2 - X1`, `L0 = |d0|`
//! and the current axis `d = d0 + u2 - u1`:
//!
//! ```text
//! Linear:          eps = e·(u2 - u1) / L0,          f2 = E A eps e
//!                  k   = (E A / L0) e eᵀ
//! Green-Lagrange:  eps = (d·d - L0²) / (2 L0²),     f2 = (E A eps / L0) d
//!                  k   = (E A / L0³) d dᵀ + (E A eps / L0) I
//! ```
//!
//! with `f1 = -f2` and the element matrix `[k -k; -k k]`. The consistent mass
//! is `ρ A L0 / 6 [2I I; I 2I]`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{StrainOutput, StressOutput};
use crate::error::{Result, SolverError};
use crate::evaluator::{ElementEvaluator, ElementResponse, ElementResult, EvaluationRequest};
use crate::mesh::Node;

/// Strain measure of the truss network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kinematics {
    /// Small strain; internal force linear in the displacement.
    #[default]
    Linear,
    /// Green-Lagrange strain with a St. Venant-Kirchhoff law.
    GreenLagrange,
}

/// 2-node truss element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truss {
    pub id: usize,
    /// Node indices
    pub nodes: [usize; 2],
    /// Cross-sectional area (reference)
    pub area: f64,
    pub youngs_modulus: f64,
    #[serde(default)]
    pub density: f64,
}

/// Axial strain state of one element.
struct AxialState {
    /// Reference axis
    reference: DVector<f64>,
    /// Current axis
    current: DVector<f64>,
    length: f64,
}

impl AxialState {
    fn current_length(&self) -> f64 {
        self.current.norm()
    }

    fn green_lagrange(&self) -> f64 {
        (self.current.dot(&self.current) - self.length * self.length)
            / (2.0 * self.length * self.length)
    }

    fn linear(&self) -> f64 {
        self.reference.dot(&(&self.current - &self.reference)) / (self.length * self.length)
    }
}

impl Truss {
    pub fn new(id: usize, nodes: [usize; 2], area: f64, youngs_modulus: f64, density: f64) -> Self {
        Self {
            id,
            nodes,
            area,
            youngs_modulus,
            density,
        }
    }

    fn axis(&self, nodes: &[Node], dim: usize) -> DVector<f64> {
        let a = nodes[self.nodes[0]].coords();
        let b = nodes[self.nodes[1]].coords();
        DVector::from_fn(dim, |k, _| b[k] - a[k])
    }

    /// Reference length.
    pub fn length(&self, nodes: &[Node], dim: usize) -> Result<f64> {
        let length = self.axis(nodes, dim).norm();
        if length < 1e-12 {
            return Err(SolverError::Element(format!(
                "Truss element {} has zero or near-zero length: {}",
                self.id, length
            )));
        }
        Ok(length)
    }

    /// Global DOF indices `[node1 comps.., node2 comps..]`.
    pub fn dofs(&self, dim: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .flat_map(|&node| (0..dim).map(move |k| node * dim + k))
            .collect()
    }

    fn state(&self, nodes: &[Node], dim: usize, u: &DVector<f64>) -> Result<AxialState> {
        let reference = self.axis(nodes, dim);
        let length = self.length(nodes, dim)?;
        let (n1, n2) = (self.nodes[0] * dim, self.nodes[1] * dim);
        let current = DVector::from_fn(dim, |k, _| reference[k] + u[n2 + k] - u[n1 + k]);
        Ok(AxialState {
            reference,
            current,
            length,
        })
    }

    /// Element internal force (size `2 dim`) and tangent stiffness.
    pub fn response(
        &self,
        nodes: &[Node],
        dim: usize,
        kinematics: Kinematics,
        u: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let state = self.state(nodes, dim, u)?;
        let ea = self.youngs_modulus * self.area;
        let l0 = state.length;

        let (force, block) = match kinematics {
            Kinematics::Linear => {
                let e = &state.reference / l0;
                let axial = ea * state.linear();
                (&e * axial, &e * e.transpose() * (ea / l0))
            }
            Kinematics::GreenLagrange => {
                let eps = state.green_lagrange();
                let d = &state.current;
                let material = d * d.transpose() * (ea / (l0 * l0 * l0));
                let geometric = DMatrix::identity(dim, dim) * (ea * eps / l0);
                (d * (ea * eps / l0), material + geometric)
            }
        };

        let mut f = DVector::zeros(2 * dim);
        f.rows_mut(0, dim).copy_from(&(-&force));
        f.rows_mut(dim, dim).copy_from(&force);
        Ok((f, expand_block(&block)))
    }

    /// Consistent mass matrix.
    pub fn mass(&self, nodes: &[Node], dim: usize) -> Result<DMatrix<f64>> {
        let m = self.density * self.area * self.length(nodes, dim)? / 6.0;
        let mut mass = DMatrix::zeros(2 * dim, 2 * dim);
        for k in 0..dim {
            mass[(k, k)] = 2.0 * m;
            mass[(dim + k, dim + k)] = 2.0 * m;
            mass[(k, dim + k)] = m;
            mass[(dim + k, k)] = m;
        }
        Ok(mass)
    }

    fn result(
        &self,
        nodes: &[Node],
        dim: usize,
        kinematics: Kinematics,
        u: &DVector<f64>,
        stress: StressOutput,
        strain: StrainOutput,
    ) -> Result<ElementResult> {
        let state = self.state(nodes, dim, u)?;
        let stretch = state.current_length() / state.length;
        let (green_lagrange, euler_almansi) = match kinematics {
            Kinematics::Linear => (state.linear(), state.linear()),
            Kinematics::GreenLagrange => {
                let gl = state.green_lagrange();
                (gl, gl / (stretch * stretch))
            }
        };
        let pk2 = self.youngs_modulus * green_lagrange;
        // Cauchy stress with a constant cross section.
        let cauchy = match kinematics {
            Kinematics::Linear => pk2,
            Kinematics::GreenLagrange => stretch * pk2,
        };

        Ok(ElementResult {
            element: self.id,
            stress: match stress {
                StressOutput::None => None,
                StressOutput::SecondPiolaKirchhoff => Some(pk2),
                StressOutput::Cauchy => Some(cauchy),
            },
            strain: match strain {
                StrainOutput::None => None,
                StrainOutput::GreenLagrange => Some(green_lagrange),
                StrainOutput::EulerAlmansi => Some(euler_almansi),
            },
        })
    }
}

/// `[k -k; -k k]`
fn expand_block(block: &DMatrix<f64>) -> DMatrix<f64> {
    let dim = block.nrows();
    let mut k = DMatrix::zeros(2 * dim, 2 * dim);
    k.view_mut((0, 0), (dim, dim)).copy_from(block);
    k.view_mut((dim, dim), (dim, dim)).copy_from(block);
    k.view_mut((0, dim), (dim, dim)).copy_from(&(-block));
    k.view_mut((dim, 0), (dim, dim)).copy_from(&(-block));
    k
}

/// A set of trusses sharing one node list, evaluated as a whole.
#[derive(Debug, Clone)]
pub struct TrussNetwork {
    dim: usize,
    nodes: Vec<Node>,
    elements: Vec<Truss>,
    kinematics: Kinematics,
}

impl TrussNetwork {
    pub fn new(
        dim: usize,
        nodes: Vec<Node>,
        elements: Vec<Truss>,
        kinematics: Kinematics,
    ) -> Result<Self> {
        if !(1..=3).contains(&dim) {
            return Err(SolverError::Configuration(format!(
                "truss network dimension must be 1, 2 or 3, got {dim}"
            )));
        }
        for (index, node) in nodes.iter().enumerate() {
            if node.id != index {
                return Err(SolverError::Configuration(format!(
                    "node ids must be consecutive from 0: found id {} at position {index}",
                    node.id
                )));
            }
        }
        for element in &elements {
            if element.nodes.iter().any(|&n| n >= nodes.len()) {
                return Err(SolverError::Configuration(format!(
                    "truss element {} references an unknown node",
                    element.id
                )));
            }
            if element.area <= 0.0 || element.youngs_modulus <= 0.0 || element.density < 0.0 {
                return Err(SolverError::Configuration(format!(
                    "truss element {} needs positive area and modulus and non-negative density",
                    element.id
                )));
            }
            element.length(&nodes, dim)?;
        }
        Ok(Self {
            dim,
            nodes,
            elements,
            kinematics,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Truss] {
        &self.elements
    }

    pub fn kinematics(&self) -> Kinematics {
        self.kinematics
    }
}

impl ElementEvaluator for TrussNetwork {
    fn num_dofs(&self) -> usize {
        self.nodes.len() * self.dim
    }

    fn dofs_per_node(&self) -> usize {
        self.dim
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<ElementResponse> {
        let n = self.num_dofs();
        let responses = self
            .elements
            .par_iter()
            .map(|element| {
                element
                    .response(&self.nodes, self.dim, self.kinematics, request.displacement)
                    .map(|(f, k)| (element.dofs(self.dim), f, k))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut internal_force = DVector::zeros(n);
        let mut stiffness = DMatrix::zeros(n, n);
        for (dofs, f, k) in responses {
            for (a, &ga) in dofs.iter().enumerate() {
                internal_force[ga] += f[a];
                for (b, &gb) in dofs.iter().enumerate() {
                    stiffness[(ga, gb)] += k[(a, b)];
                }
            }
        }
        Ok(ElementResponse {
            internal_force,
            stiffness,
        })
    }

    fn mass_matrix(&self) -> Result<DMatrix<f64>> {
        let n = self.num_dofs();
        let mut mass = DMatrix::zeros(n, n);
        for element in &self.elements {
            let m = element.mass(&self.nodes, self.dim)?;
            let dofs = element.dofs(self.dim);
            for (a, &ga) in dofs.iter().enumerate() {
                for (b, &gb) in dofs.iter().enumerate() {
                    mass[(ga, gb)] += m[(a, b)];
                }
            }
        }
        Ok(mass)
    }

    fn element_results(
        &self,
        displacement: &DVector<f64>,
        stress: StressOutput,
        strain: StrainOutput,
    ) -> Result<Vec<ElementResult>> {
        if stress == StressOutput::None && strain == StrainOutput::None {
            return Ok(Vec::new());
        }
        self.elements
            .par_iter()
            .map(|element| {
                element.result(
                    &self.nodes,
                    self.dim,
                    self.kinematics,
                    displacement,
                    stress,
                    strain,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bar(kinematics: Kinematics) -> TrussNetwork {
        let nodes = vec![Node::new(0, 0.0, 0.0, 0.0), Node::new(1, 2.0, 0.0, 0.0)];
        let elements = vec![Truss::new(0, [0, 1], 0.5, 200.0, 3.0)];
        TrussNetwork::new(1, nodes, elements, kinematics).expect("valid bar")
    }

    fn evaluate(network: &TrussNetwork, u: &DVector<f64>) -> ElementResponse {
        let zero = DVector::zeros(u.len());
        network
            .evaluate(&EvaluationRequest {
                displacement: u,
                residual_displacement: &zero,
                time: 0.0,
                dt: 1.0,
                alpha_f: 0.0,
            })
            .expect("evaluation")
    }

    #[test]
    fn creates_truss_element() {
        let elem = Truss::new(1, [1, 2], 0.01, 210000.0, 7.8e-9);
        assert_eq!(elem.id, 1);
        assert_eq!(elem.nodes, [1, 2]);
        assert_eq!(elem.dofs(2), vec![2, 3, 4, 5]);
    }

    #[test]
    fn computes_length_3d() {
        let nodes = vec![Node::new(0, 0.0, 0.0, 0.0), Node::new(1, 2.0, 3.0, 6.0)];
        let elem = Truss::new(0, [0, 1], 1.0, 1.0, 0.0);
        assert_relative_eq!(elem.length(&nodes, 3).expect("length"), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_zero_length() {
        let nodes = vec![Node::new(0, 1.0, 2.0, 0.0), Node::new(1, 1.0, 2.0, 0.0)];
        let result = TrussNetwork::new(2, nodes, vec![Truss::new(0, [0, 1], 1.0, 1.0, 0.0)], Kinematics::Linear);
        assert!(matches!(result, Err(SolverError::Element(msg)) if msg.contains("zero")));
    }

    #[test]
    fn rejects_unknown_node() {
        let nodes = vec![Node::new(0, 0.0, 0.0, 0.0)];
        let result = TrussNetwork::new(1, nodes, vec![Truss::new(0, [0, 3], 1.0, 1.0, 0.0)], Kinematics::Linear);
        assert!(matches!(result, Err(SolverError::Configuration(_))));
    }

    #[test]
    fn linear_bar_force_is_ea_over_l_times_elongation() {
        let network = bar(Kinematics::Linear);
        let u = DVector::from_vec(vec![0.0, 0.01]);
        let response = evaluate(&network, &u);
        // EA/L = 200 * 0.5 / 2 = 50
        assert_relative_eq!(response.internal_force[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(response.internal_force[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(response.stiffness[(1, 1)], 50.0, epsilon = 1e-12);
        assert_relative_eq!(response.stiffness[(0, 1)], -50.0, epsilon = 1e-12);
    }

    #[test]
    fn green_lagrange_tangent_matches_finite_differences() {
        let nodes = vec![Node::new(0, 0.0, 0.0, 0.0), Node::new(1, 1.0, 0.5, 0.0)];
        let network = TrussNetwork::new(
            2,
            nodes,
            vec![Truss::new(0, [0, 1], 1.0, 100.0, 0.0)],
            Kinematics::GreenLagrange,
        )
        .expect("valid truss");
        let u = DVector::from_vec(vec![0.01, -0.02, 0.05, 0.03]);
        let response = evaluate(&network, &u);

        let h = 1e-7;
        for j in 0..4 {
            let mut perturbed = u.clone();
            perturbed[j] += h;
            let forward = evaluate(&network, &perturbed).internal_force;
            for i in 0..4 {
                let fd = (forward[i] - response.internal_force[i]) / h;
                assert_relative_eq!(response.stiffness[(i, j)], fd, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn consistent_mass_sums_to_total_mass() {
        let network = bar(Kinematics::Linear);
        let mass = network.mass_matrix().expect("mass");
        // rho A L = 3 * 0.5 * 2 = 3
        assert_relative_eq!(mass.sum(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(mass[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn stress_measures_for_stretched_bar() {
        let network = bar(Kinematics::GreenLagrange);
        // stretch 1.1
        let u = DVector::from_vec(vec![0.0, 0.2]);
        let results = network
            .element_results(&u, StressOutput::Cauchy, StrainOutput::GreenLagrange)
            .expect("results");
        let gl = (1.21 - 1.0) / 2.0;
        assert_relative_eq!(results[0].strain.expect("strain"), gl, epsilon = 1e-12);
        assert_relative_eq!(results[0].stress.expect("stress"), 1.1 * 200.0 * gl, epsilon = 1e-10);

        let none = network
            .element_results(&u, StressOutput::None, StrainOutput::None)
            .expect("results");
        assert!(none.is_empty());
    }
}
