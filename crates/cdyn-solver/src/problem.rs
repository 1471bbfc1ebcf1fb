//! JSON problem definition: truss network, boundary conditions, optional
//! contact interface and run configuration.
//!
//! ```json
//! {
//!   "job_name": "blocks",
//!   "dimension": 2,
//!   "nodes": [{ "id": 0, "x": 0.0, "y": 0.0 }, ...],
//!   "elements": [{ "id": 0, "nodes": [0, 2], "area": 1.0, "youngs_modulus": 100.0 }],
//!   "boundary_conditions": { "displacement_bcs": [...], "concentrated_loads": [...] },
//!   "contact": { "slave_nodes": [4, 5], "master_segments": [[2, 3]] },
//!   "config": { "dynamic_type": "static", "time": { "dt": 0.2, "max_time": 1.0, "num_steps": 5 } }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::create_backend;
use crate::boundary_conditions::BoundaryConditions;
use crate::config::{DynamicType, SolverConfig};
use crate::contact::{ContactConstraintManager, ContactInterfaceDefinition};
use crate::contact_integrator::ContactAwareIntegrator;
use crate::elements::{Kinematics, Truss, TrussNetwork};
use crate::error::{Result, SolverError};
use crate::genalpha::GenAlphaIntegrator;
use crate::mesh::Node;
use crate::solver::ActiveSetNewtonSolver;

fn default_job_name() -> String {
    "cdyn".to_string()
}

fn default_dimension() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDefinition {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    /// Spatial dimension and DOFs per node
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    pub nodes: Vec<Node>,
    pub elements: Vec<Truss>,
    #[serde(default)]
    pub kinematics: Kinematics,
    #[serde(default)]
    pub boundary_conditions: BoundaryConditions,
    #[serde(default)]
    pub contact: Option<ContactInterfaceDefinition>,
    /// Replace the initial acceleration by the equilibrium one.
    #[serde(default)]
    pub consistent_initial_acceleration: bool,
    #[serde(default)]
    pub config: SolverConfig,
}

impl ProblemDefinition {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SolverError::Io(e.into()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SolverError::Io(e.into()))?;
        Self::from_json_str(&text)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.nodes.len() * self.dimension
    }

    /// Short description for the job report.
    pub fn analysis_type(&self) -> String {
        let kind = match self.config.dynamic_type {
            DynamicType::Static => "static",
            DynamicType::GenAlpha => "generalized-alpha",
        };
        match &self.contact {
            Some(_) => format!("{kind} with contact"),
            None => kind.to_string(),
        }
    }

    /// Set up integrator, contact manager and solver.
    pub fn build(&self) -> Result<ActiveSetNewtonSolver> {
        let network = TrussNetwork::new(
            self.dimension,
            self.nodes.clone(),
            self.elements.clone(),
            self.kinematics,
        )?;
        let mut integrator = GenAlphaIntegrator::new(
            self.config,
            Box::new(network),
            create_backend(self.config.linear_solver),
            self.boundary_conditions.clone(),
        )?;
        if self.consistent_initial_acceleration {
            integrator.consistent_initial_acceleration()?;
        }

        let contact = self
            .contact
            .as_ref()
            .map(|definition| {
                ContactConstraintManager::new(
                    definition.clone(),
                    &self.nodes,
                    self.dimension,
                    self.config.contact,
                    integrator.params().alpha_f,
                    integrator.state().displacement_n(),
                )
            })
            .transpose()?;

        info!(
            job = %self.job_name,
            nodes = self.nodes.len(),
            elements = self.elements.len(),
            dofs = self.num_dofs(),
            analysis = %self.analysis_type(),
            "problem set up"
        );
        let model = ContactAwareIntegrator::new(integrator, contact)?;
        Ok(ActiveSetNewtonSolver::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BARS: &str = r#"{
        "job_name": "bars",
        "nodes": [
            { "id": 0, "x": 0.0, "y": 0.0 },
            { "id": 1, "x": 1.0, "y": 0.0 },
            { "id": 2, "x": 2.0, "y": 0.0 }
        ],
        "elements": [
            { "id": 0, "nodes": [0, 1], "area": 1.0, "youngs_modulus": 10.0, "density": 1.0 },
            { "id": 1, "nodes": [1, 2], "area": 1.0, "youngs_modulus": 10.0, "density": 1.0 }
        ],
        "boundary_conditions": {
            "displacement_bcs": [
                { "node": 0, "first_dof": 0, "last_dof": 1 },
                { "node": 1, "first_dof": 1, "last_dof": 1 },
                { "node": 2, "first_dof": 1, "last_dof": 1 }
            ],
            "concentrated_loads": [{ "node": 2, "dof": 0, "magnitude": 1.0 }]
        },
        "config": { "dynamic_type": "static", "time": { "dt": 1.0, "max_time": 1.0, "num_steps": 1 } }
    }"#;

    #[test]
    fn parses_with_defaults() {
        let problem = ProblemDefinition::from_json_str(TWO_BARS).expect("valid problem");
        assert_eq!(problem.job_name, "bars");
        assert_eq!(problem.dimension, 2);
        assert_eq!(problem.num_dofs(), 6);
        assert!(problem.contact.is_none());
        assert_eq!(problem.kinematics, Kinematics::Linear);
        assert_eq!(problem.analysis_type(), "static");
    }

    #[test]
    fn builds_and_solves() {
        let problem = ProblemDefinition::from_json_str(TWO_BARS).expect("valid problem");
        let mut solver = problem.build().expect("setup");
        let reports = solver.integrate(None).expect("integration");
        assert_eq!(reports.len(), 1);
        let displacement = solver.model().integrator().state().displacement_n();
        // two springs of stiffness 10 in series under a unit load
        assert!((displacement[4] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn invalid_json_is_an_io_error() {
        assert!(matches!(
            ProblemDefinition::from_json_str("{ not json"),
            Err(SolverError::Io(_))
        ));
    }

    #[test]
    fn contact_on_unknown_node_is_rejected() {
        let mut problem = ProblemDefinition::from_json_str(TWO_BARS).expect("valid problem");
        problem.contact = Some(ContactInterfaceDefinition::new(vec![1, 7], vec![[0, 2]]));
        assert!(matches!(problem.build(), Err(SolverError::Configuration(_))));
    }
}
