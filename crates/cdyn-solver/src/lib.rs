//! Implicit structural dynamics with mortar contact.
//!
//! This crate provides:
//! - **Generalized-alpha** time integration of nonlinear structural dynamics
//!   ([`GenAlphaIntegrator`]), with Newmark as the `alpha_f = alpha_m = 0` case
//! - **Mortar contact** with Lagrange multipliers and a primal-dual active set
//!   ([`ContactConstraintManager`]), frictionless or with Tresca/Coulomb friction
//! - An **active-set Newton solver** ([`ActiveSetNewtonSolver`]) with a nested
//!   fixed-point and a merged semi-smooth strategy
//! - Collaborator implementations: a truss element evaluator, dense LU and
//!   BiCGStab linear solver backends, boundary conditions with load curves
//!
//! # Example
//!
//! ```no_run
//! use cdyn_solver::ProblemDefinition;
//!
//! # fn example() -> cdyn_solver::Result<()> {
//! let problem = ProblemDefinition::load("blocks.json")?;
//! let mut solver = problem.build()?;
//! for report in solver.integrate(None)? {
//!     println!("step {} converged in {} iterations", report.step, report.newton_iterations);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod boundary_conditions;
pub mod config;
pub mod contact;
pub mod contact_integrator;
pub mod convergence;
pub mod dynamic_system;
pub mod elements;
pub mod error;
pub mod evaluator;
pub mod genalpha;
pub mod mesh;
pub mod problem;
pub mod solver;
pub mod state;

pub use backend::{
    BackendError, BiCgStabBackend, LinearSolver, LinearSystemData, NativeBackend, SolveInfo,
    SolveOptions, SparseTripletsF64, create_backend, default_backend,
};
pub use boundary_conditions::{
    BoundaryConditions, ConcentratedLoad, DirichletState, DisplacementBC, DofId, LoadCurve,
};
pub use config::{
    ActiveSetFailurePolicy, ContactConfig, ContactStrategy, ConvCheck, DynamicType, FrictionLaw,
    GenAlphaParams, InternalForcePoint, LinearSolverKind, NewtonConfig, OutputConfig,
    PredictorKind, RayleighDamping, SolverConfig, StrainOutput, StressOutput, TimeConfig,
    UpdateMode,
};
pub use contact::{
    ActiveSet, ContactConstraintManager, ContactInterfaceDefinition, ContactPair, NodalQuantity,
    Slot,
};
pub use contact_integrator::ContactAwareIntegrator;
pub use convergence::{ConvergenceCheck, IterationNorms, ReferenceNorms};
pub use dynamic_system::DynamicSystem;
pub use elements::{Kinematics, Truss, TrussNetwork};
pub use error::{Result, SolverError};
pub use evaluator::{ElementEvaluator, ElementResponse, ElementResult, EvaluationRequest};
pub use genalpha::{GenAlphaIntegrator, NewmarkCoefficients};
pub use mesh::Node;
pub use problem::ProblemDefinition;
pub use solver::{ActiveSetNewtonSolver, ActiveSetStatus, StepReport};
pub use state::TimeIntegrationState;
