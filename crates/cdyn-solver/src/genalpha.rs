//! Generalized-alpha time integration of nonlinear structural dynamics.
//!
//! Solves the semi-discrete equation of motion at the generalized mid-point:
//!
//! ```text
//! M a_mid + C v_mid + F_int(d_mid) - f_ext,mid = 0
//!
//! X_mid = (1 - alpha_f) X_np1 + alpha_f X_n      (d, v, f_ext)
//! a_mid = (1 - alpha_m) a_np1 + alpha_m a_n
//! ```
//!
//! with the Newmark relations linking `v_np1`, `a_np1` to `d_np1`:
//!
//! ```text
//! v_np1 = γ/(β dt) Δd + (β-γ)/β v_n + (2β-γ) dt/(2β) a_n
//! a_np1 = 1/(β dt²) Δd - 1/(β dt) v_n + (2β-1)/(2β) a_n
//! ```
//!
//! The integrator owns the element evaluator, the linear solver and the
//! converged state. It does not iterate on its own: the Newton loop in
//! [`solver`](crate::solver) drives `predict`, `update_iterate` and
//! `finalize`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use cdyn_io::{NamedField, RestartState};

use crate::backend::{LinearSolver, SolveOptions};
use crate::boundary_conditions::{BoundaryConditions, DirichletState};
use crate::config::{
    DynamicType, GenAlphaParams, InternalForcePoint, PredictorKind, SolverConfig, UpdateMode,
};
use crate::convergence::ReferenceNorms;
use crate::dynamic_system::DynamicSystem;
use crate::error::{Result, SolverError};
use crate::evaluator::{ElementEvaluator, ElementResponse, ElementResult, EvaluationRequest};
use crate::state::{TimeIntegrationState, mid_point};

/// Coefficients of the Newmark relations for a fixed step size.
///
/// `v_np1 = v_d Δd + v_v v_n + v_a a_n`, `a_np1 = a_d Δd + a_v v_n + a_a a_n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewmarkCoefficients {
    pub v_d: f64,
    pub v_v: f64,
    pub v_a: f64,
    pub a_d: f64,
    pub a_v: f64,
    pub a_a: f64,
}

impl NewmarkCoefficients {
    pub fn new(params: &GenAlphaParams, dt: f64) -> Self {
        let (beta, gamma) = (params.beta, params.gamma);
        match params.delta {
            None => Self {
                v_d: gamma / (beta * dt),
                v_v: (beta - gamma) / beta,
                v_a: (2.0 * beta - gamma) * dt / (2.0 * beta),
                a_d: 1.0 / (beta * dt * dt),
                a_v: -1.0 / (beta * dt),
                a_a: (2.0 * beta - 1.0) / (2.0 * beta),
            },
            Some(delta) => Self {
                v_d: gamma / (delta * dt),
                v_v: (delta - gamma) / delta,
                v_a: (-gamma - 2.0 * delta * gamma + 2.0 * beta * gamma + 2.0 * delta) * dt
                    / (2.0 * delta),
                a_d: 1.0 / (delta * dt * dt),
                a_v: -1.0 / (delta * dt),
                a_a: (2.0 * beta - 1.0) / (2.0 * delta),
            },
        }
    }
}

/// Invert the mid-point rule: `X_end = (X_mid - alpha X_start) / (1 - alpha)`.
fn end_point(mid: &DVector<f64>, start: &DVector<f64>, alpha: f64) -> DVector<f64> {
    (mid - start * alpha) / (1.0 - alpha)
}

pub struct GenAlphaIntegrator {
    config: SolverConfig,
    evaluator: Box<dyn ElementEvaluator>,
    linear_solver: Box<dyn LinearSolver>,
    bcs: BoundaryConditions,
    /// `None` in quasi-static analysis
    mass: Option<DMatrix<f64>>,
    damping: Option<DMatrix<f64>>,
    state: TimeIntegrationState,
    /// Tangent stiffness at the last evaluation point
    stiffness: DMatrix<f64>,
    /// Prescribed values and mask at `t_np1` (at `t_n` before the first predictor)
    dirichlet: DirichletState,
    time: f64,
    step: usize,
    residual_evaluations: usize,
}

impl std::fmt::Debug for GenAlphaIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAlphaIntegrator")
            .field("num_dofs", &self.num_dofs())
            .field("linear_solver", &self.linear_solver.name())
            .field("time", &self.time)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl GenAlphaIntegrator {
    /// Validate the configuration and set up the initial state at `start_time`.
    ///
    /// Dirichlet values at the start time are applied to `d_n`. In dynamic
    /// analysis the mass matrix is requested once and Rayleigh damping, if
    /// configured, uses the initial tangent stiffness.
    pub fn new(
        config: SolverConfig,
        evaluator: Box<dyn ElementEvaluator>,
        linear_solver: Box<dyn LinearSolver>,
        bcs: BoundaryConditions,
    ) -> Result<Self> {
        config.validate()?;
        let mut config = config;
        config.gen_alpha = config.integration_params();
        let num_dofs = evaluator.num_dofs();
        let dofs_per_node = evaluator.dofs_per_node();
        if num_dofs == 0 || dofs_per_node == 0 {
            return Err(SolverError::config("element evaluator reports no DOFs"));
        }

        let time = config.time.start_time;
        let dirichlet = bcs.evaluate_dirichlet(time, dofs_per_node, num_dofs)?;
        let mut state = TimeIntegrationState::zeros(num_dofs);
        apply_prescribed(&mut state.displacement_n, &dirichlet);
        if config.dynamic_type == DynamicType::GenAlpha {
            state.external_force_n = bcs.evaluate_neumann(time, dofs_per_node, num_dofs)?;
        }

        let mut integrator = Self {
            config,
            evaluator,
            linear_solver,
            bcs,
            mass: None,
            damping: None,
            state,
            stiffness: DMatrix::zeros(num_dofs, num_dofs),
            dirichlet,
            time,
            step: 0,
            residual_evaluations: 0,
        };
        integrator.reset_end_states();

        let needs_initial_response = config.internal_force_point == InternalForcePoint::EndPoint
            || (!integrator.is_static() && config.damping.is_some());
        if needs_initial_response {
            let response = integrator.evaluate_at_n()?;
            if config.internal_force_point == InternalForcePoint::EndPoint {
                integrator.state.internal_force_n = response.internal_force.clone();
            }
            integrator.stiffness = response.stiffness;
        }

        if !integrator.is_static() {
            let mass = integrator.evaluator.mass_matrix()?;
            check_square(&mass, num_dofs, "mass matrix")?;
            if let Some(rayleigh) = config.damping {
                integrator.damping = Some(
                    &mass * rayleigh.mass_factor + &integrator.stiffness * rayleigh.stiffness_factor,
                );
            }
            integrator.mass = Some(mass);
        }

        debug!(
            num_dofs,
            dynamic_type = ?config.dynamic_type,
            damping = integrator.damping.is_some(),
            "generalized-alpha integrator set up"
        );
        Ok(integrator)
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn params(&self) -> &GenAlphaParams {
        &self.config.gen_alpha
    }

    pub fn state(&self) -> &TimeIntegrationState {
        &self.state
    }

    pub fn evaluator(&self) -> &dyn ElementEvaluator {
        self.evaluator.as_ref()
    }

    pub fn num_dofs(&self) -> usize {
        self.state.num_dofs()
    }

    pub fn dofs_per_node(&self) -> usize {
        self.evaluator.dofs_per_node()
    }

    pub fn is_static(&self) -> bool {
        self.config.dynamic_type == DynamicType::Static
    }

    /// Time `t_n` of the last converged state.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.config.time.dt
    }

    /// Number of finalized steps.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Element evaluations since the last predictor.
    pub fn residual_evaluations(&self) -> usize {
        self.residual_evaluations
    }

    pub fn dirichlet_toggle(&self) -> &[bool] {
        &self.dirichlet.toggle
    }

    pub fn mass(&self) -> Option<&DMatrix<f64>> {
        self.mass.as_ref()
    }

    pub fn damping(&self) -> Option<&DMatrix<f64>> {
        self.damping.as_ref()
    }

    /// Overwrite the converged state, e.g. with initial conditions.
    pub fn set_initial_state(
        &mut self,
        displacement: DVector<f64>,
        velocity: DVector<f64>,
        acceleration: DVector<f64>,
    ) -> Result<()> {
        let n = self.num_dofs();
        for (name, v) in [
            ("displacement", &displacement),
            ("velocity", &velocity),
            ("acceleration", &acceleration),
        ] {
            if v.len() != n {
                return Err(SolverError::config(format!(
                    "initial {name} has {} entries, expected {n}",
                    v.len()
                )));
            }
        }
        self.state.displacement_n = displacement;
        if self.is_static() {
            self.state.zero_rates();
        } else {
            self.state.velocity_n = velocity;
            self.state.acceleration_n = acceleration;
        }
        self.refresh_converged_internal_force()?;
        self.reset_end_states();
        Ok(())
    }

    /// Replace `a_n` by the acceleration in equilibrium with the initial state:
    /// `M a_0 = f_0 - F_int(d_0) - C v_0` on the free DOFs.
    ///
    /// No-op in quasi-static analysis.
    pub fn consistent_initial_acceleration(&mut self) -> Result<()> {
        let Some(mass) = self.mass.as_ref() else {
            return Ok(());
        };
        let response = self.evaluate_at_n()?;
        let mut residual = response.internal_force - &self.state.external_force_n;
        if let Some(damping) = &self.damping {
            residual += damping * &self.state.velocity_n;
        }

        let mut system = DynamicSystem::new(self.num_dofs(), 0);
        system.set_structural(mass, &residual);
        system.blank_dirichlet(&self.dirichlet.toggle);
        system.validate()?;
        let acceleration =
            system.solve_with_backend(self.linear_solver.as_mut(), &SolveOptions::default())?;

        debug!(norm = acceleration.norm(), "consistent initial acceleration");
        self.state.acceleration_n = acceleration;
        self.reset_end_states();
        Ok(())
    }

    /// Predict the state at `t_np1 = t_n + dt`.
    ///
    /// Updates prescribed values and external loads to `t_np1` and recomputes
    /// all mid states. Element forces are not evaluated here.
    pub fn predict(&mut self, mode: PredictorKind) -> Result<()> {
        let dt = self.dt();
        let t_np1 = self.time + dt;
        let (dofs_per_node, num_dofs) = (self.dofs_per_node(), self.num_dofs());
        self.dirichlet = self.bcs.evaluate_dirichlet(t_np1, dofs_per_node, num_dofs)?;
        self.state.external_force_np1 = self.bcs.evaluate_neumann(t_np1, dofs_per_node, num_dofs)?;

        let mut displacement = self.state.displacement_n.clone();
        if !self.is_static() && mode == PredictorKind::Consistent {
            displacement += &self.state.velocity_n * dt;
            displacement += &self.state.acceleration_n * (0.5 * dt * dt);
        }
        apply_prescribed(&mut displacement, &self.dirichlet);

        if self.is_static() {
            self.state.zero_rates();
        } else {
            match mode {
                PredictorKind::Constant => {
                    self.state.velocity_np1 = self.state.velocity_n.clone();
                    self.state.acceleration_np1 = self.state.acceleration_n.clone();
                }
                PredictorKind::Consistent => {
                    let (velocity, acceleration) = self.newmark_rates(&displacement);
                    self.state.velocity_np1 = velocity;
                    self.state.acceleration_np1 = acceleration;
                }
            }
        }
        self.state.displacement_np1 = displacement;
        self.state.residual_displacement.fill(0.0);
        let params = self.config.gen_alpha;
        self.state.update_mid(&params);
        self.residual_evaluations = 0;

        debug!(
            step = self.step + 1,
            time = t_np1,
            predictor = mode.as_str(),
            prescribed = self.dirichlet.num_constrained(),
            "predictor"
        );
        Ok(())
    }

    /// Evaluate internal forces and tangent stiffness at the configured point.
    pub fn evaluate_elements(&mut self) -> Result<()> {
        let dt = self.dt();
        let displacement = match self.config.internal_force_point {
            InternalForcePoint::MidPoint => &self.state.displacement_mid,
            InternalForcePoint::EndPoint => &self.state.displacement_np1,
        };
        let request = EvaluationRequest {
            displacement,
            residual_displacement: &self.state.residual_displacement,
            time: self.time + dt,
            dt,
            alpha_f: self.params().alpha_f,
        };
        let response = self.evaluator.evaluate(&request)?;
        self.check_response(&response)?;
        self.state.internal_force = response.internal_force;
        self.stiffness = response.stiffness;
        self.residual_evaluations += 1;
        Ok(())
    }

    /// Structural residual at the generalized mid-point.
    ///
    /// ```text
    /// dynamic: R = M a_mid + C v_mid + F_int - f_mid
    /// static:  R = F_int - f_mid
    /// ```
    pub fn assemble_dynamic_residual(&self) -> DVector<f64> {
        let s = &self.state;
        let mut residual = self.internal_force_term() - &s.external_force_mid;
        if let Some(mass) = &self.mass {
            residual += mass * &s.acceleration_mid;
        }
        if let Some(damping) = &self.damping {
            residual += damping * &s.velocity_mid;
        }
        residual
    }

    /// Internal force entering the residual.
    pub fn internal_force_term(&self) -> DVector<f64> {
        let s = &self.state;
        match self.config.internal_force_point {
            InternalForcePoint::MidPoint => s.internal_force.clone(),
            InternalForcePoint::EndPoint => {
                mid_point(&s.internal_force, &s.internal_force_n, self.params().alpha_f)
            }
        }
    }

    /// Derivative of the residual with respect to `d_np1`.
    ///
    /// `K_eff = (1-αf) K + (1-αm)/(β dt²) M + (1-αf) γ/(β dt) C`
    pub fn assemble_effective_tangent(&self) -> DMatrix<f64> {
        let params = self.params();
        let c = NewmarkCoefficients::new(params, self.dt());
        let mut tangent = &self.stiffness * (1.0 - params.alpha_f);
        if let Some(mass) = &self.mass {
            tangent += mass * ((1.0 - params.alpha_m) * c.a_d);
        }
        if let Some(damping) = &self.damping {
            tangent += damping * ((1.0 - params.alpha_f) * c.v_d);
        }
        tangent
    }

    /// Fresh linearized system with room for `num_multipliers` contact unknowns.
    pub fn build_system(&self, num_multipliers: usize) -> DynamicSystem {
        let mut system = DynamicSystem::new(self.num_dofs(), num_multipliers);
        system.set_structural(&self.assemble_effective_tangent(), &self.assemble_dynamic_residual());
        system
    }

    /// Blank Dirichlet DOFs and solve for `[Δd | Δz]`.
    ///
    /// From the second iteration on, the linear solver tolerance may be
    /// adapted to the current nonlinear residual; it is reset afterwards.
    pub fn solve(
        &mut self,
        system: &mut DynamicSystem,
        iteration: usize,
        residual_norm: f64,
    ) -> Result<DVector<f64>> {
        system.blank_dirichlet(&self.dirichlet.toggle);
        let newton = self.config.newton;
        let adapt = newton.adaptive_tolerance && iteration > 0;
        if adapt {
            self.linear_solver.adapt_tolerance(
                newton.tol_residual,
                residual_norm,
                newton.adaptive_improvement,
            );
        }
        let options = SolveOptions {
            initial_guess: None,
            refactor: true,
            reuse_preconditioner: iteration > 0,
        };
        let solution = system.solve_with_backend(self.linear_solver.as_mut(), &options);
        if adapt {
            self.linear_solver.reset_tolerance();
        }
        solution
    }

    /// Apply a Newton increment of the structural DOFs.
    pub fn update_iterate(&mut self, increment: &DVector<f64>) -> Result<()> {
        if increment.len() != self.num_dofs() {
            return Err(SolverError::config(format!(
                "increment has {} entries, expected {}",
                increment.len(),
                self.num_dofs()
            )));
        }
        self.state.displacement_np1 += increment;

        if !self.is_static() {
            match self.config.update_mode {
                UpdateMode::Iterative => {
                    let c = NewmarkCoefficients::new(self.params(), self.dt());
                    self.state.velocity_np1 += increment * c.v_d;
                    self.state.acceleration_np1 += increment * c.a_d;
                }
                UpdateMode::Incremental => {
                    let (velocity, acceleration) =
                        self.newmark_rates(&self.state.displacement_np1);
                    self.state.velocity_np1 = velocity;
                    self.state.acceleration_np1 = acceleration;
                }
            }
        }

        self.state.residual_displacement = match self.config.internal_force_point {
            InternalForcePoint::MidPoint => increment * (1.0 - self.params().alpha_f),
            InternalForcePoint::EndPoint => increment.clone(),
        };
        let params = self.config.gen_alpha;
        self.state.update_mid(&params);
        Ok(())
    }

    /// Accept the converged step: shift end-of-step quantities to `_n`.
    pub fn finalize(&mut self) -> Result<()> {
        let GenAlphaParams {
            alpha_f, alpha_m, ..
        } = *self.params();
        let s = &mut self.state;
        s.displacement_n = end_point(&s.displacement_mid, &s.displacement_n, alpha_f);
        if self.config.dynamic_type == DynamicType::Static {
            s.zero_rates();
            s.external_force_n.fill(0.0);
        } else {
            s.velocity_n = end_point(&s.velocity_mid, &s.velocity_n, alpha_f);
            s.acceleration_n = end_point(&s.acceleration_mid, &s.acceleration_n, alpha_m);
            s.external_force_n = s.external_force_np1.clone();
        }
        if self.config.internal_force_point == InternalForcePoint::EndPoint {
            s.internal_force_n = s.internal_force.clone();
        }

        self.evaluator.update_step(&self.state.displacement_n)?;
        self.time += self.dt();
        self.step += 1;
        self.reset_end_states();
        Ok(())
    }

    /// Scales for the relative convergence modes.
    pub fn reference_norms(&self) -> ReferenceNorms {
        let s = &self.state;
        let inertia = self
            .mass
            .as_ref()
            .map_or(0.0, |mass| (mass * &s.acceleration_mid).norm());
        ReferenceNorms {
            displacement: s.displacement_n.norm(),
            force: s
                .internal_force
                .norm()
                .max(s.external_force_mid.norm())
                .max(inertia),
        }
    }

    /// Per-element stress/strain of the converged state.
    pub fn element_results(&self) -> Result<Vec<ElementResult>> {
        let output = &self.config.output;
        self.evaluator
            .element_results(&self.state.displacement_n, output.stress, output.strain)
    }

    /// Nodal result fields of the converged state.
    pub fn result_fields(&self) -> Vec<NamedField> {
        let s = &self.state;
        vec![
            NamedField::new("displacement", s.displacement_n.as_slice().to_vec()),
            NamedField::new("velocity", s.velocity_n.as_slice().to_vec()),
            NamedField::new("acceleration", s.acceleration_n.as_slice().to_vec()),
            NamedField::new("fexternal", s.external_force_n.as_slice().to_vec()),
        ]
    }

    pub fn write_restart(&self, restart: &mut RestartState) {
        for field in self.result_fields() {
            restart.insert_vector(field.name, field.values);
        }
    }

    /// Restore the converged state written by [`write_restart`](Self::write_restart).
    pub fn read_restart(&mut self, restart: &RestartState) -> Result<()> {
        let n = self.num_dofs();
        let read = |name: &str| -> Result<DVector<f64>> {
            Ok(DVector::from_column_slice(restart.vector_with_len(name, n)?))
        };
        self.state.displacement_n = read("displacement")?;
        self.state.velocity_n = read("velocity")?;
        self.state.acceleration_n = read("acceleration")?;
        self.state.external_force_n = read("fexternal")?;
        self.time = restart.time;
        self.step = restart.step;
        self.dirichlet =
            self.bcs
                .evaluate_dirichlet(self.time, self.dofs_per_node(), self.num_dofs())?;
        self.refresh_converged_internal_force()?;
        self.reset_end_states();
        debug!(step = self.step, time = self.time, "integrator state restored");
        Ok(())
    }

    fn newmark_rates(&self, displacement_np1: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let c = NewmarkCoefficients::new(self.params(), self.dt());
        let s = &self.state;
        let delta = displacement_np1 - &s.displacement_n;
        let velocity = &delta * c.v_d + &s.velocity_n * c.v_v + &s.acceleration_n * c.v_a;
        let acceleration = &delta * c.a_d + &s.velocity_n * c.a_v + &s.acceleration_n * c.a_a;
        (velocity, acceleration)
    }

    /// End states equal to the converged state, mid states recomputed.
    fn reset_end_states(&mut self) {
        let s = &mut self.state;
        s.displacement_np1 = s.displacement_n.clone();
        s.velocity_np1 = s.velocity_n.clone();
        s.acceleration_np1 = s.acceleration_n.clone();
        s.external_force_np1 = s.external_force_n.clone();
        s.residual_displacement.fill(0.0);
        let params = self.config.gen_alpha;
        s.update_mid(&params);
    }

    fn refresh_converged_internal_force(&mut self) -> Result<()> {
        if self.config.internal_force_point == InternalForcePoint::EndPoint {
            self.state.internal_force_n = self.evaluate_at_n()?.internal_force;
        }
        Ok(())
    }

    fn evaluate_at_n(&self) -> Result<ElementResponse> {
        let zero = DVector::zeros(self.num_dofs());
        let response = self.evaluator.evaluate(&EvaluationRequest {
            displacement: &self.state.displacement_n,
            residual_displacement: &zero,
            time: self.time,
            dt: self.dt(),
            alpha_f: self.params().alpha_f,
        })?;
        self.check_response(&response)?;
        Ok(response)
    }

    fn check_response(&self, response: &ElementResponse) -> Result<()> {
        let n = self.num_dofs();
        if response.internal_force.len() != n {
            return Err(SolverError::Element(format!(
                "internal force has {} entries, expected {n}",
                response.internal_force.len()
            )));
        }
        check_square(&response.stiffness, n, "stiffness matrix")
    }
}

fn apply_prescribed(displacement: &mut DVector<f64>, dirichlet: &DirichletState) {
    for (dof, &fixed) in dirichlet.toggle.iter().enumerate() {
        if fixed {
            displacement[dof] = dirichlet.values[dof];
        }
    }
}

fn check_square(matrix: &DMatrix<f64>, n: usize, what: &str) -> Result<()> {
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(SolverError::Element(format!(
            "{what} is {}x{}, expected {n}x{n}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    Ok(())
}
