//! Run configuration.
//!
//! One [`SolverConfig`] is built per simulation run and handed to the
//! integrator by value; there is no process-wide parameter state. All groups
//! deserialize from JSON with defaults for omitted fields.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Kind of structural analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicType {
    /// Quasi-static: no inertia or damping, velocity/acceleration stay zero.
    Static,
    #[default]
    GenAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    /// Previous displacement, previous velocity and acceleration.
    #[default]
    Constant,
    /// Displacement extrapolated from velocity/acceleration, Newmark-consistent rates.
    Consistent,
}

impl PredictorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictorKind::Constant => "constant",
            PredictorKind::Consistent => "consistent",
        }
    }
}

/// How a Newton increment is folded into velocities and accelerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Add the increment times the Newmark derivative factors.
    Iterative,
    /// Recompute rates from the total step displacement.
    #[default]
    Incremental,
}

/// Configuration at which internal forces are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalForcePoint {
    /// `F_int(d_mid)` (implicit-midpoint-like).
    #[default]
    MidPoint,
    /// `(1-alpha_f) F_int(d_np1) + alpha_f F_int(d_n)` (trapezoidal-like).
    EndPoint,
}

/// Newton convergence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConvCheck {
    #[serde(rename = "AbsRes_And_AbsDis")]
    AbsResAndAbsDis,
    #[default]
    #[serde(rename = "AbsRes_Or_AbsDis")]
    AbsResOrAbsDis,
    #[serde(rename = "RelRes_And_AbsDis")]
    RelResAndAbsDis,
    #[serde(rename = "RelRes_Or_AbsDis")]
    RelResOrAbsDis,
    #[serde(rename = "RelRes_And_RelDis")]
    RelResAndRelDis,
    #[serde(rename = "RelRes_Or_RelDis")]
    RelResOrRelDis,
}

impl ConvCheck {
    /// Whether reference norms are needed.
    pub fn is_relative(self) -> bool {
        !matches!(self, ConvCheck::AbsResAndAbsDis | ConvCheck::AbsResOrAbsDis)
    }
}

/// Generalized-alpha parameters.
///
/// Mid-point quantities are `X_mid = (1 - alpha) X_np1 + alpha X_n`, so
/// `alpha_f = alpha_m = 0` recovers plain Newmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenAlphaParams {
    pub alpha_f: f64,
    pub alpha_m: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Backward-Euler variant parameter replacing `beta` in the divisors.
    pub delta: Option<f64>,
}

impl Default for GenAlphaParams {
    fn default() -> Self {
        Self {
            alpha_f: 0.459,
            alpha_m: 0.378,
            beta: 0.292,
            gamma: 0.581,
            delta: None,
        }
    }
}

impl GenAlphaParams {
    /// Trapezoidal rule (average acceleration Newmark): beta = 1/4, gamma = 1/2.
    pub fn trapezoidal() -> Self {
        Self {
            alpha_f: 0.0,
            alpha_m: 0.0,
            beta: 0.25,
            gamma: 0.5,
            delta: None,
        }
    }

    /// Second-order accurate parameters with high-frequency spectral radius `rho_inf`.
    ///
    /// ```text
    /// alpha_f = rho / (rho + 1)
    /// alpha_m = (2 rho - 1) / (rho + 1)
    /// gamma   = 1/2 - alpha_m + alpha_f
    /// beta    = (1 - alpha_m + alpha_f)^2 / 4
    /// ```
    pub fn from_spectral_radius(rho_inf: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rho_inf) {
            return Err(SolverError::config(format!(
                "spectral radius must lie in [0, 1], got {rho_inf}"
            )));
        }
        let alpha_f = rho_inf / (rho_inf + 1.0);
        let alpha_m = (2.0 * rho_inf - 1.0) / (rho_inf + 1.0);
        let shifted = 1.0 - alpha_m + alpha_f;
        Ok(Self {
            alpha_f,
            alpha_m,
            beta: 0.25 * shifted * shifted,
            gamma: 0.5 - alpha_m + alpha_f,
            delta: None,
        })
    }

    #[must_use]
    pub const fn with_backward_euler(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// The divisor used in the Newmark relations: `delta` on the
    /// Backward-Euler path, `beta` otherwise.
    pub fn divisor(&self) -> f64 {
        self.delta.unwrap_or(self.beta)
    }

    /// Reject parameter sets that would divide by zero or extrapolate.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.alpha_f, self.alpha_m, self.beta, self.gamma]
            .iter()
            .chain(self.delta.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(SolverError::config("generalized-alpha parameters must be finite"));
        }
        if !(0.0..1.0).contains(&self.alpha_f) {
            return Err(SolverError::config(format!(
                "alpha_f must lie in [0, 1), got {}",
                self.alpha_f
            )));
        }
        if self.alpha_m >= 1.0 {
            return Err(SolverError::config(format!(
                "alpha_m must be below 1, got {}",
                self.alpha_m
            )));
        }
        if self.gamma <= 0.0 {
            return Err(SolverError::config(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        match self.delta {
            Some(delta) if delta <= 0.0 => Err(SolverError::config(format!(
                "Backward-Euler delta must be positive, got {delta}"
            ))),
            None if self.beta <= 0.0 => Err(SolverError::config(format!(
                "beta must be positive unless the Backward-Euler variant is selected, got {}",
                self.beta
            ))),
            _ => Ok(()),
        }
    }
}

/// Rayleigh damping `C = mass_factor M + stiffness_factor K(d_0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RayleighDamping {
    pub mass_factor: f64,
    pub stiffness_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub start_time: f64,
    pub dt: f64,
    pub max_time: f64,
    pub num_steps: usize,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            dt: 0.1,
            max_time: 1.0,
            num_steps: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    pub tol_residual: f64,
    pub tol_displacement: f64,
    pub conv_check: ConvCheck,
    /// Tighten the linear solver tolerance relative to the nonlinear residual.
    pub adaptive_tolerance: bool,
    pub adaptive_improvement: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tol_residual: 1.0e-7,
            tol_displacement: 1.0e-7,
            conv_check: ConvCheck::default(),
            adaptive_tolerance: false,
            adaptive_improvement: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStrategy {
    /// Predictor and Newton redone until the active set is a fixed point.
    #[default]
    FixedPoint,
    /// Active set updated inside every Newton iteration.
    SemiSmooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "law")]
pub enum FrictionLaw {
    #[default]
    Frictionless,
    /// Constant slip bound.
    Tresca { bound: f64 },
    /// Slip bound `coefficient * normal traction`.
    Coulomb { coefficient: f64 },
}

impl FrictionLaw {
    pub fn is_frictional(&self) -> bool {
        !matches!(self, FrictionLaw::Frictionless)
    }
}

/// What to do when the fixed-point active-set search exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveSetFailurePolicy {
    /// Warn, flag the step and keep the last state.
    #[default]
    Accept,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    pub strategy: ContactStrategy,
    /// Complementarity parameter of the normal condition.
    pub c_n: f64,
    /// Complementarity parameter of the tangential condition.
    pub c_t: f64,
    pub friction: FrictionLaw,
    pub max_active_set_iterations: usize,
    pub on_active_set_failure: ActiveSetFailurePolicy,
    /// Tolerance on the master segment coordinate when projecting slave nodes.
    pub projection_tolerance: f64,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            strategy: ContactStrategy::default(),
            c_n: 1.0,
            c_t: 1.0,
            friction: FrictionLaw::default(),
            max_active_set_iterations: 20,
            on_active_set_failure: ActiveSetFailurePolicy::default(),
            projection_tolerance: 1.0e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressOutput {
    #[default]
    None,
    SecondPiolaKirchhoff,
    Cauchy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrainOutput {
    #[default]
    None,
    GreenLagrange,
    EulerAlmansi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write nodal fields every n-th step.
    pub results_every: usize,
    pub stress: StressOutput,
    pub strain: StrainOutput,
    pub stress_every: usize,
    /// Write a restart every n-th step; 0 disables restarts.
    pub restart_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_every: 1,
            stress: StressOutput::None,
            strain: StrainOutput::None,
            stress_every: 1,
            restart_every: 0,
        }
    }
}

/// Linear solver backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LinearSolverKind {
    /// Dense LU factorization.
    #[default]
    Direct,
    /// Jacobi-preconditioned BiCGStab with a relative tolerance.
    BiCgStab { tolerance: f64, max_iterations: usize },
}

/// Complete configuration of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub time: TimeConfig,
    pub dynamic_type: DynamicType,
    pub gen_alpha: GenAlphaParams,
    pub damping: Option<RayleighDamping>,
    pub predictor: PredictorKind,
    pub update_mode: UpdateMode,
    pub internal_force_point: InternalForcePoint,
    pub newton: NewtonConfig,
    pub linear_solver: LinearSolverKind,
    pub contact: ContactConfig,
    pub output: OutputConfig,
}

impl SolverConfig {
    /// Quasi-static run with `alpha_f = alpha_m = 0`.
    pub fn quasi_static() -> Self {
        Self {
            dynamic_type: DynamicType::Static,
            gen_alpha: GenAlphaParams::trapezoidal(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_time(mut self, dt: f64, max_time: f64, num_steps: usize) -> Self {
        self.time.dt = dt;
        self.time.max_time = max_time;
        self.time.num_steps = num_steps;
        self
    }

    #[must_use]
    pub const fn with_gen_alpha(mut self, params: GenAlphaParams) -> Self {
        self.gen_alpha = params;
        self
    }

    #[must_use]
    pub const fn with_predictor(mut self, predictor: PredictorKind) -> Self {
        self.predictor = predictor;
        self
    }

    #[must_use]
    pub const fn with_update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_internal_force_point(mut self, point: InternalForcePoint) -> Self {
        self.internal_force_point = point;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.newton.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: ContactStrategy) -> Self {
        self.contact.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_friction(mut self, friction: FrictionLaw) -> Self {
        self.contact.friction = friction;
        self
    }

    #[must_use]
    pub const fn with_damping(mut self, mass_factor: f64, stiffness_factor: f64) -> Self {
        self.damping = Some(RayleighDamping {
            mass_factor,
            stiffness_factor,
        });
        self
    }

    /// The single-step, single-iteration static case solved without a
    /// convergence check.
    pub fn is_linear_static(&self) -> bool {
        self.dynamic_type == DynamicType::Static
            && self.newton.max_iterations == 1
            && self.time.num_steps == 1
    }

    /// Parameters the integrator runs with. Static analysis has no rates,
    /// so the mid point collapses onto the end of the step.
    pub fn integration_params(&self) -> GenAlphaParams {
        match self.dynamic_type {
            DynamicType::Static => GenAlphaParams {
                alpha_f: 0.0,
                alpha_m: 0.0,
                ..self.gen_alpha
            },
            DynamicType::GenAlpha => self.gen_alpha,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.gen_alpha.validate()?;

        let time = &self.time;
        if !(time.dt.is_finite() && time.dt > 0.0) {
            return Err(SolverError::config(format!(
                "time step size must be positive, got {}",
                time.dt
            )));
        }
        if time.num_steps == 0 {
            return Err(SolverError::config("number of time steps must be positive"));
        }
        if time.max_time <= time.start_time {
            return Err(SolverError::config(format!(
                "max_time {} must exceed start_time {}",
                time.max_time, time.start_time
            )));
        }

        let newton = &self.newton;
        if newton.max_iterations == 0 {
            return Err(SolverError::config("max_iterations must be at least 1"));
        }
        if newton.tol_residual <= 0.0 || newton.tol_displacement <= 0.0 {
            return Err(SolverError::config("Newton tolerances must be positive"));
        }
        if newton.adaptive_tolerance && !(0.0..1.0).contains(&newton.adaptive_improvement) {
            return Err(SolverError::config(format!(
                "adaptive improvement factor must lie in (0, 1), got {}",
                newton.adaptive_improvement
            )));
        }

        if self.predictor == PredictorKind::Constant && self.update_mode == UpdateMode::Iterative {
            return Err(SolverError::config(
                "constant predictor requires the incremental update",
            ));
        }

        let contact = &self.contact;
        if contact.c_n <= 0.0 || contact.c_t < 0.0 {
            return Err(SolverError::config(format!(
                "complementarity parameters must satisfy c_n > 0, c_t >= 0 (got {}, {})",
                contact.c_n, contact.c_t
            )));
        }
        match contact.friction {
            FrictionLaw::Tresca { bound } if bound < 0.0 => {
                return Err(SolverError::config("Tresca bound must not be negative"));
            }
            FrictionLaw::Coulomb { coefficient } if coefficient < 0.0 => {
                return Err(SolverError::config("friction coefficient must not be negative"));
            }
            _ => {}
        }
        if contact.max_active_set_iterations == 0 {
            return Err(SolverError::config("max_active_set_iterations must be at least 1"));
        }
        if contact.strategy == ContactStrategy::SemiSmooth && self.is_linear_static() {
            return Err(SolverError::config(
                "linear static solution not applicable to semi-smooth Newton case",
            ));
        }

        if let LinearSolverKind::BiCgStab {
            tolerance,
            max_iterations,
        } = self.linear_solver
            && (tolerance <= 0.0 || max_iterations == 0)
        {
            return Err(SolverError::config(
                "iterative solver needs a positive tolerance and iteration budget",
            ));
        }

        if self.output.results_every == 0 || self.output.stress_every == 0 {
            return Err(SolverError::config("output cadences must be at least 1"));
        }
        Ok(())
    }
}
