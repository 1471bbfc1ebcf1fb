//! Active-set Newton solution of contact dynamics.
//!
//! Two strategies combine the geometric Newton iteration with the search
//! for the contact active set:
//!
//! - **fixed point** (nested): predictor, Newton to convergence with the
//!   active set frozen, active-set update; any change redoes the predictor
//!   from the same time level.
//! - **semi-smooth** (merged): one Newton loop whose iterations update the
//!   active set between mortar evaluation and contact assembly. Converged
//!   only when the residual test passes *and* the set did not change in the
//!   last iteration.
//!
//! Without a contact interface both reduce to a plain Newton loop.

use tracing::{debug, info, warn};

use cdyn_io::{ElementRecord, RestartState, ResultWriter, StepRecord};

use crate::config::{ActiveSetFailurePolicy, ContactStrategy, StrainOutput, StressOutput};
use crate::contact_integrator::ContactAwareIntegrator;
use crate::convergence::{ConvergenceCheck, IterationNorms, ReferenceNorms};
use crate::dynamic_system::DynamicSystem;
use crate::error::{Result, SolverError};

const TIME_EPSILON: f64 = 1.0e-12;

/// Outcome of the active-set search of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSetStatus {
    Converged,
    /// Accepted after revisiting an earlier set of the same step.
    ZigZag,
    /// Budget exhausted; the last state was accepted.
    Unconverged,
}

impl ActiveSetStatus {
    pub fn is_converged(self) -> bool {
        self != ActiveSetStatus::Unconverged
    }
}

/// Summary of one accepted time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    /// Time at the end of the step
    pub time: f64,
    pub dt: f64,
    /// Newton iterations summed over all active-set steps
    pub newton_iterations: usize,
    pub active_set_steps: usize,
    pub active_set_status: ActiveSetStatus,
    pub residual_norm: f64,
    pub increment_norm: f64,
    /// Solved by the single-solve linear static path
    pub linear_static: bool,
}

#[derive(Debug, Clone, Copy)]
struct NewtonOutcome {
    iterations: usize,
    norms: IterationNorms,
    linear_static: bool,
}

#[derive(Debug)]
pub struct ActiveSetNewtonSolver {
    model: ContactAwareIntegrator,
    convergence: ConvergenceCheck,
    reference: ReferenceNorms,
}

impl ActiveSetNewtonSolver {
    pub fn new(model: ContactAwareIntegrator) -> Self {
        let convergence = ConvergenceCheck::new(&model.config().newton);
        Self {
            model,
            convergence,
            reference: ReferenceNorms::default(),
        }
    }

    pub fn model(&self) -> &ContactAwareIntegrator {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ContactAwareIntegrator {
        &mut self.model
    }

    pub fn into_model(self) -> ContactAwareIntegrator {
        self.model
    }

    pub fn strategy(&self) -> ContactStrategy {
        self.model.config().contact.strategy
    }

    /// Continue from a restart state.
    pub fn restart_from(&mut self, restart: &RestartState) -> Result<()> {
        self.model.read_restart(restart)?;
        info!(step = restart.step, time = restart.time, "restarted");
        Ok(())
    }

    /// Whether the time loop has reached `max_time` or `num_steps`.
    pub fn is_finished(&self) -> bool {
        let time = &self.model.config().time;
        let integrator = self.model.integrator();
        integrator.step() >= time.num_steps || integrator.time() >= time.max_time - TIME_EPSILON
    }

    /// Run the time loop to the end, writing results when a writer is given.
    pub fn integrate(&mut self, writer: Option<&ResultWriter>) -> Result<Vec<StepReport>> {
        let mut reports = Vec::new();
        while !self.is_finished() {
            let report = self.solve_step()?;
            if let Some(writer) = writer {
                self.write_output(writer, &report)?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Solve and accept one time step.
    pub fn solve_step(&mut self) -> Result<StepReport> {
        let step = self.model.integrator().step() + 1;
        self.model.begin_step();

        let has_contact = self.model.contact().is_some();
        let (outcome, newton_iterations, status) = match (has_contact, self.strategy()) {
            (false, _) => {
                let outcome = self.predict_and_newton(false)?;
                (outcome, outcome.iterations, ActiveSetStatus::Converged)
            }
            (true, ContactStrategy::FixedPoint) => self.fixed_point(step)?,
            (true, ContactStrategy::SemiSmooth) => {
                let outcome = self.predict_and_newton(true)?;
                // the Newton budget is also the active-set budget
                if !self.model.active_set_converged() {
                    return Err(SolverError::ActiveSetUnconverged {
                        step,
                        steps: self.model.active_set_steps(),
                    });
                }
                (outcome, outcome.iterations, ActiveSetStatus::Converged)
            }
        };

        self.model.finalize_step()?;
        let integrator = self.model.integrator();
        let report = StepReport {
            step,
            time: integrator.time(),
            dt: integrator.dt(),
            newton_iterations,
            active_set_steps: self.model.active_set_steps(),
            active_set_status: status,
            residual_norm: outcome.norms.residual,
            increment_norm: outcome.norms.increment,
            linear_static: outcome.linear_static,
        };
        info!(
            step,
            nstep = self.model.config().time.num_steps,
            time = report.time,
            dt = report.dt,
            numiter = report.newton_iterations,
            active_set_steps = report.active_set_steps,
            status = ?report.active_set_status,
            "step finished"
        );
        Ok(report)
    }

    /// Nested strategy: redo predictor and Newton until the set is a fixed point.
    fn fixed_point(&mut self, step: usize) -> Result<(NewtonOutcome, usize, ActiveSetStatus)> {
        let contact = self.model.config().contact;
        let mut total_iterations = 0;
        loop {
            let outcome = self.predict_and_newton(false)?;
            total_iterations += outcome.iterations;

            if self.model.update_active_set() {
                let status = if self.model.zig_zagged() {
                    ActiveSetStatus::ZigZag
                } else {
                    ActiveSetStatus::Converged
                };
                return Ok((outcome, total_iterations, status));
            }

            let steps = self.model.active_set_steps();
            if steps >= contact.max_active_set_iterations {
                match contact.on_active_set_failure {
                    ActiveSetFailurePolicy::Abort => {
                        return Err(SolverError::ActiveSetUnconverged { step, steps });
                    }
                    ActiveSetFailurePolicy::Accept => {
                        warn!(
                            step,
                            active_set_steps = steps,
                            "active set unconverged, accepting the last state"
                        );
                        return Ok((outcome, total_iterations, ActiveSetStatus::Unconverged));
                    }
                }
            }
        }
    }

    fn predict_and_newton(&mut self, semi_smooth: bool) -> Result<NewtonOutcome> {
        let predictor = self.model.config().predictor;
        let system = self.model.predictor(predictor, semi_smooth)?;
        if self.convergence.mode().is_relative() {
            self.reference = self.model.integrator().reference_norms();
        }
        debug!(
            predictor = predictor.as_str(),
            residual = system.residual_norm(),
            "predictor assembled"
        );
        self.newton(system, semi_smooth)
    }

    /// Newton loop on an assembled system.
    fn newton(&mut self, mut system: DynamicSystem, semi_smooth: bool) -> Result<NewtonOutcome> {
        let config = *self.model.config();
        let max_iterations = config.newton.max_iterations;
        let linear_static = config.is_linear_static();

        let mut norms = IterationNorms {
            residual: system.residual_norm(),
            increment: f64::INFINITY,
        };
        let mut iteration = 0;
        while !self.is_converged(iteration, norms, semi_smooth) && iteration < max_iterations {
            let solution = self.model.solve(&mut system, iteration, norms.residual)?;
            let increment = self.model.apply_increment(&solution)?;
            norms.increment = increment.norm();
            iteration += 1;

            if linear_static {
                self.model.refresh_contact_geometry()?;
                info!(
                    increment = norms.increment,
                    "computed 1 step with 1 iteration: STATIC LINEAR SOLUTION"
                );
                return Ok(NewtonOutcome {
                    iterations: iteration,
                    norms,
                    linear_static: true,
                });
            }

            self.model.evaluate_elements()?;
            system = self.model.assemble(semi_smooth)?;
            norms.residual = system.residual_norm();
            debug!(
                iteration,
                residual = norms.residual,
                increment = norms.increment,
                active_set_converged = self.model.active_set_converged(),
                "Newton iteration"
            );
        }

        if !self.convergence.converged(iteration, norms, self.reference) {
            return Err(SolverError::NewtonUnconverged {
                iterations: iteration,
                residual_norm: norms.residual,
                increment_norm: norms.increment,
            });
        }
        debug!(iterations = iteration, residual = norms.residual, "Newton converged");
        Ok(NewtonOutcome {
            iterations: iteration,
            norms,
            linear_static: false,
        })
    }

    fn is_converged(&self, iteration: usize, norms: IterationNorms, semi_smooth: bool) -> bool {
        self.convergence.converged(iteration, norms, self.reference)
            && (!semi_smooth || self.model.active_set_converged())
    }

    /// Append results of an accepted step according to the output cadences.
    pub fn write_output(&self, writer: &ResultWriter, report: &StepReport) -> Result<()> {
        let output = self.model.config().output;
        let mut record = StepRecord {
            step: report.step,
            time: report.time,
            dt: report.dt,
            newton_iterations: report.newton_iterations,
            active_set_steps: report.active_set_steps,
            active_set_converged: report.active_set_status.is_converged(),
            contact: self.model.contact_report(),
            ..StepRecord::default()
        };
        if report.step % output.results_every == 0 {
            record.fields = self.model.result_fields();
        }
        let wants_elements =
            output.stress != StressOutput::None || output.strain != StrainOutput::None;
        if wants_elements && report.step % output.stress_every == 0 {
            record.elements = self
                .model
                .integrator()
                .element_results()?
                .into_iter()
                .map(|result| ElementRecord {
                    element: result.element,
                    stress: result.stress,
                    strain: result.strain,
                })
                .collect();
        }
        writer.write_step(&record)?;

        if output.restart_every > 0 && report.step % output.restart_every == 0 {
            let path = writer.write_restart(&self.model.restart_state())?;
            debug!(step = report.step, path = %path.display(), "restart written");
        }
        Ok(())
    }
}
