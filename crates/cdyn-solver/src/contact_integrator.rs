//! Generalized-alpha integrator composed with the contact manager.
//!
//! [`ContactAwareIntegrator`] holds a [`GenAlphaIntegrator`] and, for
//! problems with a contact interface, a [`ContactConstraintManager`]. It
//! owns the assembly order of one Newton iteration; the iteration policy
//! lives in [`ActiveSetNewtonSolver`](crate::solver::ActiveSetNewtonSolver).

use nalgebra::DVector;

use cdyn_io::{ContactNodeRecord, NamedField, RestartState};

use crate::config::{PredictorKind, SolverConfig};
use crate::contact::ContactConstraintManager;
use crate::contact::manager::LAGRANGE_MULTIPLIER_OLD;
use crate::dynamic_system::DynamicSystem;
use crate::error::{Result, SolverError};
use crate::genalpha::GenAlphaIntegrator;

#[derive(Debug)]
pub struct ContactAwareIntegrator {
    integrator: GenAlphaIntegrator,
    contact: Option<ContactConstraintManager>,
}

impl ContactAwareIntegrator {
    pub fn new(
        integrator: GenAlphaIntegrator,
        contact: Option<ContactConstraintManager>,
    ) -> Result<Self> {
        if let Some(manager) = &contact
            && manager.num_dofs() != integrator.num_dofs()
        {
            return Err(SolverError::config(format!(
                "contact interface covers {} DOFs, structure has {}",
                manager.num_dofs(),
                integrator.num_dofs()
            )));
        }
        Ok(Self {
            integrator,
            contact,
        })
    }

    pub fn integrator(&self) -> &GenAlphaIntegrator {
        &self.integrator
    }

    pub fn integrator_mut(&mut self) -> &mut GenAlphaIntegrator {
        &mut self.integrator
    }

    pub fn contact(&self) -> Option<&ContactConstraintManager> {
        self.contact.as_ref()
    }

    pub fn config(&self) -> &SolverConfig {
        self.integrator.config()
    }

    pub fn num_multipliers(&self) -> usize {
        self.contact
            .as_ref()
            .map_or(0, ContactConstraintManager::num_multipliers)
    }

    /// Start a new time step of the active-set search.
    pub fn begin_step(&mut self) {
        if let Some(contact) = &mut self.contact {
            contact.begin_step();
        }
    }

    /// Predictor with full assembly at the predicted state.
    ///
    /// Multipliers are reset to their converged values. With `semi_smooth`
    /// the active set is classified at the predicted state, otherwise it is
    /// left as it is.
    pub fn predictor(&mut self, mode: PredictorKind, semi_smooth: bool) -> Result<DynamicSystem> {
        self.integrator.predict(mode)?;
        self.integrator.evaluate_elements()?;
        if let Some(contact) = &mut self.contact {
            contact.reset_to_step_start(
                self.integrator.state().displacement_n(),
                self.integrator.dirichlet_toggle(),
            )?;
        }
        self.assemble(semi_smooth)
    }

    /// Build the augmented system at the current iterate.
    ///
    /// Element forces must be up to date. With `semi_smooth`, the active set
    /// is updated between mortar evaluation and contact assembly.
    pub fn assemble(&mut self, semi_smooth: bool) -> Result<DynamicSystem> {
        let mut system = self.integrator.build_system(self.num_multipliers());
        let residual_without_contact = system.structural_residual();

        if let Some(contact) = &mut self.contact {
            contact.set_state(self.integrator.state().displacement_np1())?;
            contact.initialize_mortar();
            contact.evaluate_mortar()?;
            if semi_smooth {
                contact.update_active_set_semi_smooth();
            }
            contact.initialize();
            contact.evaluate(&mut system)?;
        }

        system.blank_dirichlet_residual(self.integrator.dirichlet_toggle());
        if let Some(contact) = &mut self.contact {
            contact.contact_forces(&residual_without_contact);
        }
        Ok(system)
    }

    /// Blank Dirichlet DOFs and solve the augmented system.
    pub fn solve(
        &mut self,
        system: &mut DynamicSystem,
        iteration: usize,
        residual_norm: f64,
    ) -> Result<DVector<f64>> {
        self.integrator.solve(system, iteration, residual_norm)
    }

    /// Recover multipliers, then update the structural iterate.
    ///
    /// Returns the displacement increment.
    pub fn apply_increment(&mut self, solution: &DVector<f64>) -> Result<DVector<f64>> {
        let n = self.integrator.num_dofs();
        if let Some(contact) = &mut self.contact {
            contact.recover(solution)?;
        }
        let increment = solution.rows(0, n).into_owned();
        self.integrator.update_iterate(&increment)?;
        Ok(increment)
    }

    /// Evaluate elements after an increment.
    pub fn evaluate_elements(&mut self) -> Result<()> {
        self.integrator.evaluate_elements()
    }

    /// Re-evaluate the contact geometry at the current iterate without
    /// touching element forces.
    pub fn refresh_contact_geometry(&mut self) -> Result<()> {
        if let Some(contact) = &mut self.contact {
            contact.set_state(self.integrator.state().displacement_np1())?;
            contact.initialize_mortar();
            contact.evaluate_mortar()?;
        }
        Ok(())
    }

    /// Fixed-point active-set update; `true` without contact.
    pub fn update_active_set(&mut self) -> bool {
        self.contact
            .as_mut()
            .is_none_or(ContactConstraintManager::update_active_set)
    }

    pub fn active_set_converged(&self) -> bool {
        self.contact
            .as_ref()
            .is_none_or(ContactConstraintManager::active_set_converged)
    }

    pub fn active_set_steps(&self) -> usize {
        self.contact
            .as_ref()
            .map_or(0, ContactConstraintManager::active_set_steps)
    }

    pub fn zig_zagged(&self) -> bool {
        self.contact
            .as_ref()
            .is_some_and(ContactConstraintManager::zig_zagged)
    }

    /// Accept the converged step.
    pub fn finalize_step(&mut self) -> Result<()> {
        self.integrator.finalize()?;
        if let Some(contact) = &mut self.contact {
            contact.end_step()?;
        }
        Ok(())
    }

    /// Nodal result fields, including the contact force with contact.
    pub fn result_fields(&self) -> Vec<NamedField> {
        let mut fields = self.integrator.result_fields();
        if let Some(contact) = &self.contact {
            fields.push(NamedField::new(
                "fcontact",
                contact.contact_force().as_slice().to_vec(),
            ));
        }
        fields
    }

    pub fn contact_report(&self) -> Vec<ContactNodeRecord> {
        self.contact
            .as_ref()
            .map(ContactConstraintManager::report)
            .unwrap_or_default()
    }

    /// Restart state of the last converged step.
    pub fn restart_state(&self) -> RestartState {
        let mut restart = RestartState::new(self.integrator.step(), self.integrator.time());
        self.integrator.write_restart(&mut restart);
        if let Some(contact) = &self.contact {
            contact.write_restart(&mut restart);
        }
        restart
    }

    /// Restore integrator and contact state; mortar operators are rebuilt
    /// from the restored displacement.
    pub fn read_restart(&mut self, restart: &RestartState) -> Result<()> {
        let has_contact_data = restart.vectors.contains_key(LAGRANGE_MULTIPLIER_OLD);
        if has_contact_data != self.contact.is_some() {
            return Err(SolverError::Restart(if has_contact_data {
                "restart holds contact data but the model has no contact interface".into()
            } else {
                "model has a contact interface but the restart holds no contact data".into()
            }));
        }
        self.integrator.read_restart(restart)?;
        if let Some(contact) = &mut self.contact {
            contact.read_restart(restart, self.integrator.state().displacement_n())?;
        }
        Ok(())
    }
}
