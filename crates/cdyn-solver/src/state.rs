//! Kinematic and force state of the generalized-alpha scheme.

use nalgebra::DVector;

use crate::config::GenAlphaParams;

/// State vectors over all structural DOFs.
///
/// `_n` quantities are the converged state at `t_n` and change only when a
/// step is finalized. `_np1` and `_mid` quantities are scratch for the step
/// in progress; the mid states are always recomputed as
/// `X_mid = (1 - alpha) X_np1 + alpha X_n`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIntegrationState {
    pub(crate) displacement_n: DVector<f64>,
    pub(crate) velocity_n: DVector<f64>,
    pub(crate) acceleration_n: DVector<f64>,
    pub(crate) displacement_np1: DVector<f64>,
    pub(crate) velocity_np1: DVector<f64>,
    pub(crate) acceleration_np1: DVector<f64>,
    pub(crate) displacement_mid: DVector<f64>,
    pub(crate) velocity_mid: DVector<f64>,
    pub(crate) acceleration_mid: DVector<f64>,
    pub(crate) external_force_n: DVector<f64>,
    pub(crate) external_force_np1: DVector<f64>,
    pub(crate) external_force_mid: DVector<f64>,
    /// Internal force at the evaluation point of the last element call
    pub(crate) internal_force: DVector<f64>,
    /// Converged internal force at `t_n` (end-point evaluation only)
    pub(crate) internal_force_n: DVector<f64>,
    /// Displacement change handed to the element layer
    pub(crate) residual_displacement: DVector<f64>,
}

/// `(1 - alpha) end + alpha start`
pub fn mid_point(end: &DVector<f64>, start: &DVector<f64>, alpha: f64) -> DVector<f64> {
    end * (1.0 - alpha) + start * alpha
}

impl TimeIntegrationState {
    pub fn zeros(num_dofs: usize) -> Self {
        let zero = DVector::zeros(num_dofs);
        Self {
            displacement_n: zero.clone(),
            velocity_n: zero.clone(),
            acceleration_n: zero.clone(),
            displacement_np1: zero.clone(),
            velocity_np1: zero.clone(),
            acceleration_np1: zero.clone(),
            displacement_mid: zero.clone(),
            velocity_mid: zero.clone(),
            acceleration_mid: zero.clone(),
            external_force_n: zero.clone(),
            external_force_np1: zero.clone(),
            external_force_mid: zero.clone(),
            internal_force: zero.clone(),
            internal_force_n: zero.clone(),
            residual_displacement: zero,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.displacement_n.len()
    }

    /// Recompute all mid states from the end states.
    pub(crate) fn update_mid(&mut self, params: &GenAlphaParams) {
        self.displacement_mid =
            mid_point(&self.displacement_np1, &self.displacement_n, params.alpha_f);
        self.velocity_mid = mid_point(&self.velocity_np1, &self.velocity_n, params.alpha_f);
        self.acceleration_mid =
            mid_point(&self.acceleration_np1, &self.acceleration_n, params.alpha_m);
        self.external_force_mid =
            mid_point(&self.external_force_np1, &self.external_force_n, params.alpha_f);
    }

    /// Zero velocities and accelerations (quasi-static analysis).
    pub(crate) fn zero_rates(&mut self) {
        for v in [
            &mut self.velocity_n,
            &mut self.acceleration_n,
            &mut self.velocity_np1,
            &mut self.acceleration_np1,
            &mut self.velocity_mid,
            &mut self.acceleration_mid,
        ] {
            v.fill(0.0);
        }
    }

    pub fn displacement_n(&self) -> &DVector<f64> {
        &self.displacement_n
    }

    pub fn velocity_n(&self) -> &DVector<f64> {
        &self.velocity_n
    }

    pub fn acceleration_n(&self) -> &DVector<f64> {
        &self.acceleration_n
    }

    pub fn displacement_np1(&self) -> &DVector<f64> {
        &self.displacement_np1
    }

    pub fn velocity_np1(&self) -> &DVector<f64> {
        &self.velocity_np1
    }

    pub fn acceleration_np1(&self) -> &DVector<f64> {
        &self.acceleration_np1
    }

    pub fn displacement_mid(&self) -> &DVector<f64> {
        &self.displacement_mid
    }

    pub fn velocity_mid(&self) -> &DVector<f64> {
        &self.velocity_mid
    }

    pub fn acceleration_mid(&self) -> &DVector<f64> {
        &self.acceleration_mid
    }

    pub fn external_force_n(&self) -> &DVector<f64> {
        &self.external_force_n
    }

    pub fn external_force_np1(&self) -> &DVector<f64> {
        &self.external_force_np1
    }

    pub fn external_force_mid(&self) -> &DVector<f64> {
        &self.external_force_mid
    }

    pub fn internal_force(&self) -> &DVector<f64> {
        &self.internal_force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_states_are_affine_combinations() {
        let params = GenAlphaParams::default();
        let mut state = TimeIntegrationState::zeros(2);
        state.displacement_n = DVector::from_vec(vec![1.0, 2.0]);
        state.displacement_np1 = DVector::from_vec(vec![3.0, -1.0]);
        state.acceleration_np1 = DVector::from_vec(vec![10.0, 0.0]);
        state.update_mid(&params);

        let expected = &state.displacement_np1 * (1.0 - params.alpha_f)
            + &state.displacement_n * params.alpha_f;
        assert_eq!(state.displacement_mid, expected);
        assert_eq!(state.acceleration_mid[0], 10.0 * (1.0 - params.alpha_m));
    }

    #[test]
    fn zero_rates_clears_all_velocity_and_acceleration_states() {
        let mut state = TimeIntegrationState::zeros(1);
        state.velocity_n[0] = 1.0;
        state.acceleration_mid[0] = 2.0;
        state.displacement_np1[0] = 3.0;
        state.zero_rates();
        assert_eq!(state.velocity_n[0], 0.0);
        assert_eq!(state.acceleration_mid[0], 0.0);
        assert_eq!(state.displacement_np1[0], 3.0);
    }
}
