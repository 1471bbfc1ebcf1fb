//! Newton convergence policy.

use crate::config::{ConvCheck, NewtonConfig};

/// Norms of one Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IterationNorms {
    /// Norm of the full residual (structural and constraint rows)
    pub residual: f64,
    /// Norm of the last displacement increment
    pub increment: f64,
}

/// Scales for the relative modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceNorms {
    /// `|d_n|`
    pub displacement: f64,
    /// `max(|F_int|, |f_ext|, |M a|)`
    pub force: f64,
}

impl Default for ReferenceNorms {
    fn default() -> Self {
        Self {
            displacement: 1.0,
            force: 1.0,
        }
    }
}

/// Combines residual and increment tests according to a [`ConvCheck`] mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCheck {
    mode: ConvCheck,
    tol_residual: f64,
    tol_displacement: f64,
}

impl ConvergenceCheck {
    pub fn new(config: &NewtonConfig) -> Self {
        Self {
            mode: config.conv_check,
            tol_residual: config.tol_residual,
            tol_displacement: config.tol_displacement,
        }
    }

    pub fn mode(&self) -> ConvCheck {
        self.mode
    }

    /// Whether iteration `iteration` has converged.
    ///
    /// The predictor state (iteration 0) is never accepted, even with a
    /// zero residual.
    pub fn converged(
        &self,
        iteration: usize,
        norms: IterationNorms,
        reference: ReferenceNorms,
    ) -> bool {
        if iteration == 0 {
            return false;
        }
        let abs_res = norms.residual < self.tol_residual;
        let abs_dis = norms.increment < self.tol_displacement;
        let rel_res = scaled(norms.residual, reference.force) < self.tol_residual;
        let rel_dis = scaled(norms.increment, reference.displacement) < self.tol_displacement;

        match self.mode {
            ConvCheck::AbsResAndAbsDis => abs_res && abs_dis,
            ConvCheck::AbsResOrAbsDis => abs_res || abs_dis,
            ConvCheck::RelResAndAbsDis => rel_res && abs_dis,
            ConvCheck::RelResOrAbsDis => rel_res || abs_dis,
            ConvCheck::RelResAndRelDis => rel_res && rel_dis,
            ConvCheck::RelResOrRelDis => rel_res || rel_dis,
        }
    }
}

fn scaled(norm: f64, reference: f64) -> f64 {
    if reference > f64::EPSILON {
        norm / reference
    } else {
        norm
    }
}
