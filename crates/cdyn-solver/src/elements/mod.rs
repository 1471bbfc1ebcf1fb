//! Element evaluators.
//!
//! Only the truss network is provided; anything implementing
//! [`ElementEvaluator`](crate::ElementEvaluator) can drive the integrator.

pub mod truss;

pub use truss::{Kinematics, Truss, TrussNetwork};
