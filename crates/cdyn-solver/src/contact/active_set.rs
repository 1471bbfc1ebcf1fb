//! Primal-dual active-set classification.
//!
//! A slave node is active when its complementarity function says so:
//!
//! ```text
//! active  ⇔  z_n - c_n g̃ ≥ 0
//! slip    ⇔  |z_t + c_t j̃| - bound > 0      (active nodes, frictional only)
//! ```
//!
//! For an inactive node `z_n = 0`, so a weighted gap of exactly zero is
//! classified active. The slip bound is `μ z_n` (Coulomb) or a constant
//! (Tresca).

use std::collections::BTreeSet;

use crate::config::FrictionLaw;

/// Normal part of the complementarity check.
pub fn is_active(weighted_gap: f64, normal_multiplier: f64, c_n: f64) -> bool {
    normal_multiplier - c_n * weighted_gap >= 0.0
}

/// Tangential traction the friction law allows before slip.
pub fn slip_bound(law: FrictionLaw, normal_multiplier: f64) -> f64 {
    match law {
        FrictionLaw::Frictionless => 0.0,
        FrictionLaw::Tresca { bound } => bound,
        FrictionLaw::Coulomb { coefficient } => coefficient * normal_multiplier.max(0.0),
    }
}

/// Tangential part of the complementarity check; `false` when frictionless.
pub fn is_slip(
    law: FrictionLaw,
    normal_multiplier: f64,
    tangential_multiplier: f64,
    jump: f64,
    c_t: f64,
) -> bool {
    law.is_frictional()
        && (tangential_multiplier + c_t * jump).abs() - slip_bound(law, normal_multiplier) > 0.0
}

/// Active slave nodes and their slip subset, by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    active: BTreeSet<usize>,
    slip: BTreeSet<usize>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `node` active; `slip` adds it to the slip subset.
    pub fn insert(&mut self, node: usize, slip: bool) {
        self.active.insert(node);
        if slip {
            self.slip.insert(node);
        }
    }

    pub fn is_active(&self, node: usize) -> bool {
        self.active.contains(&node)
    }

    pub fn is_slip(&self, node: usize) -> bool {
        self.slip.contains(&node)
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn num_slip(&self) -> usize {
        self.slip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().copied()
    }

    /// Nodes whose classification differs between the two sets.
    pub fn num_changes(&self, other: &ActiveSet) -> usize {
        self.active.symmetric_difference(&other.active).count()
            + self.slip.symmetric_difference(&other.slip).count()
    }
}

/// Outcome of one fixed-point active-set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSetUpdate {
    Unchanged,
    Changed,
    /// The new set repeats one visited two or three updates ago.
    ZigZag,
}

/// Sets visited during the active-set iterations of one time step.
#[derive(Debug, Clone, Default)]
pub struct ActiveSetHistory {
    sets: Vec<ActiveSet>,
}

impl ActiveSetHistory {
    pub fn clear(&mut self) {
        self.sets.clear();
    }

    pub fn push(&mut self, set: ActiveSet) {
        self.sets.push(set);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Compare `candidate` against the most recent set and the two before it.
    pub fn classify(&self, candidate: &ActiveSet) -> ActiveSetUpdate {
        let mut earlier = self.sets.iter().rev();
        if earlier.next().is_some_and(|last| last == candidate) {
            return ActiveSetUpdate::Unchanged;
        }
        if earlier.take(2).any(|set| set == candidate) {
            return ActiveSetUpdate::ZigZag;
        }
        ActiveSetUpdate::Changed
    }
}
