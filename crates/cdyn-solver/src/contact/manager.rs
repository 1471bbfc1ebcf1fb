//! Contact constraint manager.
//!
//! Owns the mortar state of one interface, the Lagrange multipliers and the
//! active set. Multipliers are carried as extra unknowns of the augmented
//! system: slave node `j` contributes the unknowns `n + 2j` and `n + 2j + 1`
//! (Cartesian components) and the constraint rows with the same indices.
//!
//! ```text
//! R_u += -(1-αf) Bᵀ z - αf B_oldᵀ z_old         contact residual
//! ∂R_u/∂z = -(1-αf) Bᵀ                          coupling columns
//!
//! inactive:  z_j = 0
//! active:    n·B_j Δd = -g̃_j                    normal row
//!            t·z_j = 0                          frictionless
//!            -t·B_j Δd = -j̃_j                   stick
//!            t·z_j - s bound = 0                slip, s = sign(z_t + c_t j̃)
//! ```
//!
//! The weighted tangential jump `j̃ = -t·B (d - d_start)` measures the slip of
//! the master side relative to the slave node since the start of the step,
//! so that a sliding node's tangential multiplier points along it. The
//! linearization keeps `D`, `M`, normals and tangents fixed within an
//! iteration.

use nalgebra::{DVector, Vector2};
use tracing::{debug, info, warn};

use cdyn_io::{ContactNodeRecord, ContactNodeState, RestartState};

use super::active_set::{self, ActiveSet, ActiveSetHistory, ActiveSetUpdate};
use super::interface::{
    self, ContactInterfaceDefinition, MortarOperators, Projection, SlaveGeometry, UNPROJECTED_GAP,
};
use crate::config::{ContactConfig, ContactStrategy, FrictionLaw};
use crate::dynamic_system::DynamicSystem;
use crate::error::{Result, SolverError};
use crate::mesh::Node;

/// Restart vector of the converged multipliers.
pub const LAGRANGE_MULTIPLIER_OLD: &str = "lagrmultold";
/// Restart vector of the active flags (1.0 = active), one entry per slave node.
pub const ACTIVE_TOGGLE: &str = "activetoggle";
/// Restart vector of the slip flags, one entry per slave node.
pub const SLIP_TOGGLE: &str = "sliptoggle";

const INACTIVE_MULTIPLIER_TOLERANCE: f64 = 1.0e-12;
const NORMAL_COMPONENT_TOLERANCE: f64 = 1.0e-12;

/// Snapshot of the mortar operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// End of the last converged step
    Previous,
    /// Current Newton iterate
    Current,
}

impl Slot {
    const fn index(self) -> usize {
        match self {
            Slot::Previous => 0,
            Slot::Current => 1,
        }
    }
}

/// Nodal quantity to store with [`ContactConstraintManager::store_nodal_quantities`].
#[derive(Debug, Clone, Copy)]
pub enum NodalQuantity<'a> {
    /// Scatter the current multipliers to the nodes.
    LmCurrent,
    /// Accept the current multipliers as converged.
    LmOld,
    /// Scatter updated multipliers with consistency checks.
    LmUpdate,
    /// Weighted tangential jump since the start of the step.
    Jump,
    /// Dirichlet toggles of the structural DOFs.
    Dirichlet(&'a [bool]),
}

/// State of one slave node.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPair {
    node: usize,
    weight: f64,
    weighted_gap: f64,
    normal: Vector2<f64>,
    tangent: Vector2<f64>,
    multiplier: Vector2<f64>,
    multiplier_old: Vector2<f64>,
    jump: f64,
    active: bool,
    slip: bool,
    dirichlet: [bool; 2],
    projection: Option<Projection>,
}

impl ContactPair {
    fn new(node: usize) -> Self {
        Self {
            node,
            weight: 0.0,
            weighted_gap: UNPROJECTED_GAP,
            normal: Vector2::zeros(),
            tangent: Vector2::zeros(),
            multiplier: Vector2::zeros(),
            multiplier_old: Vector2::zeros(),
            jump: 0.0,
            active: false,
            slip: false,
            dirichlet: [false; 2],
            projection: None,
        }
    }

    fn clear_geometry(&mut self) {
        self.weight = 0.0;
        self.weighted_gap = UNPROJECTED_GAP;
        self.projection = None;
    }

    fn apply_geometry(&mut self, geometry: &SlaveGeometry) {
        self.weight = geometry.weight;
        self.weighted_gap = geometry.weighted_gap;
        self.normal = geometry.normal;
        self.tangent = geometry.tangent;
        self.projection = geometry.projection;
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Negative when penetrating.
    pub fn weighted_gap(&self) -> f64 {
        self.weighted_gap
    }

    pub fn normal(&self) -> Vector2<f64> {
        self.normal
    }

    pub fn tangent(&self) -> Vector2<f64> {
        self.tangent
    }

    pub fn multiplier(&self) -> Vector2<f64> {
        self.multiplier
    }

    pub fn normal_multiplier(&self) -> f64 {
        self.normal.dot(&self.multiplier)
    }

    pub fn tangential_multiplier(&self) -> f64 {
        self.tangent.dot(&self.multiplier)
    }

    pub fn jump(&self) -> f64 {
        self.jump
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_slip(&self) -> bool {
        self.slip
    }

    pub fn projection(&self) -> Option<Projection> {
        self.projection
    }
}

#[derive(Debug)]
pub struct ContactConstraintManager {
    definition: ContactInterfaceDefinition,
    reference: Vec<Vector2<f64>>,
    dofs_per_node: usize,
    num_dofs: usize,
    config: ContactConfig,
    alpha_f: f64,
    pairs: Vec<ContactPair>,
    operators: [MortarOperators; 2],
    displacement: DVector<f64>,
    step_start: DVector<f64>,
    dirichlet: Vec<bool>,
    multipliers: DVector<f64>,
    multipliers_old: DVector<f64>,
    active_set: ActiveSet,
    history: ActiveSetHistory,
    active_set_steps: usize,
    active_set_converged: bool,
    zig_zag: bool,
    contact_force: DVector<f64>,
}

impl ContactConstraintManager {
    /// Set up the interface at the initial displacement; both operator
    /// snapshots start from the initial geometry and all nodes are inactive.
    pub fn new(
        definition: ContactInterfaceDefinition,
        nodes: &[Node],
        dofs_per_node: usize,
        config: ContactConfig,
        alpha_f: f64,
        initial_displacement: &DVector<f64>,
    ) -> Result<Self> {
        if dofs_per_node < 2 {
            return Err(SolverError::config(format!(
                "contact needs at least two DOFs per node, got {dofs_per_node}"
            )));
        }
        let num_dofs = nodes.len() * dofs_per_node;
        if initial_displacement.len() != num_dofs {
            return Err(SolverError::config(format!(
                "displacement has {} entries, expected {num_dofs}",
                initial_displacement.len()
            )));
        }
        definition.validate(nodes.len())?;

        let num_slave = definition.num_slave_nodes();
        let mut manager = Self {
            pairs: definition.slave_nodes.iter().map(|&n| ContactPair::new(n)).collect(),
            reference: nodes.iter().map(Node::planar).collect(),
            definition,
            dofs_per_node,
            num_dofs,
            config,
            alpha_f,
            operators: [
                MortarOperators::zeros(num_slave, num_dofs),
                MortarOperators::zeros(num_slave, num_dofs),
            ],
            displacement: initial_displacement.clone(),
            step_start: initial_displacement.clone(),
            dirichlet: vec![false; num_dofs],
            multipliers: DVector::zeros(2 * num_slave),
            multipliers_old: DVector::zeros(2 * num_slave),
            active_set: ActiveSet::new(),
            history: ActiveSetHistory::default(),
            active_set_steps: 0,
            active_set_converged: false,
            zig_zag: false,
            contact_force: DVector::zeros(num_dofs),
        };
        manager.initialize_mortar();
        manager.evaluate_mortar()?;
        manager.store_dm(Slot::Previous);
        debug!(
            slave_nodes = num_slave,
            master_segments = manager.definition.master_segments.len(),
            "contact interface set up"
        );
        Ok(manager)
    }

    pub fn definition(&self) -> &ContactInterfaceDefinition {
        &self.definition
    }

    /// Structural DOFs the interface was set up for.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_slave_nodes(&self) -> usize {
        self.pairs.len()
    }

    /// Extra unknowns appended to the structural DOFs.
    pub fn num_multipliers(&self) -> usize {
        2 * self.pairs.len()
    }

    pub fn pairs(&self) -> &[ContactPair] {
        &self.pairs
    }

    pub fn active_set(&self) -> &ActiveSet {
        &self.active_set
    }

    /// Active-set updates since [`begin_step`](Self::begin_step).
    pub fn active_set_steps(&self) -> usize {
        self.active_set_steps
    }

    pub fn active_set_converged(&self) -> bool {
        self.active_set_converged
    }

    /// Whether the last fixed-point update was accepted because of zig-zagging.
    pub fn zig_zagged(&self) -> bool {
        self.zig_zag
    }

    pub fn lagrange_multipliers(&self) -> &DVector<f64> {
        &self.multipliers
    }

    pub fn lagrange_multipliers_old(&self) -> &DVector<f64> {
        &self.multipliers_old
    }

    /// Contact force of the last [`contact_forces`](Self::contact_forces) call.
    pub fn contact_force(&self) -> &DVector<f64> {
        &self.contact_force
    }

    pub fn operators(&self, slot: Slot) -> &MortarOperators {
        &self.operators[slot.index()]
    }

    /// Start the active-set search of a new time step.
    pub fn begin_step(&mut self) {
        self.history.clear();
        self.history.push(self.active_set.clone());
        self.active_set_steps = 0;
        self.active_set_converged = false;
        self.zig_zag = false;
    }

    /// Predictor reset: multipliers back to the converged values and the
    /// tangential jump measured from `displacement_n`.
    pub fn reset_to_step_start(
        &mut self,
        displacement_n: &DVector<f64>,
        dirichlet: &[bool],
    ) -> Result<()> {
        self.check_length(displacement_n.len())?;
        self.step_start = displacement_n.clone();
        self.multipliers = self.multipliers_old.clone();
        self.store_nodal_quantities(NodalQuantity::LmCurrent)?;
        self.store_nodal_quantities(NodalQuantity::Dirichlet(dirichlet))
    }

    /// Displacement at which the geometry is evaluated (end of step).
    pub fn set_state(&mut self, displacement: &DVector<f64>) -> Result<()> {
        self.check_length(displacement.len())?;
        self.displacement.copy_from(displacement);
        Ok(())
    }

    /// Drop the geometry of the previous iterate.
    pub fn initialize_mortar(&mut self) {
        for pair in &mut self.pairs {
            pair.clear_geometry();
        }
        self.operators[Slot::Current.index()] =
            MortarOperators::zeros(self.pairs.len(), self.num_dofs);
    }

    /// Projections, weights, weighted gaps, `D` and `M` at the current state.
    pub fn evaluate_mortar(&mut self) -> Result<()> {
        let (geometry, operators) = interface::evaluate_mortar(
            &self.definition,
            &self.reference,
            &self.displacement,
            self.dofs_per_node,
            self.config.projection_tolerance,
        )?;
        for (pair, slave) in self.pairs.iter_mut().zip(&geometry) {
            pair.apply_geometry(slave);
        }
        self.operators[Slot::Current.index()] = operators;
        self.store_nodal_quantities(NodalQuantity::Jump)
    }

    /// Clear per-iteration scratch.
    pub fn initialize(&mut self) {
        self.contact_force.fill(0.0);
    }

    /// Add contact residual, coupling columns and constraint rows.
    pub fn evaluate(&self, system: &mut DynamicSystem) -> Result<()> {
        let n = self.num_dofs;
        if system.num_dofs != n || system.num_multipliers != self.num_multipliers() {
            return Err(SolverError::config(format!(
                "system has {}+{} unknowns, contact expects {n}+{}",
                system.num_dofs,
                system.num_multipliers,
                self.num_multipliers()
            )));
        }

        let force = self.weighted_force();
        for (dof, value) in force.iter().enumerate() {
            system.residual[dof] -= value;
        }

        let current = self.operators(Slot::Current);
        let scale = 1.0 - self.alpha_f;
        for (row, dof, value) in current.coupling.triplet_iter() {
            system.matrix[(dof, n + row)] -= scale * value;
        }

        let law = self.config.friction;
        for (j, pair) in self.pairs.iter().enumerate() {
            let (normal_row, tangent_row) = (n + 2 * j, n + 2 * j + 1);
            if !pair.active {
                system.matrix[(normal_row, normal_row)] = 1.0;
                system.matrix[(tangent_row, tangent_row)] = 1.0;
                system.residual[normal_row] = pair.multiplier.x;
                system.residual[tangent_row] = pair.multiplier.y;
                continue;
            }

            for k in 0..2 {
                for (dof, value) in current.coupling_row(2 * j + k) {
                    system.matrix[(normal_row, dof)] += pair.normal[k] * value;
                }
            }
            system.residual[normal_row] = pair.weighted_gap;

            let z_n = pair.normal_multiplier();
            let z_t = pair.tangential_multiplier();
            let (row, residual) = match law {
                FrictionLaw::Frictionless => (pair.tangent, z_t),
                _ if !pair.slip => {
                    for k in 0..2 {
                        for (dof, value) in current.coupling_row(2 * j + k) {
                            system.matrix[(tangent_row, dof)] -= pair.tangent[k] * value;
                        }
                    }
                    system.residual[tangent_row] = pair.jump;
                    continue;
                }
                FrictionLaw::Tresca { bound } => {
                    let direction = (z_t + self.config.c_t * pair.jump).signum();
                    (pair.tangent, z_t - direction * bound)
                }
                FrictionLaw::Coulomb { coefficient } => {
                    let direction = (z_t + self.config.c_t * pair.jump).signum();
                    (
                        pair.tangent - pair.normal * (coefficient * direction),
                        z_t - coefficient * direction * z_n,
                    )
                }
            };
            system.matrix[(tangent_row, normal_row)] = row.x;
            system.matrix[(tangent_row, tangent_row)] = row.y;
            system.residual[tangent_row] = residual;
        }
        Ok(())
    }

    /// `(1-αf) Bᵀ z + αf B_oldᵀ z_old`
    fn weighted_force(&self) -> DVector<f64> {
        let current = self
            .operators(Slot::Current)
            .coupling_transpose_mul(&self.multipliers);
        let previous = self
            .operators(Slot::Previous)
            .coupling_transpose_mul(&self.multipliers_old);
        current * (1.0 - self.alpha_f) + previous * self.alpha_f
    }

    fn classify(&self) -> ActiveSet {
        let mut set = ActiveSet::new();
        for pair in &self.pairs {
            let z_n = pair.normal_multiplier();
            if active_set::is_active(pair.weighted_gap, z_n, self.config.c_n) {
                let slip = active_set::is_slip(
                    self.config.friction,
                    z_n,
                    pair.tangential_multiplier(),
                    pair.jump,
                    self.config.c_t,
                );
                set.insert(pair.node, slip);
            }
        }
        set
    }

    fn apply_active_set(&mut self, set: ActiveSet) {
        for pair in &mut self.pairs {
            pair.active = set.is_active(pair.node);
            pair.slip = set.is_slip(pair.node);
        }
        self.active_set = set;
    }

    /// Fixed-point update after a converged Newton loop.
    ///
    /// Returns whether the active set is converged. A set that repeats one
    /// of the earlier sets of this step counts as converged; the set the
    /// current solution was computed with is kept.
    pub fn update_active_set(&mut self) -> bool {
        let candidate = self.classify();
        let update = self.history.classify(&candidate);
        self.active_set_steps += 1;
        self.zig_zag = update == ActiveSetUpdate::ZigZag;

        let converged = match update {
            ActiveSetUpdate::Unchanged => true,
            ActiveSetUpdate::ZigZag => {
                warn!(
                    active_set_step = self.active_set_steps,
                    "active set is zig-zagging, accepting the current set"
                );
                true
            }
            ActiveSetUpdate::Changed => {
                self.history.push(candidate.clone());
                self.apply_active_set(candidate);
                false
            }
        };
        info!(
            active_set_step = self.active_set_steps,
            active = self.active_set.num_active(),
            slip = self.active_set.num_slip(),
            changed = !converged,
            "active set update"
        );
        self.active_set_converged = converged;
        converged
    }

    /// Active-set update inside a semi-smooth Newton iteration.
    ///
    /// Returns the number of nodes whose classification changed.
    pub fn update_active_set_semi_smooth(&mut self) -> usize {
        let candidate = self.classify();
        let changes = candidate.num_changes(&self.active_set);
        self.active_set_steps += 1;
        if changes > 0 {
            self.apply_active_set(candidate);
        }
        self.active_set_converged = changes == 0;
        info!(
            active = self.active_set.num_active(),
            slip = self.active_set.num_slip(),
            changes,
            "semi-smooth active set update"
        );
        changes
    }

    /// Add the multiplier increment from the augmented solution `[Δd | Δz]`.
    pub fn recover(&mut self, solution: &DVector<f64>) -> Result<()> {
        let n = self.num_dofs;
        let m = self.num_multipliers();
        if solution.len() != n + m {
            return Err(SolverError::config(format!(
                "solution has {} entries, expected {}",
                solution.len(),
                n + m
            )));
        }
        self.multipliers += solution.rows(n, m);
        self.store_nodal_quantities(NodalQuantity::LmUpdate)
    }

    /// Contact force `(1-αf) Bᵀ z + αf B_oldᵀ z_old` on all structural DOFs.
    ///
    /// `residual_without_contact` is the structural residual with Dirichlet
    /// entries blanked; at equilibrium it balances the contact force on the
    /// free DOFs.
    pub fn contact_forces(&mut self, residual_without_contact: &DVector<f64>) -> &DVector<f64> {
        self.contact_force = self.weighted_force();
        let imbalance = residual_without_contact
            .iter()
            .zip(self.contact_force.iter())
            .zip(&self.dirichlet)
            .filter(|(_, fixed)| !**fixed)
            .map(|((r, f), _)| (r - f) * (r - f))
            .sum::<f64>()
            .sqrt();
        debug!(
            contact_force = self.contact_force.norm(),
            residual = residual_without_contact.norm(),
            imbalance,
            "contact force balance"
        );
        &self.contact_force
    }

    pub fn store_nodal_quantities(&mut self, kind: NodalQuantity<'_>) -> Result<()> {
        match kind {
            NodalQuantity::LmCurrent => {
                for (j, pair) in self.pairs.iter_mut().enumerate() {
                    pair.multiplier =
                        Vector2::new(self.multipliers[2 * j], self.multipliers[2 * j + 1]);
                }
            }
            NodalQuantity::LmOld => {
                self.multipliers_old.copy_from(&self.multipliers);
                for pair in &mut self.pairs {
                    pair.multiplier_old = pair.multiplier;
                }
            }
            NodalQuantity::LmUpdate => {
                let semi_smooth = self.config.strategy == ContactStrategy::SemiSmooth;
                for (j, pair) in self.pairs.iter_mut().enumerate() {
                    let z = Vector2::new(self.multipliers[2 * j], self.multipliers[2 * j + 1]);
                    if !pair.active {
                        if semi_smooth && z.norm() > INACTIVE_MULTIPLIER_TOLERANCE {
                            warn!(
                                node = pair.node,
                                multiplier = z.norm(),
                                "nonzero multiplier at inactive contact node"
                            );
                        }
                        self.multipliers[2 * j] = 0.0;
                        self.multipliers[2 * j + 1] = 0.0;
                        pair.multiplier = Vector2::zeros();
                        continue;
                    }
                    let blocked = (0..2).any(|k| {
                        pair.dirichlet[k] && pair.normal[k].abs() > NORMAL_COMPONENT_TOLERANCE
                    });
                    if blocked {
                        return Err(SolverError::config(format!(
                            "active contact node {} has a Dirichlet condition in contact normal direction",
                            pair.node
                        )));
                    }
                    pair.multiplier = z;
                }
            }
            NodalQuantity::Jump => {
                let increment = &self.displacement - &self.step_start;
                let weighted = self.operators[Slot::Current.index()].weighted(&increment);
                for (pair, relative) in self.pairs.iter_mut().zip(&weighted) {
                    pair.jump = -pair.tangent.dot(relative);
                }
            }
            NodalQuantity::Dirichlet(toggle) => {
                self.check_length(toggle.len())?;
                self.dirichlet.copy_from_slice(toggle);
                let dofs_per_node = self.dofs_per_node;
                for pair in &mut self.pairs {
                    let base = pair.node * dofs_per_node;
                    pair.dirichlet = [toggle[base], toggle[base + 1]];
                }
            }
        }
        Ok(())
    }

    /// Copy operators between snapshots: `Previous` receives the current
    /// operators, `Current` is reset to the previous ones.
    pub fn store_dm(&mut self, slot: Slot) {
        let [previous, current] = &mut self.operators;
        match slot {
            Slot::Previous => *previous = current.clone(),
            Slot::Current => *current = previous.clone(),
        }
    }

    /// Accept the converged step.
    pub fn end_step(&mut self) -> Result<()> {
        self.store_nodal_quantities(NodalQuantity::LmOld)?;
        self.store_dm(Slot::Previous);
        Ok(())
    }

    /// Active-set report of the current state.
    pub fn report(&self) -> Vec<ContactNodeRecord> {
        let frictional = self.config.friction.is_frictional();
        self.pairs
            .iter()
            .map(|pair| ContactNodeRecord {
                node: pair.node,
                state: match (pair.active, frictional, pair.slip) {
                    (false, _, _) => ContactNodeState::Inactive,
                    (true, false, _) => ContactNodeState::Active,
                    (true, true, true) => ContactNodeState::Slip,
                    (true, true, false) => ContactNodeState::Stick,
                },
                weighted_gap: pair.weighted_gap,
                normal_multiplier: pair.normal_multiplier(),
                tangential_multiplier: pair.tangential_multiplier(),
            })
            .collect()
    }

    pub fn write_restart(&self, restart: &mut RestartState) {
        let toggle = |flag: fn(&ContactPair) -> bool| {
            self.pairs
                .iter()
                .map(|pair| if flag(pair) { 1.0 } else { 0.0 })
                .collect::<Vec<_>>()
        };
        restart.insert_vector(
            LAGRANGE_MULTIPLIER_OLD,
            self.multipliers_old.as_slice().to_vec(),
        );
        restart.insert_vector(ACTIVE_TOGGLE, toggle(ContactPair::is_active));
        restart.insert_vector(SLIP_TOGGLE, toggle(ContactPair::is_slip));
    }

    /// Restore multipliers and active set, then rebuild `D`/`M` at the
    /// restored displacement into both snapshots.
    pub fn read_restart(
        &mut self,
        restart: &RestartState,
        displacement_n: &DVector<f64>,
    ) -> Result<()> {
        let num_slave = self.pairs.len();
        let multipliers = restart.vector_with_len(LAGRANGE_MULTIPLIER_OLD, 2 * num_slave)?;
        let active = restart.toggle(ACTIVE_TOGGLE, num_slave)?;
        let slip = restart.toggle(SLIP_TOGGLE, num_slave)?;

        self.multipliers_old = DVector::from_column_slice(multipliers);
        self.multipliers = self.multipliers_old.clone();
        let mut set = ActiveSet::new();
        for (pair, (&a, &s)) in self.pairs.iter().zip(active.iter().zip(slip.iter())) {
            if a {
                set.insert(pair.node, s);
            }
        }
        self.apply_active_set(set);

        self.set_state(displacement_n)?;
        self.step_start = displacement_n.clone();
        self.initialize_mortar();
        self.evaluate_mortar()?;
        self.store_dm(Slot::Previous);
        self.store_nodal_quantities(NodalQuantity::LmCurrent)?;
        self.store_nodal_quantities(NodalQuantity::LmOld)?;
        debug!(
            active = self.active_set.num_active(),
            "contact state restored"
        );
        Ok(())
    }

    fn check_length(&self, len: usize) -> Result<()> {
        if len != self.num_dofs {
            return Err(SolverError::config(format!(
                "contact state has {len} entries, expected {}",
                self.num_dofs
            )));
        }
        Ok(())
    }
}
