//! End-to-end contact runs on the stacked-blocks model.
//!
//! With the top pushed down by 0.2 over five steps the initial gap of 0.1
//! closes during step 3. Once closed, both spring columns act in series:
//!
//! ```text
//! F = -5 - 50 u_top,   u_master = -F / 100,   u_slave = u_master - 0.1
//! z_n = F / D,         D = 0.5 (tributary length)
//! ```

mod common;

use approx::assert_relative_eq;
use cdyn_io::ContactNodeState;
use cdyn_solver::{
    ActiveSetFailurePolicy, ActiveSetNewtonSolver, ActiveSetStatus, ContactConstraintManager,
    ContactStrategy, DynamicType, FrictionLaw, SolverConfig, SolverError, StepReport,
};
use common::{MASTER_TOP_NODES, SLAVE_NODES, dof, sliding_blocks, stacked_blocks};

fn blocks_config(strategy: ContactStrategy) -> SolverConfig {
    SolverConfig::quasi_static()
        .with_time(0.2, 1.0, 5)
        .with_strategy(strategy)
}

fn run(solver: &mut ActiveSetNewtonSolver) -> Vec<StepReport> {
    solver.integrate(None).expect("integration succeeds")
}

fn contact(solver: &ActiveSetNewtonSolver) -> &ContactConstraintManager {
    solver.model().contact().expect("contact interface")
}

fn displacement(solver: &ActiveSetNewtonSolver, node: usize, k: usize) -> f64 {
    solver.model().integrator().state().displacement_n()[dof(node, k)]
}

fn assert_closed_blocks(solver: &ActiveSetNewtonSolver) {
    for (slave, master) in SLAVE_NODES.iter().zip(MASTER_TOP_NODES) {
        assert_relative_eq!(displacement(solver, *slave, 1), -0.15, epsilon = 1e-9);
        assert_relative_eq!(displacement(solver, master, 1), -0.05, epsilon = 1e-9);
    }

    let contact = contact(solver);
    assert_eq!(contact.active_set().num_active(), 2);
    for pair in contact.pairs() {
        assert!(pair.is_active());
        assert_relative_eq!(pair.weight(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(pair.normal_multiplier(), 10.0, epsilon = 1e-7);
        assert_relative_eq!(pair.tangential_multiplier(), 0.0, epsilon = 1e-9);
        assert!(pair.weighted_gap().abs() < 1e-9);
    }

    // D z on the slave side, -M z on the master side
    let force = contact.contact_force();
    for (slave, master) in SLAVE_NODES.iter().zip(MASTER_TOP_NODES) {
        assert_relative_eq!(force[dof(*slave, 1)], 5.0, epsilon = 1e-7);
        assert_relative_eq!(force[dof(master, 1)], -5.0, epsilon = 1e-7);
    }
}

#[test]
fn fixed_point_closes_the_gap_in_step_three() {
    let problem = stacked_blocks(0.1, -0.2, 1.0, blocks_config(ContactStrategy::FixedPoint));
    let mut solver = problem.build().expect("setup");
    let reports = run(&mut solver);

    assert_eq!(reports.len(), 5);
    for report in &reports {
        assert_eq!(report.active_set_status, ActiveSetStatus::Converged);
        assert!(!report.linear_static);
    }
    // open steps: one Newton solve, one confirming active-set update
    for report in &reports[..2] {
        assert_eq!(report.newton_iterations, 1);
        assert_eq!(report.active_set_steps, 1);
    }
    // contact step: inactive solve, activation, active solve
    assert_eq!(reports[2].newton_iterations, 2);
    assert_eq!(reports[2].active_set_steps, 2);
    assert_eq!(reports[3].active_set_steps, 1);
    assert_relative_eq!(reports[4].time, 1.0, epsilon = 1e-9);

    assert_closed_blocks(&solver);
}

#[test]
fn semi_smooth_matches_fixed_point() {
    let problem = stacked_blocks(0.1, -0.2, 1.0, blocks_config(ContactStrategy::SemiSmooth));
    let mut solver = problem.build().expect("setup");
    let reports = run(&mut solver);

    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.active_set_status.is_converged()));
    // open steps: classification at the predictor and after the one solve
    assert_eq!(reports[0].newton_iterations, 1);
    assert_eq!(reports[0].active_set_steps, 2);
    // activation happens inside the Newton loop of step 3
    assert_eq!(reports[2].newton_iterations, 2);
    assert_eq!(reports[2].active_set_steps, 3);
    // the closed set is confirmed at the predictor
    assert_eq!(reports[3].newton_iterations, 1);

    assert_closed_blocks(&solver);
}

/// Final displacements and normal multipliers of a generalized-alpha run.
fn dynamic_blocks(strategy: ContactStrategy) -> (Vec<f64>, Vec<f64>) {
    let config = SolverConfig::default()
        .with_time(0.2, 1.0, 5)
        .with_strategy(strategy);
    assert_eq!(config.dynamic_type, DynamicType::GenAlpha);
    let problem = stacked_blocks(0.1, -0.2, 1.0, config);
    let mut solver = problem.build().expect("setup");
    assert!(solver.model().integrator().params().alpha_f > 0.0);
    let reports = run(&mut solver);

    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.active_set_status.is_converged()));

    let contact = contact(&solver);
    assert_eq!(contact.active_set().num_active(), 2);
    for pair in contact.pairs() {
        assert!(pair.weighted_gap().abs() < 1e-9);
        assert!(pair.normal_multiplier() > -1e-9);
    }
    // each slave pushes its master down with the same force
    let force = contact.contact_force();
    for (slave, master) in SLAVE_NODES.iter().zip(MASTER_TOP_NODES) {
        assert!(force[dof(*slave, 1)] >= -1e-9);
        assert_relative_eq!(force[dof(*slave, 1)], -force[dof(master, 1)], epsilon = 1e-9);
    }
    assert_relative_eq!(force.iter().sum::<f64>(), 0.0, epsilon = 1e-9);

    let displacement = solver.model().integrator().state().displacement_n();
    let multipliers = contact.pairs().iter().map(|p| p.normal_multiplier()).collect();
    (displacement.iter().copied().collect(), multipliers)
}

#[test]
fn generalized_alpha_contact_agrees_between_strategies() {
    let (fixed_point, z_fixed_point) = dynamic_blocks(ContactStrategy::FixedPoint);
    let (semi_smooth, z_semi_smooth) = dynamic_blocks(ContactStrategy::SemiSmooth);
    for (a, b) in fixed_point.iter().zip(&semi_smooth) {
        assert_relative_eq!(*a, *b, epsilon = 1e-8);
    }
    for (a, b) in z_fixed_point.iter().zip(&z_semi_smooth) {
        assert_relative_eq!(*a, *b, epsilon = 1e-6);
    }
    // the gap stays closed: slave and master tops move together
    for (slave, master) in SLAVE_NODES.iter().zip(MASTER_TOP_NODES) {
        assert_relative_eq!(
            fixed_point[dof(*slave, 1)] - fixed_point[dof(master, 1)],
            -0.1,
            epsilon = 1e-8
        );
    }
}

#[test]
fn multipliers_grow_linearly_once_closed() {
    let problem = stacked_blocks(0.1, -0.2, 1.0, blocks_config(ContactStrategy::FixedPoint));
    let mut solver = problem.build().expect("setup");

    let mut normal_multipliers = Vec::new();
    while !solver.is_finished() {
        solver.solve_step().expect("step");
        normal_multipliers.push(contact(&solver).pairs()[0].normal_multiplier());
    }
    let expected = [0.0, 0.0, 2.0, 6.0, 10.0];
    for (actual, expected) in normal_multipliers.iter().zip(expected) {
        assert_relative_eq!(*actual, expected, epsilon = 1e-7);
    }
    assert_eq!(contact(&solver).lagrange_multipliers_old(), contact(&solver).lagrange_multipliers());
}

#[test]
fn touching_nodes_are_active_from_the_predictor() {
    let config = SolverConfig::quasi_static()
        .with_time(1.0, 1.0, 1)
        .with_strategy(ContactStrategy::SemiSmooth);
    let problem = stacked_blocks(0.0, 0.0, 1.0, config);
    let mut solver = problem.build().expect("setup");
    let reports = run(&mut solver);

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].newton_iterations, 1);
    assert_eq!(reports[0].active_set_status, ActiveSetStatus::Converged);
    let contact = contact(&solver);
    assert_eq!(contact.active_set().num_active(), 2);
    assert!(contact.lagrange_multipliers().iter().all(|z| z.abs() < 1e-12));
}

#[test]
fn semi_smooth_needs_an_unchanged_set_besides_a_small_residual() {
    // the penetration left after the inactive solve of step 3 is below this
    let mut config = blocks_config(ContactStrategy::SemiSmooth).with_max_iterations(1);
    config.newton.tol_residual = 1.0;
    let mut solver = stacked_blocks(0.1, -0.2, 1.0, config).build().expect("setup");

    let error = solver.integrate(None).expect_err("set changes in the last iteration");
    assert!(matches!(
        error,
        SolverError::ActiveSetUnconverged { step: 3, steps: 2 }
    ));
    assert_eq!(solver.model().integrator().step(), 2);

    // one more iteration confirms the set
    let config = config.with_max_iterations(2);
    let mut solver = stacked_blocks(0.1, -0.2, 1.0, config).build().expect("setup");
    let reports = run(&mut solver);
    assert_eq!(reports[2].newton_iterations, 2);
    assert_closed_blocks(&solver);
}

#[test]
fn exhausted_active_set_budget_aborts_when_configured() {
    let mut config = blocks_config(ContactStrategy::FixedPoint);
    config.contact.max_active_set_iterations = 1;
    config.contact.on_active_set_failure = ActiveSetFailurePolicy::Abort;
    let mut solver = stacked_blocks(0.1, -0.2, 1.0, config).build().expect("setup");

    let error = solver.integrate(None).expect_err("step 3 needs two active-set steps");
    assert!(matches!(
        error,
        SolverError::ActiveSetUnconverged { step: 3, steps: 1 }
    ));
    assert_eq!(solver.model().integrator().step(), 2);
}

#[test]
fn exhausted_active_set_budget_is_flagged_when_accepted() {
    let mut config = blocks_config(ContactStrategy::FixedPoint);
    config.contact.max_active_set_iterations = 1;
    let mut solver = stacked_blocks(0.1, -0.2, 1.0, config).build().expect("setup");

    let reports = run(&mut solver);
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[2].active_set_status, ActiveSetStatus::Unconverged);
    assert!(reports[..2].iter().all(|r| r.active_set_status.is_converged()));
}

fn friction_config(law: FrictionLaw) -> SolverConfig {
    let mut config = SolverConfig::quasi_static()
        .with_time(1.0, 1.0, 1)
        .with_friction(law);
    config.contact.c_t = 1000.0;
    config
}

#[test]
fn tresca_stick_holds_the_slave_in_place() {
    let problem = sliding_blocks(-0.1, 1.0, friction_config(FrictionLaw::Tresca { bound: 10.0 }));
    let mut solver = problem.build().expect("setup");
    let reports = run(&mut solver);
    assert_eq!(reports[0].active_set_status, ActiveSetStatus::Converged);

    let contact = contact(&solver);
    assert_eq!(contact.active_set().num_slip(), 0);
    for (pair, slave) in contact.pairs().iter().zip(SLAVE_NODES) {
        assert!(pair.is_active() && !pair.is_slip());
        assert!(displacement(&solver, slave, 0).abs() < 1e-10);
        // the whole tangential load goes into the interface
        assert_relative_eq!(pair.tangential_multiplier(), -2.0, epsilon = 1e-7);
        assert_relative_eq!(pair.normal_multiplier(), 10.0, epsilon = 1e-7);
    }
    assert!(
        contact
            .report()
            .iter()
            .all(|record| record.state == ContactNodeState::Stick)
    );
}

#[test]
fn tresca_slip_transmits_the_bound() {
    let problem = sliding_blocks(-0.1, 1.0, friction_config(FrictionLaw::Tresca { bound: 1.0 }));
    let mut solver = problem.build().expect("setup");
    let reports = run(&mut solver);
    assert_eq!(reports[0].active_set_status, ActiveSetStatus::Converged);

    let contact = contact(&solver);
    assert_eq!(contact.active_set().num_slip(), 2);
    for (pair, slave) in contact.pairs().iter().zip(SLAVE_NODES) {
        assert!(pair.is_slip());
        // 100 u = 1 + D z_t with z_t = -1
        assert_relative_eq!(pair.tangential_multiplier(), -1.0, epsilon = 1e-7);
        assert_relative_eq!(displacement(&solver, slave, 0), 0.005, epsilon = 1e-9);
        assert!(pair.jump() < 0.0);
    }
    assert!(
        contact
            .report()
            .iter()
            .all(|record| record.state == ContactNodeState::Slip)
    );
}

#[test]
fn coulomb_slip_scales_with_normal_traction() {
    let law = FrictionLaw::Coulomb { coefficient: 0.05 };
    let problem = sliding_blocks(-0.1, 1.0, friction_config(law));
    let mut solver = problem.build().expect("setup");
    run(&mut solver);

    for (pair, slave) in contact(&solver).pairs().iter().zip(SLAVE_NODES) {
        assert!(pair.is_slip());
        assert_relative_eq!(pair.normal_multiplier(), 10.0, epsilon = 1e-7);
        assert_relative_eq!(pair.tangential_multiplier(), -0.5, epsilon = 1e-7);
        assert_relative_eq!(displacement(&solver, slave, 0), 0.0075, epsilon = 1e-9);
    }
}
