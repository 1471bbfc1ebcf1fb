//! The problem files shipped in `demos/` load and solve.

use std::path::PathBuf;

use approx::assert_relative_eq;
use cdyn_solver::{ActiveSetStatus, ContactStrategy, DynamicType, FrictionLaw, ProblemDefinition};

fn demo(name: &str) -> ProblemDefinition {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name);
    ProblemDefinition::load(&path).expect("demo problem parses")
}

#[test]
fn blocks_demo_closes_the_gap() {
    let problem = demo("blocks_contact.json");
    assert_eq!(problem.config.contact.strategy, ContactStrategy::SemiSmooth);
    assert_eq!(problem.analysis_type(), "static with contact");

    let mut solver = problem.build().expect("setup");
    let reports = solver.integrate(None).expect("run");
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.active_set_status == ActiveSetStatus::Converged));
    let displacement = solver.model().integrator().state().displacement_n();
    assert_relative_eq!(displacement[9], -0.15, epsilon = 1e-9);
}

#[test]
fn sliding_demo_slips() {
    let problem = demo("sliding_friction.json");
    assert_eq!(problem.config.contact.friction, FrictionLaw::Tresca { bound: 1.0 });

    let mut solver = problem.build().expect("setup");
    solver.integrate(None).expect("run");
    let contact = solver.model().contact().expect("contact");
    assert_eq!(contact.active_set().num_slip(), 2);
    let displacement = solver.model().integrator().state().displacement_n();
    assert_relative_eq!(displacement[8], 0.005, epsilon = 1e-9);
}

#[test]
fn oscillator_demo_runs_all_steps() {
    let problem = demo("oscillator.json");
    assert_eq!(problem.config.dynamic_type, DynamicType::GenAlpha);

    let mut solver = problem.build().expect("setup");
    let reports = solver.integrate(None).expect("run");
    assert_eq!(reports.len(), 40);
    // oscillation about the static deflection f / k = 0.01
    let tip = solver.model().integrator().state().displacement_n()[1];
    assert!(tip > -0.005 && tip < 0.025);
}
