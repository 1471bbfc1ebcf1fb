//! Result files, output cadences and restart continuation.

mod common;

use std::fs;

use approx::assert_relative_eq;
use cdyn_io::{ResultWriter, load_restart, restart_file_name};
use cdyn_solver::{ContactStrategy, SolverConfig, SolverError, StressOutput};
use common::{SLAVE_NODES, dof, stacked_blocks};

fn config(strategy: ContactStrategy) -> SolverConfig {
    let mut config = SolverConfig::quasi_static()
        .with_time(0.2, 1.0, 5)
        .with_strategy(strategy);
    config.output.restart_every = 1;
    config
}

#[test]
fn restart_continues_to_the_same_solution() {
    for strategy in [ContactStrategy::FixedPoint, ContactStrategy::SemiSmooth] {
        let dir = tempfile::tempdir().expect("temp dir");
        let problem = stacked_blocks(0.1, -0.2, 1.0, config(strategy));

        let mut full = problem.build().expect("setup");
        let writer = ResultWriter::create(dir.path(), &problem.job_name).expect("writer");
        full.integrate(Some(&writer)).expect("full run");

        // restart from inside the closed phase
        let restart = load_restart(dir.path().join(restart_file_name(&problem.job_name, 3)))
            .expect("restart file");
        assert_eq!(restart.step, 3);

        let mut resumed = problem.build().expect("setup");
        resumed.restart_from(&restart).expect("restart");
        assert_eq!(resumed.model().integrator().step(), 3);
        assert_eq!(
            resumed.model().contact().expect("contact").active_set().num_active(),
            2
        );
        let reports = resumed.integrate(None).expect("resumed run");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].step, 4);

        let expected = full.model().integrator().state().displacement_n();
        let actual = resumed.model().integrator().state().displacement_n();
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-10);
        }
        let full_contact = full.model().contact().expect("contact");
        let resumed_contact = resumed.model().contact().expect("contact");
        for (a, e) in resumed_contact
            .lagrange_multipliers()
            .iter()
            .zip(full_contact.lagrange_multipliers().iter())
        {
            assert_relative_eq!(*a, *e, epsilon = 1e-8);
        }
    }
}

#[test]
fn restart_before_contact_keeps_the_interface_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    let problem = stacked_blocks(0.1, -0.2, 1.0, config(ContactStrategy::FixedPoint));
    let mut full = problem.build().expect("setup");
    let writer = ResultWriter::create(dir.path(), &problem.job_name).expect("writer");
    full.integrate(Some(&writer)).expect("full run");

    let restart =
        load_restart(dir.path().join(restart_file_name(&problem.job_name, 1))).expect("restart");
    let mut resumed = problem.build().expect("setup");
    resumed.restart_from(&restart).expect("restart");
    assert!(resumed.model().contact().expect("contact").active_set().is_empty());

    let reports = resumed.integrate(None).expect("resumed run");
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[1].active_set_steps, 2);
    let displacement = resumed.model().integrator().state().displacement_n();
    assert_relative_eq!(displacement[dof(SLAVE_NODES[0], 1)], -0.15, epsilon = 1e-9);
}

#[test]
fn restart_must_match_the_contact_setup() {
    let with_contact = stacked_blocks(0.1, -0.2, 1.0, config(ContactStrategy::FixedPoint));
    let mut without_contact = with_contact.clone();
    without_contact.contact = None;

    let mut solver = with_contact.build().expect("setup");
    solver.integrate(None).expect("run");
    let contact_restart = solver.model().restart_state();
    let mut other = without_contact.build().expect("setup");
    assert!(matches!(
        other.restart_from(&contact_restart),
        Err(SolverError::Restart(_))
    ));

    let mut solver = without_contact.build().expect("setup");
    solver.integrate(None).expect("run");
    let plain_restart = solver.model().restart_state();
    let mut other = with_contact.build().expect("setup");
    assert!(matches!(
        other.restart_from(&plain_restart),
        Err(SolverError::Restart(_))
    ));
}

#[test]
fn output_cadences_are_honoured() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = config(ContactStrategy::FixedPoint);
    config.output.results_every = 2;
    config.output.restart_every = 2;
    let problem = stacked_blocks(0.1, -0.2, 1.0, config);
    let mut solver = problem.build().expect("setup");
    let writer = ResultWriter::create(dir.path(), &problem.job_name).expect("writer");
    solver.integrate(Some(&writer)).expect("run");

    let dat = fs::read_to_string(writer.dat_path()).expect("dat file");
    assert!(dat.contains(" STEP 2 TIME"));
    assert!(dat.contains(" STEP 4 TIME"));
    assert!(!dat.contains(" STEP 1 TIME"));
    assert!(!dat.contains(" STEP 5 TIME"));
    assert!(dat.contains("fcontact"));

    // header plus one line per step
    let sta = fs::read_to_string(writer.sta_path()).expect("sta file");
    assert_eq!(sta.lines().count(), 6);

    for step in 1..=5 {
        let path = dir.path().join(restart_file_name(&problem.job_name, step));
        assert_eq!(path.exists(), step % 2 == 0, "restart after step {step}");
    }
}

#[test]
fn element_results_follow_the_stress_cadence() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = config(ContactStrategy::FixedPoint);
    config.output.restart_every = 0;
    config.output.results_every = 5;
    config.output.stress = StressOutput::Cauchy;
    config.output.stress_every = 1;
    let problem = stacked_blocks(0.1, -0.2, 1.0, config);
    let mut solver = problem.build().expect("setup");
    let writer = ResultWriter::create(dir.path(), &problem.job_name).expect("writer");
    solver.integrate(Some(&writer)).expect("run");

    let dat = fs::read_to_string(writer.dat_path()).expect("dat file");
    assert_eq!(dat.matches("element results").count(), 5);
    assert_eq!(dat.matches(" displacement (").count(), 1);
    assert!(
        fs::read_dir(dir.path())
            .expect("output dir")
            .filter_map(|entry| entry.ok())
            .all(|entry| !entry.file_name().to_string_lossy().contains("restart"))
    );
}
