//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use cdyn_solver::{
    BoundaryConditions, ConcentratedLoad, ContactInterfaceDefinition, DisplacementBC, Kinematics,
    LoadCurve, Node, ProblemDefinition, SolverConfig, Truss,
};

pub const STIFFNESS: f64 = 100.0;

/// Node ids of the stacked-blocks model.
pub const SLAVE_NODES: [usize; 2] = [4, 5];
pub const TOP_NODES: [usize; 2] = [6, 7];
pub const MASTER_TOP_NODES: [usize; 2] = [2, 3];

/// Two columns of vertical springs stacked on top of each other.
///
/// ```text
///   6 ─ ─ 7     top, y prescribed
///   │     │
///   4 ─ ─ 5     slave side           y = 1 + gap
///   2 ═══ 3     master segment [2,3] y = 1
///   │     │
///   0     1     fixed
/// ```
///
/// All horizontal DOFs are fixed; every spring has stiffness 100. The top
/// is pushed down to `top_displacement`, ramped over `[0, ramp_end]`.
pub fn stacked_blocks(
    gap: f64,
    top_displacement: f64,
    ramp_end: f64,
    config: SolverConfig,
) -> ProblemDefinition {
    let y_slave = 1.0 + gap;
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0),
        Node::new(1, 1.0, 0.0, 0.0),
        Node::new(2, 0.0, 1.0, 0.0),
        Node::new(3, 1.0, 1.0, 0.0),
        Node::new(4, 0.0, y_slave, 0.0),
        Node::new(5, 1.0, y_slave, 0.0),
        Node::new(6, 0.0, y_slave + 1.0, 0.0),
        Node::new(7, 1.0, y_slave + 1.0, 0.0),
    ];
    let elements = vec![
        Truss::new(0, [0, 2], 1.0, STIFFNESS, 1.0),
        Truss::new(1, [1, 3], 1.0, STIFFNESS, 1.0),
        Truss::new(2, [4, 6], 1.0, STIFFNESS, 1.0),
        Truss::new(3, [5, 7], 1.0, STIFFNESS, 1.0),
    ];

    let mut bcs = BoundaryConditions::new();
    bcs.fix_node(0, 2);
    bcs.fix_node(1, 2);
    for node in 2..8 {
        bcs.add_displacement_bc(DisplacementBC::new(node, 0, 0, 0.0));
    }
    for node in TOP_NODES {
        bcs.add_displacement_bc(
            DisplacementBC::new(node, 1, 1, top_displacement)
                .with_curve(LoadCurve::Ramp { end_time: ramp_end }),
        );
    }

    ProblemDefinition {
        job_name: "blocks".to_string(),
        dimension: 2,
        nodes,
        elements,
        kinematics: Kinematics::Linear,
        boundary_conditions: bcs,
        contact: Some(ContactInterfaceDefinition::new(
            SLAVE_NODES.to_vec(),
            vec![MASTER_TOP_NODES],
        )),
        consistent_initial_acceleration: false,
        config,
    }
}

/// Stacked blocks touching at `y = 1`, with the slave nodes free to slide
/// horizontally against springs to fixed anchors and pushed by `tangential_load`.
pub fn sliding_blocks(
    top_displacement: f64,
    tangential_load: f64,
    config: SolverConfig,
) -> ProblemDefinition {
    let mut problem = stacked_blocks(0.0, top_displacement, 1.0, config);
    problem.job_name = "sliding".to_string();
    problem.nodes.push(Node::new(8, -1.0, 1.0, 0.0));
    problem.nodes.push(Node::new(9, 2.0, 1.0, 0.0));
    problem.elements.push(Truss::new(4, [8, 4], 1.0, STIFFNESS, 1.0));
    problem.elements.push(Truss::new(5, [5, 9], 1.0, STIFFNESS, 1.0));

    let mut bcs = BoundaryConditions::new();
    for node in [0, 1, 8, 9] {
        bcs.fix_node(node, 2);
    }
    for node in [2, 3, 6, 7] {
        bcs.add_displacement_bc(DisplacementBC::new(node, 0, 0, 0.0));
    }
    for node in TOP_NODES {
        bcs.add_displacement_bc(DisplacementBC::new(node, 1, 1, top_displacement));
    }
    for node in SLAVE_NODES {
        bcs.add_concentrated_load(ConcentratedLoad::new(node, 0, tangential_load));
    }
    problem.boundary_conditions = bcs;
    problem
}

/// Global DOF of component `k` of `node` in two dimensions.
pub fn dof(node: usize, k: usize) -> usize {
    2 * node + k
}
