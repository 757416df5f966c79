//! Regression networks for the nodal analysis.
//!
//! Five small reference circuits with known node pressures and source
//! flows; resistances are given directly as conductances.

use std::collections::BTreeSet;

use approx::assert_abs_diff_eq;
use mf_core::NodeId;
use mf_solver::{Conductor, FlowSource, PressureSource, solve_network};

const TOL: f64 = 1e-6;
const GROUND: NodeId = -1;

fn grounds() -> BTreeSet<NodeId> {
    [GROUND].into_iter().collect()
}

fn resistor(node0: NodeId, node1: NodeId, resistance: f64) -> Conductor {
    Conductor {
        node0,
        node1,
        conductance: 1.0 / resistance,
    }
}

#[test]
fn network_1_source_pair() {
    let conductors = [
        resistor(0, 1, 5.0),
        resistor(1, GROUND, 10.0),
        resistor(2, 3, 5.0),
        resistor(3, GROUND, 10.0),
    ];
    let pressure_sources = [PressureSource {
        node0: GROUND,
        node1: 0,
        pressure: 1.0,
    }];
    let flow_sources = [FlowSource {
        node0: GROUND,
        node1: 2,
        flow_rate: 1.0,
    }];

    let solution = solve_network(&grounds(), &conductors, &pressure_sources, &flow_sources).unwrap();

    assert_abs_diff_eq!(solution.pressure(0), 1.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(1), 2.0 / 3.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(2), 15.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(3), 10.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[0], -0.2 / 3.0, epsilon = TOL);
}

#[test]
fn network_2_dead_branch_carries_no_flow() {
    let conductors = [
        resistor(0, 1, 5.0),
        resistor(GROUND, 1, 10.0),
        resistor(1, 2, 20.0),
        resistor(2, 3, 30.0),
    ];
    let pressure_sources = [
        PressureSource {
            node0: GROUND,
            node1: 0,
            pressure: 1.0,
        },
        PressureSource {
            node0: 4,
            node1: GROUND,
            pressure: 2.0,
        },
    ];
    let flow_sources = [FlowSource {
        node0: GROUND,
        node1: 1,
        flow_rate: 1.0,
    }];

    let solution = solve_network(&grounds(), &conductors, &pressure_sources, &flow_sources).unwrap();

    assert_abs_diff_eq!(solution.pressure(0), 1.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(1), 4.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(2), 4.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(3), 4.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(4), -2.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[0], 0.6, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[1], 0.0, epsilon = TOL);
}

#[test]
fn network_3_two_pressure_sources() {
    let conductors = [
        resistor(GROUND, 0, 2.0),
        resistor(1, 2, 4.0),
        resistor(1, GROUND, 8.0),
    ];
    let pressure_sources = [
        PressureSource {
            node0: 1,
            node1: 0,
            pressure: 32.0,
        },
        PressureSource {
            node0: 2,
            node1: GROUND,
            pressure: 20.0,
        },
    ];

    let solution = solve_network(&grounds(), &conductors, &pressure_sources, &[]).unwrap();

    assert_abs_diff_eq!(solution.pressure(0), 8.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(1), -24.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(2), -20.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[0], -4.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[1], 1.0, epsilon = TOL);
}

#[test]
fn network_4_mixed_sources() {
    let conductors = [
        resistor(GROUND, 0, 2.0),
        resistor(0, 1, 4.0),
        resistor(1, GROUND, 8.0),
    ];
    let pressure_sources = [PressureSource {
        node0: 0,
        node1: 1,
        pressure: 32.0,
    }];
    let flow_sources = [FlowSource {
        node0: 0,
        node1: GROUND,
        flow_rate: 20.0,
    }];

    let solution = solve_network(&grounds(), &conductors, &pressure_sources, &flow_sources).unwrap();

    assert_abs_diff_eq!(solution.pressure(0), -38.4, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(1), -6.4, epsilon = TOL);
    assert_abs_diff_eq!(solution.source_flow_rates[0], -7.2, epsilon = TOL);
}

#[test]
fn network_5_flow_sources_only() {
    let conductors = [
        resistor(0, 1, 5.0),
        resistor(1, 2, 7.0),
        resistor(1, GROUND, 10.0),
    ];
    let flow_sources = [
        FlowSource {
            node0: 0,
            node1: GROUND,
            flow_rate: 1.0,
        },
        FlowSource {
            node0: 2,
            node1: GROUND,
            flow_rate: 1.5,
        },
    ];

    let solution = solve_network(&grounds(), &conductors, &[], &flow_sources).unwrap();

    assert_abs_diff_eq!(solution.pressure(0), -30.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(1), -25.0, epsilon = TOL);
    assert_abs_diff_eq!(solution.pressure(2), -35.5, epsilon = TOL);
}

#[test]
fn flow_conservation_at_interior_nodes() {
    // diamond of equal resistors driven by one flow source
    let conductors = [
        resistor(0, 1, 3.0),
        resistor(1, 2, 3.0),
        resistor(1, 3, 3.0),
        resistor(2, 3, 3.0),
        resistor(3, GROUND, 3.0),
    ];
    let flow_sources = [FlowSource {
        node0: GROUND,
        node1: 0,
        flow_rate: 2.0,
    }];

    let solution = solve_network(&grounds(), &conductors, &[], &flow_sources).unwrap();

    // net signed flow over each interior node sums to zero
    for node in [1, 2, 3] {
        let mut net = 0.0;
        for c in &conductors {
            let flow = (solution.pressure(c.node0) - solution.pressure(c.node1)) * c.conductance;
            if c.node0 == node {
                net -= flow;
            } else if c.node1 == node {
                net += flow;
            }
        }
        assert_abs_diff_eq!(net, 0.0, epsilon = 1e-9);
    }
}
