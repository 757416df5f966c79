//! Modified nodal analysis over capability views.
//!
//! The system `A x = z` is the classic `[G B; C D]` block layout: one row
//! per non-ground node (Kirchhoff current balance) plus one row per
//! pressure source (its pressure constraint). Ground nodes are pinned to
//! 0 Pa and excluded from the matrix.

use std::collections::{BTreeMap, BTreeSet};

use mf_core::NodeId;
use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};

/// A resistive edge, seen as its conductance (1/R, in m^3/(s Pa)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conductor {
    pub node0: NodeId,
    pub node1: NodeId,
    pub conductance: f64,
}

/// An edge enforcing a fixed pressure rise from node0 to node1 (Pa). Its
/// flow rate is an auxiliary unknown of the system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSource {
    pub node0: NodeId,
    pub node1: NodeId,
    pub pressure: f64,
}

/// An edge enforcing a fixed volumetric flow rate out of node0 and into
/// node1 (m^3/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSource {
    pub node0: NodeId,
    pub node1: NodeId,
    pub flow_rate: f64,
}

/// Result of a nodal solve.
#[derive(Debug, Clone, PartialEq)]
pub struct NodalSolution {
    pressures: BTreeMap<NodeId, f64>,
    /// Solved flow rate of each pressure source, in input order (m^3/s).
    pub source_flow_rates: Vec<f64>,
}

impl NodalSolution {
    /// Pressure at a node in Pa (ground nodes read 0).
    pub fn pressure(&self, node: NodeId) -> f64 {
        self.pressures.get(&node).copied().unwrap_or(0.0)
    }

    pub fn pressures(&self) -> &BTreeMap<NodeId, f64> {
        &self.pressures
    }
}

/// Solve the hydraulic network.
///
/// Every node referenced by an edge participates; every node listed in
/// `grounds` is pinned to 0 Pa. Matrix indices are assigned in ascending
/// node-id order, so the assembly is deterministic.
pub fn solve_network(
    grounds: &BTreeSet<NodeId>,
    conductors: &[Conductor],
    pressure_sources: &[PressureSource],
    flow_sources: &[FlowSource],
) -> SolverResult<NodalSolution> {
    // collect the participating nodes
    let mut node_ids: BTreeSet<NodeId> = grounds.iter().copied().collect();
    for c in conductors {
        node_ids.insert(c.node0);
        node_ids.insert(c.node1);
    }
    for p in pressure_sources {
        node_ids.insert(p.node0);
        node_ids.insert(p.node1);
    }
    for f in flow_sources {
        node_ids.insert(f.node0);
        node_ids.insert(f.node1);
    }

    // matrix index per non-ground node; grounds stay unindexed
    let mut matrix_index: BTreeMap<NodeId, usize> = BTreeMap::new();
    for &id in &node_ids {
        if !grounds.contains(&id) {
            let idx = matrix_index.len();
            matrix_index.insert(id, idx);
        }
    }

    let n_nodes = matrix_index.len();
    let size = n_nodes + pressure_sources.len();
    let mut a = DMatrix::<f64>::zeros(size, size);
    let mut z = DVector::<f64>::zeros(size);

    // G block: conductances
    for c in conductors {
        let i0 = matrix_index.get(&c.node0).copied();
        let i1 = matrix_index.get(&c.node1).copied();

        if let Some(i) = i0 {
            a[(i, i)] += c.conductance;
        }
        if let Some(i) = i1 {
            a[(i, i)] += c.conductance;
        }
        if let (Some(i), Some(j)) = (i0, i1) {
            a[(i, j)] -= c.conductance;
            a[(j, i)] -= c.conductance;
        }
    }

    // B/C blocks and e vector: pressure sources
    for (k, p) in pressure_sources.iter().enumerate() {
        let row = n_nodes + k;
        if let Some(&i) = matrix_index.get(&p.node0) {
            a[(i, row)] = -1.0;
            a[(row, i)] = -1.0;
        }
        if let Some(&i) = matrix_index.get(&p.node1) {
            a[(i, row)] = 1.0;
            a[(row, i)] = 1.0;
        }
        z[row] = p.pressure;
    }

    // i vector: flow sources (positive flow leaves node0, enters node1)
    for f in flow_sources {
        if let Some(&i) = matrix_index.get(&f.node0) {
            z[i] -= f.flow_rate;
        }
        if let Some(&i) = matrix_index.get(&f.node1) {
            z[i] += f.flow_rate;
        }
    }

    let x = a
        .col_piv_qr()
        .solve(&z)
        .ok_or(SolverError::NetworkSingular { size })?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NetworkSingular { size });
    }

    let mut pressures = BTreeMap::new();
    for &id in &node_ids {
        let p = match matrix_index.get(&id) {
            Some(&i) => x[i],
            None => 0.0,
        };
        pressures.insert(id, p);
    }

    let source_flow_rates = (0..pressure_sources.len())
        .map(|k| x[n_nodes + k])
        .collect();

    Ok(NodalSolution {
        pressures,
        source_flow_rates,
    })
}
