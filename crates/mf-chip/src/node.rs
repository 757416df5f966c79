//! Network nodes.

use mf_core::NodeId;

/// A node of the hydraulic network.
///
/// Nodes are minimal: they carry their id and the pressure of the most
/// recent nodal-analysis solve (Pa). They are created implicitly when an
/// edge first references their id.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    pressure: f64,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self { id, pressure: 0.0 }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Pressure at this node in Pa.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn set_pressure(&mut self, pressure: f64) {
        self.pressure = pressure;
    }
}
