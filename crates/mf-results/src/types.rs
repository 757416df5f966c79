//! Result data types.
//!
//! All quantities are SI: Pa, m, m^3, m^3/s, Pa s, kg/m^3, s.

use std::collections::BTreeMap;

use mf_core::{DropletId, EdgeId, FluidId, InjectionId, NodeId};
use serde::{Deserialize, Serialize};

/// Channel subtype as recorded in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Normal,
    Bypass,
    Cloggable,
}

/// Droplet lifecycle state as recorded in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropletState {
    /// Scheduled for injection, not yet in the network.
    Injection,
    /// Flowing through the network.
    Network,
    /// Stuck in the network.
    Trapped,
    /// Left the network (or was consumed by a merge).
    Sink,
}

/// Boundary wait state as recorded in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryState {
    Normal,
    WaitInflow,
    WaitOutflow,
}

/// Which resistance model produced the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResistanceModelKind {
    /// Rectangular-cross-section Hagen-Poiseuille approximation.
    #[default]
    Rectangular,
    /// Simplified model used by tests: resistances scale with volume.
    Test,
}

/// A channel id plus a relative position within the channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPositionRecord {
    pub channel_id: EdgeId,
    /// Relative position in [0, 1].
    pub position: f64,
}

/// Snapshot of one droplet boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRecord {
    pub position: ChannelPositionRecord,
    /// True when the droplet interior lies towards node0 of the channel.
    pub volume_towards0: bool,
    /// Signed boundary flow rate in m^3/s (negative moves towards the
    /// droplet center).
    pub flow_rate: f64,
    pub state: BoundaryState,
}

/// Position of one droplet within a recorded state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropletPositionRecord {
    pub state: DropletState,
    pub boundaries: Vec<BoundaryRecord>,
    /// Ids of channels fully occupied by the droplet.
    pub channel_ids: Vec<EdgeId>,
}

/// Channel as recorded in the chip summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: EdgeId,
    pub name: String,
    pub node0_id: NodeId,
    pub node1_id: NodeId,
    pub width: f64,
    pub height: f64,
    pub length: f64,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRatePumpSummary {
    pub id: EdgeId,
    pub name: String,
    pub node0_id: NodeId,
    pub node1_id: NodeId,
    pub flow_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressurePumpSummary {
    pub id: EdgeId,
    pub name: String,
    pub node0_id: NodeId,
    pub node1_id: NodeId,
    pub pressure: f64,
}

/// Static network summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChipSummary {
    pub name: String,
    pub channels: BTreeMap<EdgeId, ChannelSummary>,
    pub flow_rate_pumps: BTreeMap<EdgeId, FlowRatePumpSummary>,
    pub pressure_pumps: BTreeMap<EdgeId, PressurePumpSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluidSummary {
    pub id: FluidId,
    pub name: String,
    /// Parent fluid ids when this fluid was created by mixing.
    pub mixed_fluid_ids: Vec<FluidId>,
    /// Viscosity in Pa s.
    pub viscosity: f64,
    /// Density in kg/m^3.
    pub density: f64,
    /// Concentration in [0, 1].
    pub concentration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropletSummary {
    pub id: DropletId,
    pub name: String,
    /// Parent droplet ids when this droplet was created by merging.
    pub merged_droplet_ids: Vec<DropletId>,
    /// Volume in m^3.
    pub volume: f64,
    pub fluid_id: FluidId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionSummary {
    pub id: InjectionId,
    pub droplet_id: DropletId,
    /// Scheduled injection time in s.
    pub time: f64,
    pub position: ChannelPositionRecord,
}

/// One recorded network state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Sequential state id.
    pub id: usize,
    /// Simulation time in s.
    pub time: f64,
    /// Pressure per node id in Pa.
    pub pressures: BTreeMap<NodeId, f64>,
    /// Flow rate per edge id (channels and pumps) in m^3/s.
    pub flow_rates: BTreeMap<EdgeId, f64>,
    /// Positions of all droplets known at this state.
    pub droplet_positions: BTreeMap<DropletId, DropletPositionRecord>,
}

impl State {
    pub fn new(id: usize, time: f64) -> Self {
        Self {
            id,
            time,
            pressures: BTreeMap::new(),
            flow_rates: BTreeMap::new(),
            droplet_positions: BTreeMap::new(),
        }
    }

    /// Pressure at a node in Pa.
    pub fn pressure(&self, node_id: NodeId) -> Option<f64> {
        self.pressures.get(&node_id).copied()
    }

    /// Pressure drop between two nodes in Pa.
    pub fn pressure_drop(&self, node0_id: NodeId, node1_id: NodeId) -> Option<f64> {
        Some(self.pressure(node0_id)? - self.pressure(node1_id)?)
    }

    /// Flow rate at an edge in m^3/s.
    pub fn flow_rate(&self, edge_id: EdgeId) -> Option<f64> {
        self.flow_rates.get(&edge_id).copied()
    }
}

/// Complete outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub chip: ChipSummary,
    /// All fluids, including those created by mixing during the run.
    pub fluids: BTreeMap<FluidId, FluidSummary>,
    /// All droplets, including those created by merging during the run.
    pub droplets: BTreeMap<DropletId, DropletSummary>,
    pub injections: BTreeMap<InjectionId, InjectionSummary>,
    /// States ordered by simulation time.
    pub states: Vec<State>,
    pub continuous_phase_id: FluidId,
    pub maximal_adaptive_time_step: f64,
    pub resistance_model: ResistanceModelKind,
}
