//! The chip: a directed multigraph of channels and pumps.

use std::collections::{BTreeMap, BTreeSet};

use mf_core::{EdgeId, NodeId};

use crate::edge::{Channel, ChannelKind, FlowRatePump, PressurePump};
use crate::error::{ChipError, ChipResult};
use crate::node::Node;
use crate::validate;

/// The static microfluidic network.
///
/// Nodes are created on first reference by an edge. Channels and pumps
/// share one sequential id space. Registries are ordered maps so that
/// iteration (and with it event enumeration downstream) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Chip {
    name: String,
    nodes: BTreeMap<NodeId, Node>,
    channels: BTreeMap<EdgeId, Channel>,
    flow_rate_pumps: BTreeMap<EdgeId, FlowRatePump>,
    pressure_pumps: BTreeMap<EdgeId, PressurePump>,
    /// For each node, the ids of incident channels (pumps excluded).
    channels_at_node: BTreeMap<NodeId, Vec<EdgeId>>,
    sinks: BTreeSet<NodeId>,
    grounds: BTreeSet<NodeId>,
    next_edge_id: EdgeId,
}

impl Chip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn get_or_add_node(&mut self, node_id: NodeId) -> &mut Node {
        self.channels_at_node.entry(node_id).or_default();
        self.nodes.entry(node_id).or_insert_with(|| Node::new(node_id))
    }

    fn take_edge_id(&mut self) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        id
    }

    /// Add a channel between two nodes, creating the nodes if necessary.
    ///
    /// All dimensions are in m and must be positive.
    pub fn add_channel(
        &mut self,
        node0: NodeId,
        node1: NodeId,
        height: f64,
        width: f64,
        length: f64,
        kind: ChannelKind,
    ) -> ChipResult<EdgeId> {
        for (what, value) in [("height", height), ("width", width), ("length", length)] {
            if value <= 0.0 || !value.is_finite() {
                return Err(ChipError::InvalidGeometry { what, value });
            }
        }

        self.get_or_add_node(node0);
        self.get_or_add_node(node1);
        let id = self.take_edge_id();
        self.channels
            .insert(id, Channel::new(id, node0, node1, height, width, length, kind));

        // channels_at_node entries exist after get_or_add_node
        self.channels_at_node.get_mut(&node0).expect("node added above").push(id);
        self.channels_at_node.get_mut(&node1).expect("node added above").push(id);

        Ok(id)
    }

    /// Add a pump driving a fixed volumetric flow rate from node0 to
    /// node1 (m^3/s).
    pub fn add_flow_rate_pump(&mut self, node0: NodeId, node1: NodeId, flow_rate: f64) -> EdgeId {
        self.get_or_add_node(node0);
        self.get_or_add_node(node1);
        let id = self.take_edge_id();
        self.flow_rate_pumps
            .insert(id, FlowRatePump::new(id, node0, node1, flow_rate));
        id
    }

    /// Add a pump driving a fixed pressure rise from node0 to node1 (Pa).
    pub fn add_pressure_pump(&mut self, node0: NodeId, node1: NodeId, pressure: f64) -> EdgeId {
        self.get_or_add_node(node0);
        self.get_or_add_node(node1);
        let id = self.take_edge_id();
        self.pressure_pumps
            .insert(id, PressurePump::new(id, node0, node1, pressure));
        id
    }

    /// Mark a node as a sink. Droplets whose head reaches a sink leave
    /// the network.
    pub fn add_sink(&mut self, node_id: NodeId) {
        self.get_or_add_node(node_id);
        self.sinks.insert(node_id);
    }

    /// Mark a node as a ground node (pressure reference, pinned to 0 Pa).
    pub fn add_ground(&mut self, node_id: NodeId) {
        self.get_or_add_node(node_id);
        self.grounds.insert(node_id);
    }

    pub fn is_sink(&self, node_id: NodeId) -> bool {
        self.sinks.contains(&node_id)
    }

    pub fn is_ground(&self, node_id: NodeId) -> bool {
        self.grounds.contains(&node_id)
    }

    /// Ids of all ground nodes; fails when no ground was defined.
    pub fn ground_ids(&self) -> ChipResult<&BTreeSet<NodeId>> {
        if self.grounds.is_empty() {
            return Err(ChipError::MissingGround);
        }
        Ok(&self.grounds)
    }

    pub fn has_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node(&self, node_id: NodeId) -> ChipResult<&Node> {
        self.nodes.get(&node_id).ok_or(ChipError::UnknownNode(node_id))
    }

    pub fn channel(&self, channel_id: EdgeId) -> ChipResult<&Channel> {
        self.channels
            .get(&channel_id)
            .ok_or(ChipError::UnknownChannel(channel_id))
    }

    pub fn channel_mut(&mut self, channel_id: EdgeId) -> ChipResult<&mut Channel> {
        self.channels
            .get_mut(&channel_id)
            .ok_or(ChipError::UnknownChannel(channel_id))
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub fn channels(&self) -> &BTreeMap<EdgeId, Channel> {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut BTreeMap<EdgeId, Channel> {
        &mut self.channels
    }

    pub fn flow_rate_pumps(&self) -> &BTreeMap<EdgeId, FlowRatePump> {
        &self.flow_rate_pumps
    }

    pub fn pressure_pumps(&self) -> &BTreeMap<EdgeId, PressurePump> {
        &self.pressure_pumps
    }

    pub fn pressure_pumps_mut(&mut self) -> &mut BTreeMap<EdgeId, PressurePump> {
        &mut self.pressure_pumps
    }

    /// Ids of channels incident to a node (empty slice for unknown ids).
    pub fn channels_at_node(&self, node_id: NodeId) -> &[EdgeId] {
        self.channels_at_node
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pressure at a node in Pa.
    pub fn node_pressure(&self, node_id: NodeId) -> f64 {
        // Edge endpoints always exist; unknown ids only occur for caller
        // typos and read as the 0 Pa reference.
        self.nodes.get(&node_id).map_or(0.0, Node::pressure)
    }

    pub fn set_node_pressure(&mut self, node_id: NodeId, pressure: f64) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.set_pressure(pressure);
        }
    }

    /// Pressure drop over a channel, node0 minus node1, in Pa.
    pub fn channel_pressure_drop(&self, channel: &Channel) -> f64 {
        self.node_pressure(channel.node0()) - self.node_pressure(channel.node1())
    }

    /// Flow rate through a channel in m^3/s; positive runs from node0
    /// towards node1.
    pub fn channel_flow_rate(&self, channel: &Channel) -> f64 {
        self.channel_pressure_drop(channel) / channel.resistance()
    }

    /// Check that every node and channel reaches at least one ground node
    /// via non-cloggable channels. Returns a structured error naming the
    /// offenders. Idempotent on a valid chip.
    pub fn check_validity(&self) -> ChipResult<()> {
        validate::check_reaches_ground(self)
    }
}
