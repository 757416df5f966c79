//! Edge kinds: channels and the two pump variants.
//!
//! Channels and pumps share one id space per chip so that result maps
//! keyed by edge id never collide.

use mf_core::{EdgeId, NodeId};

/// Subtype of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Regular channel in which droplets can flow.
    Normal,
    /// Lets the continuous phase bypass another channel; droplet
    /// boundaries never switch into a bypass channel.
    Bypass,
    /// Clogs while a droplet passes one of its ends.
    Cloggable,
}

/// A rigid rectangular channel (1D Hagen-Poiseuille abstraction).
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    id: EdgeId,
    pub name: String,
    node0: NodeId,
    node1: NodeId,
    /// Width in m.
    width: f64,
    /// Height in m.
    height: f64,
    /// Length in m.
    length: f64,
    kind: ChannelKind,
    /// Static resistance of the droplet-free channel in Pa s/m^3.
    channel_resistance: f64,
    /// Sum of resistance contributions of droplets currently inside, in
    /// Pa s/m^3. Reset and re-accumulated every iteration.
    droplet_resistance: f64,
}

impl Channel {
    pub fn new(
        id: EdgeId,
        node0: NodeId,
        node1: NodeId,
        height: f64,
        width: f64,
        length: f64,
        kind: ChannelKind,
    ) -> Self {
        Self {
            id,
            name: String::new(),
            node0,
            node1,
            width,
            height,
            length,
            kind,
            channel_resistance: 0.0,
            droplet_resistance: 0.0,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn node0(&self) -> NodeId {
        self.node0
    }

    pub fn node1(&self) -> NodeId {
        self.node1
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Cross-section area in m^2.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Channel volume in m^3.
    pub fn volume(&self) -> f64 {
        self.width * self.height * self.length
    }

    /// Total resistance (static + droplet contributions) in Pa s/m^3.
    pub fn resistance(&self) -> f64 {
        self.channel_resistance + self.droplet_resistance
    }

    pub fn channel_resistance(&self) -> f64 {
        self.channel_resistance
    }

    pub fn droplet_resistance(&self) -> f64 {
        self.droplet_resistance
    }

    pub fn set_channel_resistance(&mut self, resistance: f64) {
        self.channel_resistance = resistance;
    }

    pub fn set_droplet_resistance(&mut self, resistance: f64) {
        self.droplet_resistance = resistance;
    }

    pub fn add_droplet_resistance(&mut self, resistance: f64) {
        self.droplet_resistance += resistance;
    }
}

/// Pump driving a fixed volumetric flow rate.
///
/// Positive flow rate drives fluid from node0 to node1.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRatePump {
    id: EdgeId,
    pub name: String,
    node0: NodeId,
    node1: NodeId,
    /// Fixed volumetric flow rate in m^3/s.
    flow_rate: f64,
}

impl FlowRatePump {
    pub fn new(id: EdgeId, node0: NodeId, node1: NodeId, flow_rate: f64) -> Self {
        Self {
            id,
            name: String::new(),
            node0,
            node1,
            flow_rate,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn node0(&self) -> NodeId {
        self.node0
    }

    pub fn node1(&self) -> NodeId {
        self.node1
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }
}

/// Pump driving a fixed pressure rise; its flow rate is solved by the
/// nodal analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PressurePump {
    id: EdgeId,
    pub name: String,
    node0: NodeId,
    node1: NodeId,
    /// Fixed pressure rise in Pa.
    pressure: f64,
    /// Flow rate through the pump in m^3/s, written after each solve.
    flow_rate: f64,
}

impl PressurePump {
    pub fn new(id: EdgeId, node0: NodeId, node1: NodeId, pressure: f64) -> Self {
        Self {
            id,
            name: String::new(),
            node0,
            node1,
            pressure,
            flow_rate: 0.0,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn node0(&self) -> NodeId {
        self.node0
    }

    pub fn node1(&self) -> NodeId {
        self.node1
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn set_flow_rate(&mut self, flow_rate: f64) {
        self.flow_rate = flow_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_geometry_helpers() {
        let ch = Channel::new(0, 0, 1, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal);
        assert_eq!(ch.area(), 3e-9);
        assert_eq!(ch.volume(), 3e-12);
    }

    #[test]
    fn channel_resistance_accumulates() {
        let mut ch = Channel::new(0, 0, 1, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal);
        ch.set_channel_resistance(10.0);
        ch.add_droplet_resistance(2.0);
        ch.add_droplet_resistance(3.0);
        assert_eq!(ch.resistance(), 15.0);
        ch.set_droplet_resistance(0.0);
        assert_eq!(ch.resistance(), 10.0);
    }
}
