//! Droplet boundaries: moving fluid-fluid interfaces.

use mf_chip::{Channel, ChannelKind, ChannelPosition, Chip};
use mf_core::{EdgeId, NodeId};

/// Wait state of a boundary.
///
/// A boundary parks when no admissible next channel is available at the
/// node it reached; a parked boundary has zero flow rate and generates no
/// events until the surrounding flow field releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryState {
    #[default]
    Normal,
    /// Parked while moving towards the droplet center. Unreachable with
    /// the current event set (tail boundaries are removed or re-based
    /// first) but kept for symmetry.
    WaitInflow,
    /// Parked while moving away from the droplet center.
    WaitOutflow,
}

/// A moving interface of one droplet.
///
/// The channel is referenced by id; callers resolve it through the chip.
/// The flow rate is signed relative to the droplet: negative moves the
/// boundary towards the droplet center (inflow), positive away from it
/// (outflow).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    position: ChannelPosition,
    /// True when the droplet interior lies between this interface and
    /// node0 of the channel.
    volume_towards_node0: bool,
    /// Boundary flow rate in m^3/s, signed as described above.
    flow_rate: f64,
    state: BoundaryState,
}

impl Boundary {
    pub fn new(
        channel: EdgeId,
        position: f64,
        volume_towards_node0: bool,
        state: BoundaryState,
    ) -> Self {
        Self {
            position: ChannelPosition::new(channel, position),
            volume_towards_node0,
            flow_rate: 0.0,
            state,
        }
    }

    pub fn channel(&self) -> EdgeId {
        self.position.channel()
    }

    pub fn position(&self) -> &ChannelPosition {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut ChannelPosition {
        &mut self.position
    }

    pub fn is_volume_towards_node0(&self) -> bool {
        self.volume_towards_node0
    }

    pub fn set_volume_towards_node0(&mut self, volume_towards_node0: bool) {
        self.volume_towards_node0 = volume_towards_node0;
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn set_flow_rate(&mut self, flow_rate: f64) {
        self.flow_rate = flow_rate;
    }

    pub fn state(&self) -> BoundaryState {
        self.state
    }

    pub fn set_state(&mut self, state: BoundaryState) {
        self.state = state;
    }

    pub fn in_wait_state(&self) -> bool {
        matches!(self.state, BoundaryState::WaitInflow | BoundaryState::WaitOutflow)
    }

    /// Park the boundary; a parked boundary does not move and triggers no
    /// events.
    pub fn park(&mut self, state: BoundaryState) {
        self.state = state;
        self.flow_rate = 0.0;
    }

    /// The node the droplet interior touches.
    pub fn reference_node(&self, channel: &Channel) -> NodeId {
        if self.volume_towards_node0 {
            channel.node0()
        } else {
            channel.node1()
        }
    }

    /// The node on the far side of the interface.
    pub fn opposite_node(&self, channel: &Channel) -> NodeId {
        if self.volume_towards_node0 {
            channel.node1()
        } else {
            channel.node0()
        }
    }

    /// Liquid volume between the interface and its reference node (m^3).
    pub fn volume_on_reference_side(&self, channel: &Channel) -> f64 {
        if self.volume_towards_node0 {
            self.position.volume_towards_node0(channel)
        } else {
            self.position.volume_towards_node1(channel)
        }
    }

    /// Volume between the interface and the node it currently advances
    /// towards (m^3); zero for a resting boundary.
    pub fn remaining_volume(&self, channel: &Channel) -> f64 {
        if self.flow_rate < 0.0 {
            // inflow: moving towards the reference node
            self.volume_on_reference_side(channel)
        } else if self.flow_rate > 0.0 {
            // outflow: moving towards the opposite node
            if self.volume_towards_node0 {
                self.position.volume_towards_node1(channel)
            } else {
                self.position.volume_towards_node0(channel)
            }
        } else {
            0.0
        }
    }

    /// The channel flow rate oriented relative to the droplet: negative
    /// is an inflow (towards the center), positive an outflow.
    pub fn oriented_channel_flow_rate(&self, chip: &Chip, channel: &Channel) -> f64 {
        let flow_rate = chip.channel_flow_rate(channel);
        if self.volume_towards_node0 {
            flow_rate
        } else {
            -flow_rate
        }
    }

    /// Time until the boundary reaches the end of its channel, in s.
    pub fn fire_time(&self, channel: &Channel) -> f64 {
        if self.flow_rate == 0.0 {
            0.0
        } else {
            self.remaining_volume(channel) / self.flow_rate.abs()
        }
    }

    /// Advance the interface by one time step (s).
    pub fn advance(&mut self, channel: &Channel, time_step: f64) {
        // an outflow moves away from the reference node: towards node1
        // when the interior lies towards node0, and vice versa
        let volume_shift = if self.volume_towards_node0 {
            self.flow_rate * time_step
        } else {
            -self.flow_rate * time_step
        };
        self.position.shift_by_volume(channel, volume_shift);
    }

    /// Re-evaluate a wait state against the current flow field.
    ///
    /// WaitInflow clears once the oriented channel flow turns into an
    /// outflow. WaitOutflow clears when the flow reverses, or when a
    /// normal channel with outflow away from the blocking node appears.
    pub fn update_wait_state(&mut self, chip: &Chip, channel: &Channel) {
        match self.state {
            BoundaryState::Normal => {}
            BoundaryState::WaitInflow => {
                if self.oriented_channel_flow_rate(chip, channel) > 0.0 {
                    self.state = BoundaryState::Normal;
                }
            }
            BoundaryState::WaitOutflow => {
                if self.oriented_channel_flow_rate(chip, channel) < 0.0 {
                    self.state = BoundaryState::Normal;
                    return;
                }

                let node = self.opposite_node(channel);
                for &candidate_id in chip.channels_at_node(node) {
                    if candidate_id == channel.id() {
                        continue;
                    }
                    let Ok(candidate) = chip.channel(candidate_id) else {
                        continue;
                    };
                    if candidate.kind() != ChannelKind::Normal {
                        continue;
                    }
                    // outflow away from the blocking node
                    let flow_rate = if candidate.node0() == node {
                        chip.channel_flow_rate(candidate)
                    } else {
                        -chip.channel_flow_rate(candidate)
                    };
                    if flow_rate > 0.0 {
                        self.state = BoundaryState::Normal;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_chip::ChannelKind;

    fn chip_with_channel() -> (Chip, EdgeId) {
        let mut chip = Chip::new();
        let c = chip
            .add_channel(0, 1, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal)
            .unwrap();
        chip.channel_mut(c).unwrap().set_channel_resistance(1.0);
        (chip, c)
    }

    #[test]
    fn reference_and_opposite_nodes_follow_orientation() {
        let (chip, c) = chip_with_channel();
        let channel = chip.channel(c).unwrap();

        let towards0 = Boundary::new(c, 0.5, true, BoundaryState::Normal);
        assert_eq!(towards0.reference_node(channel), 0);
        assert_eq!(towards0.opposite_node(channel), 1);

        let towards1 = Boundary::new(c, 0.5, false, BoundaryState::Normal);
        assert_eq!(towards1.reference_node(channel), 1);
        assert_eq!(towards1.opposite_node(channel), 0);
    }

    #[test]
    fn remaining_volume_depends_on_flow_direction() {
        let (chip, c) = chip_with_channel();
        let channel = chip.channel(c).unwrap();
        let volume = channel.volume();

        let mut boundary = Boundary::new(c, 0.25, true, BoundaryState::Normal);
        boundary.set_flow_rate(1e-11);
        // outflow towards node1
        assert!((boundary.remaining_volume(channel) - 0.75 * volume).abs() < 1e-24);
        boundary.set_flow_rate(-1e-11);
        // inflow towards node0
        assert!((boundary.remaining_volume(channel) - 0.25 * volume).abs() < 1e-24);
    }

    #[test]
    fn fire_time_is_volume_over_flow() {
        let (chip, c) = chip_with_channel();
        let channel = chip.channel(c).unwrap();

        let mut boundary = Boundary::new(c, 0.5, true, BoundaryState::Normal);
        boundary.set_flow_rate(1.5e-12);
        let expected = 0.5 * channel.volume() / 1.5e-12;
        assert!((boundary.fire_time(channel) - expected).abs() < 1e-9);

        boundary.set_flow_rate(0.0);
        assert_eq!(boundary.fire_time(channel), 0.0);
    }

    #[test]
    fn advance_moves_outflow_away_from_reference_node() {
        let (chip, c) = chip_with_channel();
        let channel = chip.channel(c).unwrap();
        let volume = channel.volume();

        let mut towards0 = Boundary::new(c, 0.5, true, BoundaryState::Normal);
        towards0.set_flow_rate(0.1 * volume);
        towards0.advance(channel, 1.0);
        assert!((towards0.position().position() - 0.6).abs() < 1e-12);

        let mut towards1 = Boundary::new(c, 0.5, false, BoundaryState::Normal);
        towards1.set_flow_rate(0.1 * volume);
        towards1.advance(channel, 1.0);
        assert!((towards1.position().position() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn park_zeroes_the_flow_rate() {
        let (_, c) = chip_with_channel();
        let mut boundary = Boundary::new(c, 1.0, true, BoundaryState::Normal);
        boundary.set_flow_rate(2e-11);
        boundary.park(BoundaryState::WaitOutflow);
        assert!(boundary.in_wait_state());
        assert_eq!(boundary.flow_rate(), 0.0);
    }

    #[test]
    fn wait_outflow_clears_on_flow_reversal() {
        let (mut chip, c) = chip_with_channel();
        // flow from node1 to node0: an inflow for a towards0 boundary
        chip.set_node_pressure(0, 0.0);
        chip.set_node_pressure(1, 5.0);

        let mut boundary = Boundary::new(c, 1.0, true, BoundaryState::WaitOutflow);
        let channel = chip.channel(c).unwrap();
        boundary.update_wait_state(&chip, channel);
        assert_eq!(boundary.state(), BoundaryState::Normal);
    }

    #[test]
    fn wait_outflow_clears_when_a_normal_outflow_channel_appears() {
        let (mut chip, c) = chip_with_channel();
        let next = chip
            .add_channel(1, 2, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal)
            .unwrap();
        chip.channel_mut(next).unwrap().set_channel_resistance(1.0);

        // still an outflow in the boundary channel, and outflow away from
        // node 1 in the next channel
        chip.set_node_pressure(0, 10.0);
        chip.set_node_pressure(1, 5.0);
        chip.set_node_pressure(2, 0.0);

        let mut boundary = Boundary::new(c, 1.0, true, BoundaryState::WaitOutflow);
        let channel = chip.channel(c).unwrap();
        boundary.update_wait_state(&chip, channel);
        assert_eq!(boundary.state(), BoundaryState::Normal);
    }

    #[test]
    fn wait_outflow_ignores_bypass_channels() {
        let (mut chip, c) = chip_with_channel();
        let bypass = chip
            .add_channel(1, 2, 30e-6, 100e-6, 1000e-6, ChannelKind::Bypass)
            .unwrap();
        chip.channel_mut(bypass).unwrap().set_channel_resistance(1.0);

        chip.set_node_pressure(0, 10.0);
        chip.set_node_pressure(1, 5.0);
        chip.set_node_pressure(2, 0.0);

        let mut boundary = Boundary::new(c, 1.0, true, BoundaryState::WaitOutflow);
        let channel = chip.channel(c).unwrap();
        boundary.update_wait_state(&chip, channel);
        assert_eq!(boundary.state(), BoundaryState::WaitOutflow);
    }
}
