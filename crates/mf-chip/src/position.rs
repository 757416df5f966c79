//! Relative positions inside a channel.

use crate::edge::Channel;
use mf_core::EdgeId;

/// A position inside a channel, as a fraction of its length.
///
/// The channel is referenced by id; geometry-dependent helpers take the
/// resolved [`Channel`] so the position never holds a back-reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPosition {
    channel: EdgeId,
    position: f64,
}

impl ChannelPosition {
    pub fn new(channel: EdgeId, position: f64) -> Self {
        let mut pos = Self {
            channel,
            position: 0.0,
        };
        pos.set_position(position);
        pos
    }

    pub fn channel(&self) -> EdgeId {
        self.channel
    }

    /// Relative position in [0, 1].
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_channel(&mut self, channel: EdgeId) {
        self.channel = channel;
    }

    /// Set the relative position, clamped to [0, 1] against rounding
    /// drift.
    pub fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.0, 1.0);
    }

    /// Shift the position by a liquid volume (m^3); positive volumes move
    /// towards node1.
    pub fn shift_by_volume(&mut self, channel: &Channel, volume_shift: f64) {
        let new_position = self.position + volume_shift / channel.volume();
        self.set_position(new_position);
    }

    /// Absolute position along the channel in m.
    pub fn absolute_position(&self, channel: &Channel) -> f64 {
        self.position * channel.length()
    }

    /// Liquid volume between the position and node0 in m^3.
    pub fn volume_towards_node0(&self, channel: &Channel) -> f64 {
        self.position * channel.volume()
    }

    /// Liquid volume between the position and node1 in m^3.
    pub fn volume_towards_node1(&self, channel: &Channel) -> f64 {
        (1.0 - self.position) * channel.volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::ChannelKind;

    fn channel() -> Channel {
        Channel::new(0, 0, 1, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal)
    }

    #[test]
    fn position_is_clamped() {
        let mut pos = ChannelPosition::new(0, 0.5);
        pos.set_position(-0.1);
        assert_eq!(pos.position(), 0.0);
        pos.set_position(1.7);
        assert_eq!(pos.position(), 1.0);
    }

    #[test]
    fn volume_split_sums_to_channel_volume() {
        let ch = channel();
        let pos = ChannelPosition::new(0, 0.3);
        let v0 = pos.volume_towards_node0(&ch);
        let v1 = pos.volume_towards_node1(&ch);
        assert!((v0 + v1 - ch.volume()).abs() < 1e-24);
        assert!((v0 - 0.3 * ch.volume()).abs() < 1e-24);
    }

    #[test]
    fn shift_by_volume_moves_towards_node1() {
        let ch = channel();
        let mut pos = ChannelPosition::new(0, 0.5);
        pos.shift_by_volume(&ch, 0.25 * ch.volume());
        assert!((pos.position() - 0.75).abs() < 1e-12);
        pos.shift_by_volume(&ch, ch.volume());
        assert_eq!(pos.position(), 1.0);
    }
}
