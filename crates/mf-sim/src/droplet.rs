//! Droplets and their boundary bookkeeping.

use mf_chip::{Chip, ChipResult};
use mf_core::{DropletId, EdgeId, FluidId, NodeId};
use tracing::warn;

use crate::boundary::Boundary;
use crate::resistance::ResistanceModel;

/// Lifecycle state of a droplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropletState {
    /// Scheduled for injection, not yet inside the network.
    #[default]
    Injection,
    /// Flowing through the network.
    Network,
    /// Stuck in the network.
    Trapped,
    /// Left the network, or was consumed by a merge. Terminal.
    Sink,
}

/// A discrete liquid droplet.
///
/// A droplet inside the network is delimited by its boundaries; when it
/// spans junctions, the channels completely filled by it are tracked in
/// the fully-occupied set. Boundaries are owned exclusively by their
/// droplet and reference channels by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Droplet {
    id: DropletId,
    pub name: String,
    /// Volume in m^3.
    volume: f64,
    fluid: FluidId,
    state: DropletState,
    boundaries: Vec<Boundary>,
    /// Channels completely filled by this droplet.
    fully_occupied: Vec<EdgeId>,
    /// Parent droplet ids when created by merging.
    merged_from: Vec<DropletId>,
}

impl Droplet {
    pub fn new(id: DropletId, volume: f64, fluid: FluidId) -> Self {
        Self {
            id,
            name: String::new(),
            volume,
            fluid,
            state: DropletState::Injection,
            boundaries: Vec::new(),
            fully_occupied: Vec::new(),
            merged_from: Vec::new(),
        }
    }

    pub fn id(&self) -> DropletId {
        self.id
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn fluid(&self) -> FluidId {
        self.fluid
    }

    pub fn state(&self) -> DropletState {
        self.state
    }

    pub fn set_state(&mut self, state: DropletState) {
        self.state = state;
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn boundary(&self, index: usize) -> Option<&Boundary> {
        self.boundaries.get(index)
    }

    pub fn boundary_mut(&mut self, index: usize) -> Option<&mut Boundary> {
        self.boundaries.get_mut(index)
    }

    pub fn boundaries_mut(&mut self) -> &mut [Boundary] {
        &mut self.boundaries
    }

    pub fn add_boundary(&mut self, boundary: Boundary) {
        self.boundaries.push(boundary);
    }

    pub fn remove_boundary(&mut self, index: usize) {
        if index < self.boundaries.len() {
            self.boundaries.remove(index);
        }
    }

    pub fn fully_occupied_channels(&self) -> &[EdgeId] {
        &self.fully_occupied
    }

    pub fn add_fully_occupied_channel(&mut self, channel_id: EdgeId) {
        self.fully_occupied.push(channel_id);
    }

    pub fn remove_fully_occupied_channel(&mut self, channel_id: EdgeId) {
        if let Some(pos) = self.fully_occupied.iter().position(|&id| id == channel_id) {
            self.fully_occupied.remove(pos);
        }
    }

    pub fn merged_from(&self) -> &[DropletId] {
        &self.merged_from
    }

    pub fn add_parent(&mut self, droplet_id: DropletId) {
        self.merged_from.push(droplet_id);
    }

    /// True when the droplet lies completely inside one channel: exactly
    /// two boundaries in the same channel, no fully-occupied channels.
    pub fn is_inside_single_channel(&self) -> bool {
        self.fully_occupied.is_empty()
            && self.boundaries.len() == 2
            && self.boundaries[0].channel() == self.boundaries[1].channel()
    }

    /// True when the droplet touches a junction. Over-approximates: any
    /// droplet spanning more than one channel counts, even when no branch
    /// lies inside it.
    pub fn is_at_bifurcation(&self) -> bool {
        !self.is_inside_single_channel()
    }

    /// Add this droplet's resistance contributions to its channels.
    pub fn add_resistances(&self, chip: &mut Chip, model: &dyn ResistanceModel) -> ChipResult<()> {
        if self.is_inside_single_channel() {
            let channel_id = self.boundaries[0].channel();
            let resistance = {
                let channel = chip.channel(channel_id)?;
                // volume inside = V_b0 + V_b1 - V_channel
                let volume_inside = self.boundaries[0].volume_on_reference_side(channel)
                    + self.boundaries[1].volume_on_reference_side(channel)
                    - channel.volume();
                model.droplet_resistance(channel, volume_inside)
            };
            chip.channel_mut(channel_id)?.add_droplet_resistance(resistance);
        } else {
            for boundary in &self.boundaries {
                let channel_id = boundary.channel();
                let resistance = {
                    let channel = chip.channel(channel_id)?;
                    model.droplet_resistance(channel, boundary.volume_on_reference_side(channel))
                };
                chip.channel_mut(channel_id)?.add_droplet_resistance(resistance);
            }
            for &channel_id in &self.fully_occupied {
                let resistance = {
                    let channel = chip.channel(channel_id)?;
                    model.droplet_resistance(channel, channel.volume())
                };
                chip.channel_mut(channel_id)?.add_droplet_resistance(resistance);
            }
        }
        Ok(())
    }

    /// Indices of boundaries whose reference node is `node`, optionally
    /// excluding one boundary.
    pub fn connected_boundary_indices(
        &self,
        chip: &Chip,
        node: NodeId,
        exclude: Option<usize>,
    ) -> ChipResult<Vec<usize>> {
        let mut indices = Vec::new();
        for (index, boundary) in self.boundaries.iter().enumerate() {
            if Some(index) == exclude {
                continue;
            }
            let channel = chip.channel(boundary.channel())?;
            if boundary.reference_node(channel) == node {
                indices.push(index);
            }
        }
        Ok(indices)
    }

    /// Fully-occupied channels incident to `node`.
    pub fn connected_fully_occupied_channels(
        &self,
        chip: &Chip,
        node: NodeId,
    ) -> ChipResult<Vec<EdgeId>> {
        let mut channels = Vec::new();
        for &channel_id in &self.fully_occupied {
            let channel = chip.channel(channel_id)?;
            if channel.node0() == node || channel.node1() == node {
                channels.push(channel_id);
            }
        }
        Ok(channels)
    }

    /// Redistribute the channel flow rates seen by the boundaries into
    /// boundary flow rates that conserve the droplet volume.
    ///
    /// The inflow into a droplet does not have to match its outflow (a
    /// bypass channel can drain one side), so each boundary gets a share
    /// of the averaged flow, scaled by the slip factor. Boundaries in a
    /// wait state are re-evaluated first and skipped while parked.
    pub fn update_boundary_flow_rates(&mut self, chip: &Chip, slip_factor: f64) -> ChipResult<()> {
        let mut inflow: Vec<(usize, f64)> = Vec::new();
        let mut outflow: Vec<(usize, f64)> = Vec::new();
        let mut q_inflow = 0.0;
        let mut q_outflow = 0.0;

        for index in 0..self.boundaries.len() {
            let channel = chip.channel(self.boundaries[index].channel())?;
            let boundary = &mut self.boundaries[index];

            boundary.update_wait_state(chip, channel);
            if boundary.in_wait_state() {
                boundary.set_flow_rate(0.0);
                continue;
            }

            let flow_rate = boundary.oriented_channel_flow_rate(chip, channel);
            if flow_rate < 0.0 {
                q_inflow += -flow_rate;
                inflow.push((index, flow_rate));
            } else if flow_rate > 0.0 {
                q_outflow += flow_rate;
                outflow.push((index, flow_rate));
            } else {
                // a boundary in a stagnant channel does not move
                boundary.set_flow_rate(0.0);
            }
        }

        if inflow.is_empty() && !outflow.is_empty() {
            // volume conservation cannot be guaranteed; freeze the
            // droplet for this step
            warn!(
                droplet = self.id,
                "all boundaries move away from the droplet center; droplet frozen"
            );
            for (index, _) in outflow {
                self.boundaries[index].set_flow_rate(0.0);
            }
        } else if !inflow.is_empty() && outflow.is_empty() {
            warn!(
                droplet = self.id,
                "all boundaries move towards the droplet center; droplet frozen"
            );
            for (index, _) in inflow {
                self.boundaries[index].set_flow_rate(0.0);
            }
        } else if !inflow.is_empty() && !outflow.is_empty() {
            let q_average = (q_inflow + q_outflow) / 2.0;
            for (index, flow_rate) in outflow {
                self.boundaries[index].set_flow_rate(slip_factor * q_average * flow_rate / q_outflow);
            }
            for (index, flow_rate) in inflow {
                self.boundaries[index].set_flow_rate(slip_factor * q_average * flow_rate / q_inflow);
            }
        }

        Ok(())
    }

    /// Total droplet volume reconstructed from boundary positions and
    /// fully-occupied channels (m^3). Used by conservation checks.
    pub fn occupied_volume(&self, chip: &Chip) -> ChipResult<f64> {
        if self.is_inside_single_channel() {
            let channel = chip.channel(self.boundaries[0].channel())?;
            Ok(self.boundaries[0].volume_on_reference_side(channel)
                + self.boundaries[1].volume_on_reference_side(channel)
                - channel.volume())
        } else {
            let mut volume = 0.0;
            for boundary in &self.boundaries {
                let channel = chip.channel(boundary.channel())?;
                volume += boundary.volume_on_reference_side(channel);
            }
            for &channel_id in &self.fully_occupied {
                volume += chip.channel(channel_id)?.volume();
            }
            Ok(volume)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryState;
    use mf_chip::ChannelKind;

    fn two_channel_chip() -> (Chip, EdgeId, EdgeId) {
        let mut chip = Chip::new();
        let c1 = chip
            .add_channel(0, 1, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal)
            .unwrap();
        let c2 = chip
            .add_channel(1, 2, 30e-6, 100e-6, 1000e-6, ChannelKind::Normal)
            .unwrap();
        chip.channel_mut(c1).unwrap().set_channel_resistance(1.0);
        chip.channel_mut(c2).unwrap().set_channel_resistance(1.0);
        (chip, c1, c2)
    }

    #[test]
    fn single_channel_detection() {
        let (_, c1, c2) = two_channel_chip();
        let mut droplet = Droplet::new(0, 4.5e-13, 0);
        droplet.add_boundary(Boundary::new(c1, 0.4, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c1, 0.6, true, BoundaryState::Normal));
        assert!(droplet.is_inside_single_channel());
        assert!(!droplet.is_at_bifurcation());

        // spread the droplet over two channels
        droplet.boundaries_mut()[1].position_mut().set_channel(c2);
        assert!(!droplet.is_inside_single_channel());
        assert!(droplet.is_at_bifurcation());
    }

    #[test]
    fn flow_redistribution_averages_unbalanced_flows() {
        let (mut chip, c1, c2) = two_channel_chip();
        // 3e-11 into the droplet through c1, 2e-11 out through c2
        chip.set_node_pressure(0, 5e-11);
        chip.set_node_pressure(1, 2e-11);
        chip.set_node_pressure(2, 0.0);

        let mut droplet = Droplet::new(0, 4.5e-13, 0);
        // tail in c1 (interior towards node1), head in c2 (towards node0)
        droplet.add_boundary(Boundary::new(c1, 0.8, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c2, 0.2, true, BoundaryState::Normal));

        droplet.update_boundary_flow_rates(&chip, 1.28).unwrap();

        let q_avg = (3e-11 + 2e-11) / 2.0;
        let tail = droplet.boundaries()[0].flow_rate();
        let head = droplet.boundaries()[1].flow_rate();
        assert!((tail + 1.28 * q_avg).abs() < 1e-24, "tail inflow: {tail}");
        assert!((head - 1.28 * q_avg).abs() < 1e-24, "head outflow: {head}");
    }

    #[test]
    fn only_inflow_freezes_droplet() {
        let (mut chip, c1, c2) = two_channel_chip();
        // both channel flows converge on node 1
        chip.set_node_pressure(0, 1e-11);
        chip.set_node_pressure(1, 0.0);
        chip.set_node_pressure(2, 1e-11);

        let mut droplet = Droplet::new(0, 4.5e-13, 0);
        droplet.add_boundary(Boundary::new(c1, 0.8, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c2, 0.2, true, BoundaryState::Normal));

        droplet.update_boundary_flow_rates(&chip, 1.28).unwrap();
        assert_eq!(droplet.boundaries()[0].flow_rate(), 0.0);
        assert_eq!(droplet.boundaries()[1].flow_rate(), 0.0);
    }

    #[test]
    fn single_channel_resistance_contribution() {
        let (mut chip, c1, _) = two_channel_chip();
        let model = crate::resistance::TestModel;

        let mut droplet = Droplet::new(0, 4.5e-13, 0);
        droplet.add_boundary(Boundary::new(c1, 0.425, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c1, 0.575, true, BoundaryState::Normal));

        droplet.add_resistances(&mut chip, &model).unwrap();
        let channel = chip.channel(c1).unwrap();
        // volume inside the channel is the droplet volume itself
        let expected = 3.0 * channel.width() * channel.height() * 4.5e-13;
        assert!((channel.droplet_resistance() - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn spanning_droplet_contributes_per_channel() {
        let (mut chip, c1, c2) = two_channel_chip();
        let model = crate::resistance::TestModel;

        let mut droplet = Droplet::new(0, 4e-12, 0);
        droplet.add_boundary(Boundary::new(c1, 0.75, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c2, 0.25, true, BoundaryState::Normal));

        droplet.add_resistances(&mut chip, &model).unwrap();
        let ch1 = chip.channel(c1).unwrap();
        let ch2 = chip.channel(c2).unwrap();
        let area = ch1.width() * ch1.height();
        assert!((ch1.droplet_resistance() - 3.0 * area * 0.25 * ch1.volume()).abs() < 1e-30);
        assert!((ch2.droplet_resistance() - 3.0 * area * 0.25 * ch2.volume()).abs() < 1e-30);
    }

    #[test]
    fn occupied_volume_matches_droplet_volume() {
        let (chip, c1, c2) = two_channel_chip();
        let channel_volume = chip.channel(c1).unwrap().volume();

        let mut droplet = Droplet::new(0, 0.5 * channel_volume, 0);
        droplet.add_boundary(Boundary::new(c1, 0.9, false, BoundaryState::Normal));
        droplet.add_boundary(Boundary::new(c2, 0.4, true, BoundaryState::Normal));
        let volume = droplet.occupied_volume(&chip).unwrap();
        assert!((volume - 0.5 * channel_volume).abs() / volume < 1e-12);
    }
}
