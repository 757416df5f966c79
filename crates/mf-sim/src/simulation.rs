//! The discrete-event simulation loop.
//!
//! Per iteration:
//! 1. apply droplet contributions to channel resistances
//! 2. solve the nodal analysis (node pressures, pump flow rates)
//! 3. redistribute boundary flow rates per droplet (volume conservation)
//! 4. record a state
//! 5. enumerate candidate events and pick the earliest by (time, priority)
//! 6. advance all boundaries to the event time
//! 7. fire the single winning event
//!
//! The loop terminates when no events remain, or surfaces
//! `IterationLimit` with the partial result once the cap is hit.

use std::collections::BTreeMap;

use mf_chip::{ChannelKind, ChannelPosition, Chip};
use mf_core::{DropletId, EdgeId, FluidId, InjectionId, NodeId};
use mf_results as results;
use mf_results::SimulationResult;
use mf_solver::{Conductor, FlowSource, PressureSource, solve_network};
use tracing::{debug, warn};

use crate::boundary::{Boundary, BoundaryState};
use crate::droplet::{Droplet, DropletState};
use crate::error::{SimError, SimResult};
use crate::events::{Event, sort_events};
use crate::fluid::Fluid;
use crate::injection::Injection;
use crate::resistance::{RectangularModel, ResistanceModel, ResistanceModelKind, TestModel};

/// Default cap on event-loop iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 1_000_000;

/// Droplets move faster than the mean continuous-phase velocity.
pub const DEFAULT_SLIP_FACTOR: f64 = 1.28;

/// Owns fluids, droplets and injections and runs the event loop against a
/// chip. All ids are monotonic and never reused.
#[derive(Debug)]
pub struct Simulation {
    fluids: BTreeMap<FluidId, Fluid>,
    droplets: BTreeMap<DropletId, Droplet>,
    injections: BTreeMap<InjectionId, Injection>,
    continuous_phase: Option<FluidId>,
    resistance_model: ResistanceModelKind,
    /// Upper bound for the adaptive TimeStep event; 0 disables it.
    maximal_adaptive_time_step: f64,
    slip_factor: f64,
    merging_enabled: bool,
    max_iterations: usize,
    current_time: f64,
    droplets_at_bifurcation: bool,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            fluids: BTreeMap::new(),
            droplets: BTreeMap::new(),
            injections: BTreeMap::new(),
            continuous_phase: None,
            resistance_model: ResistanceModelKind::default(),
            maximal_adaptive_time_step: 0.0,
            slip_factor: DEFAULT_SLIP_FACTOR,
            merging_enabled: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            current_time: 0.0,
            droplets_at_bifurcation: false,
        }
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    // --- registries -----------------------------------------------------

    /// Register a fluid (viscosity in Pa s, density in kg/m^3,
    /// concentration in [0, 1]).
    pub fn add_fluid(&mut self, viscosity: f64, density: f64, concentration: f64) -> FluidId {
        let id = self.fluids.len();
        self.fluids.insert(id, Fluid::new(id, viscosity, density, concentration));
        id
    }

    pub fn fluid(&self, fluid_id: FluidId) -> SimResult<&Fluid> {
        self.fluids.get(&fluid_id).ok_or(SimError::UnknownFluid(fluid_id))
    }

    /// Register a droplet of the given fluid and volume (m^3).
    pub fn add_droplet(&mut self, fluid_id: FluidId, volume: f64) -> SimResult<DropletId> {
        self.fluid(fluid_id)?;
        let id = self.droplets.len();
        self.droplets.insert(id, Droplet::new(id, volume, fluid_id));
        Ok(id)
    }

    pub fn droplet(&self, droplet_id: DropletId) -> SimResult<&Droplet> {
        self.droplets
            .get(&droplet_id)
            .ok_or(SimError::UnknownDroplet(droplet_id))
    }

    pub fn droplet_mut(&mut self, droplet_id: DropletId) -> SimResult<&mut Droplet> {
        self.droplets
            .get_mut(&droplet_id)
            .ok_or(SimError::UnknownDroplet(droplet_id))
    }

    /// Schedule a droplet injection. The droplet must fit the channel and
    /// both of its interfaces must lie inside the channel.
    pub fn add_injection(
        &mut self,
        chip: &Chip,
        droplet_id: DropletId,
        time: f64,
        channel_id: EdgeId,
        position: f64,
    ) -> SimResult<InjectionId> {
        let droplet = self.droplet(droplet_id)?;
        let channel = chip.channel(channel_id)?;

        let relative_length = droplet.volume() / channel.volume();
        if relative_length >= 1.0 {
            return Err(SimError::InvalidInjection {
                droplet: droplet_id,
                channel: channel_id,
                reason: "channel cannot fully contain the droplet",
            });
        }
        let tail = position - relative_length / 2.0;
        let head = position + relative_length / 2.0;
        if tail < 0.0 || head > 1.0 {
            return Err(SimError::InvalidInjection {
                droplet: droplet_id,
                channel: channel_id,
                reason: "droplet head and tail must lie inside the channel",
            });
        }

        let id = self.injections.len();
        self.injections.insert(
            id,
            Injection::new(id, droplet_id, time, ChannelPosition::new(channel_id, position)),
        );
        Ok(id)
    }

    // --- configuration --------------------------------------------------

    pub fn set_continuous_phase(&mut self, fluid_id: FluidId) -> SimResult<()> {
        self.fluid(fluid_id)?;
        self.continuous_phase = Some(fluid_id);
        Ok(())
    }

    pub fn set_resistance_model(&mut self, model: ResistanceModelKind) {
        self.resistance_model = model;
    }

    /// Upper bound for the adaptive TimeStep event in s; 0 disables it.
    pub fn set_maximal_adaptive_time_step(&mut self, time_step: f64) {
        self.maximal_adaptive_time_step = time_step;
    }

    pub fn set_slip_factor(&mut self, slip_factor: f64) {
        self.slip_factor = slip_factor;
    }

    pub fn set_merging_enabled(&mut self, enabled: bool) {
        self.merging_enabled = enabled;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    // --- the loop -------------------------------------------------------

    /// Run the simulation to quiescence.
    pub fn simulate(&mut self, chip: &mut Chip) -> SimResult<SimulationResult> {
        let model = self.make_resistance_model()?;

        // static channel resistances
        let static_resistances: Vec<(EdgeId, f64)> = chip
            .channels()
            .values()
            .map(|channel| (channel.id(), model.channel_resistance(channel)))
            .collect();
        for (channel_id, resistance) in static_resistances {
            let channel = chip.channel_mut(channel_id)?;
            channel.set_channel_resistance(resistance);
            channel.set_droplet_resistance(0.0);
        }

        self.current_time = 0.0;
        self.droplets_at_bifurcation = false;

        let mut result = SimulationResult::default();
        self.store_parameters(chip, &mut result)?;

        let mut state_id = 0;
        for _ in 0..self.max_iterations {
            self.update_droplet_resistances(chip, model.as_ref())?;
            self.solve_pressures(chip)?;
            self.update_droplets(chip)?;
            self.record_state(chip, &mut result, state_id)?;
            state_id += 1;

            let mut events = self.compute_events(chip)?;
            sort_events(&mut events);
            let Some(event) = events.first().copied() else {
                return Ok(result);
            };

            debug!(time = self.current_time, ?event, "firing event");
            self.current_time += event.time();
            self.advance_boundaries(chip, event.time())?;
            self.perform_event(chip, event)?;
        }

        warn!(
            iterations = self.max_iterations,
            "iteration limit reached before quiescence"
        );
        Err(SimError::IterationLimit {
            iterations: self.max_iterations,
            partial: Box::new(result),
        })
    }

    fn make_resistance_model(&self) -> SimResult<Box<dyn ResistanceModel>> {
        let continuous = self.continuous_phase.ok_or(SimError::MissingContinuousPhase)?;
        let viscosity = self.fluid(continuous)?.viscosity();
        Ok(match self.resistance_model {
            ResistanceModelKind::Rectangular => Box::new(RectangularModel::new(viscosity)),
            ResistanceModelKind::Test => Box::new(TestModel),
        })
    }

    fn update_droplet_resistances(
        &self,
        chip: &mut Chip,
        model: &dyn ResistanceModel,
    ) -> SimResult<()> {
        for channel in chip.channels_mut().values_mut() {
            channel.set_droplet_resistance(0.0);
        }
        for droplet in self.droplets.values() {
            // trapped droplets still obstruct their channels
            if matches!(droplet.state(), DropletState::Injection | DropletState::Sink) {
                continue;
            }
            droplet.add_resistances(chip, model)?;
        }
        Ok(())
    }

    /// Build the capability views, solve, and write back pressures and
    /// pressure-pump flow rates.
    fn solve_pressures(&self, chip: &mut Chip) -> SimResult<()> {
        let grounds = chip.ground_ids()?.clone();

        let conductors: Vec<Conductor> = chip
            .channels()
            .values()
            .map(|channel| Conductor {
                node0: channel.node0(),
                node1: channel.node1(),
                conductance: 1.0 / channel.resistance(),
            })
            .collect();

        let mut pump_ids: Vec<EdgeId> = Vec::new();
        let pressure_sources: Vec<PressureSource> = chip
            .pressure_pumps()
            .values()
            .map(|pump| {
                pump_ids.push(pump.id());
                PressureSource {
                    node0: pump.node0(),
                    node1: pump.node1(),
                    pressure: pump.pressure(),
                }
            })
            .collect();

        let flow_sources: Vec<FlowSource> = chip
            .flow_rate_pumps()
            .values()
            .map(|pump| FlowSource {
                node0: pump.node0(),
                node1: pump.node1(),
                flow_rate: pump.flow_rate(),
            })
            .collect();

        let solution = solve_network(&grounds, &conductors, &pressure_sources, &flow_sources)?;

        let node_ids: Vec<NodeId> = chip.nodes().keys().copied().collect();
        for node_id in node_ids {
            chip.set_node_pressure(node_id, solution.pressure(node_id));
        }
        for (pump_id, flow_rate) in pump_ids.iter().zip(&solution.source_flow_rates) {
            if let Some(pump) = chip.pressure_pumps_mut().get_mut(pump_id) {
                pump.set_flow_rate(*flow_rate);
            }
        }
        Ok(())
    }

    /// Redistribute boundary flow rates for every droplet in the network.
    fn update_droplets(&mut self, chip: &Chip) -> SimResult<()> {
        let mut at_bifurcation = false;
        for droplet in self.droplets.values_mut() {
            if droplet.state() != DropletState::Network {
                continue;
            }
            if droplet.is_at_bifurcation() {
                at_bifurcation = true;
            }
            droplet.update_boundary_flow_rates(chip, self.slip_factor)?;
        }
        self.droplets_at_bifurcation = at_bifurcation;
        Ok(())
    }

    /// Find a droplet occupying the given node, excluding the asking
    /// droplet. Only droplets spanning more than one channel can sit on a
    /// node.
    fn droplet_at_node(
        &self,
        chip: &Chip,
        node: NodeId,
        exclude: DropletId,
    ) -> SimResult<Option<DropletId>> {
        for (&droplet_id, droplet) in &self.droplets {
            if droplet_id == exclude
                || droplet.state() != DropletState::Network
                || droplet.is_inside_single_channel()
            {
                continue;
            }
            if !droplet.connected_boundary_indices(chip, node, None)?.is_empty()
                || !droplet
                    .connected_fully_occupied_channels(chip, node)?
                    .is_empty()
            {
                return Ok(Some(droplet_id));
            }
        }
        Ok(None)
    }

    fn compute_events(&self, chip: &Chip) -> SimResult<Vec<Event>> {
        let mut events = Vec::new();

        // pending injections
        for (&injection_id, injection) in &self.injections {
            let droplet = self.droplet(injection.droplet())?;
            if droplet.state() == DropletState::Injection {
                events.push(Event::Injection {
                    time: injection.time() - self.current_time,
                    injection: injection_id,
                });
            }
        }

        // boundary events, plus per-channel candidates for channel merges
        struct MergeCandidate {
            droplet: DropletId,
            boundary: usize,
            /// Velocity in m/s, positive from node0 towards node1.
            velocity: f64,
            /// Absolute position in m.
            position: f64,
        }
        let mut per_channel: BTreeMap<EdgeId, Vec<MergeCandidate>> = BTreeMap::new();

        for (&droplet_id, droplet) in &self.droplets {
            if droplet.state() != DropletState::Network {
                continue;
            }
            for (index, boundary) in droplet.boundaries().iter().enumerate() {
                let channel = chip.channel(boundary.channel())?;

                // the sign of the boundary flow rate selects the event
                // kind; a parked boundary (zero flow) triggers nothing
                if boundary.flow_rate() < 0.0 {
                    events.push(Event::BoundaryTail {
                        time: boundary.fire_time(channel),
                        droplet: droplet_id,
                        boundary: index,
                    });
                } else if boundary.flow_rate() > 0.0 {
                    let time = boundary.fire_time(channel);
                    let merge_target = if self.merging_enabled {
                        self.droplet_at_node(chip, boundary.opposite_node(channel), droplet_id)?
                    } else {
                        None
                    };
                    match merge_target {
                        Some(droplet1) => events.push(Event::MergeBifurcation {
                            time,
                            droplet0: droplet_id,
                            boundary0: index,
                            droplet1,
                        }),
                        None => events.push(Event::BoundaryHead {
                            time,
                            droplet: droplet_id,
                            boundary: index,
                        }),
                    }
                }

                if self.merging_enabled {
                    let signed = if boundary.is_volume_towards_node0() {
                        boundary.flow_rate()
                    } else {
                        -boundary.flow_rate()
                    };
                    per_channel.entry(boundary.channel()).or_default().push(MergeCandidate {
                        droplet: droplet_id,
                        boundary: index,
                        velocity: signed / channel.area(),
                        position: boundary.position().absolute_position(channel),
                    });
                }
            }
        }

        // boundaries of different droplets colliding inside one channel
        for (&channel_id, candidates) in &per_channel {
            let length = chip.channel(channel_id)?.length();
            for i in 0..candidates.len() {
                let a = &candidates[i];
                for b in &candidates[(i + 1)..] {
                    if a.droplet == b.droplet {
                        continue;
                    }
                    // equal velocities never meet
                    if a.velocity == b.velocity {
                        continue;
                    }
                    let time = (b.position - a.position) / (a.velocity - b.velocity);
                    let merge_position = (a.position + a.velocity * time) / length;
                    if time < 0.0 || !(0.0..=1.0).contains(&merge_position) {
                        continue;
                    }
                    events.push(Event::MergeChannel {
                        time,
                        droplet0: a.droplet,
                        boundary0: a.boundary,
                        droplet1: b.droplet,
                        boundary1: b.boundary,
                    });
                }
            }
        }

        // adaptive time step while droplets sit at bifurcations
        if self.droplets_at_bifurcation && self.maximal_adaptive_time_step > 0.0 {
            events.push(Event::TimeStep {
                time: self.maximal_adaptive_time_step,
            });
        }

        Ok(events)
    }

    fn advance_boundaries(&mut self, chip: &Chip, time_step: f64) -> SimResult<()> {
        for droplet in self.droplets.values_mut() {
            if droplet.state() != DropletState::Network {
                continue;
            }
            for boundary in droplet.boundaries_mut() {
                let channel = chip.channel(boundary.channel())?;
                boundary.advance(channel, time_step);
            }
        }
        Ok(())
    }

    /// The single dispatcher: one branch per event kind.
    fn perform_event(&mut self, chip: &Chip, event: Event) -> SimResult<()> {
        match event {
            Event::Injection { injection, .. } => self.perform_injection(chip, injection),
            Event::BoundaryHead { droplet, boundary, .. } => {
                self.perform_boundary_head(chip, droplet, boundary)
            }
            Event::BoundaryTail { droplet, boundary, .. } => {
                self.perform_boundary_tail(chip, droplet, boundary)
            }
            Event::MergeChannel {
                droplet0,
                boundary0,
                droplet1,
                boundary1,
                ..
            } => self.perform_merge_channel(droplet0, boundary0, droplet1, boundary1),
            Event::MergeBifurcation {
                droplet0,
                boundary0,
                droplet1,
                ..
            } => self.perform_merge_bifurcation(droplet0, boundary0, droplet1),
            // only forces a re-solve of the flow state
            Event::TimeStep { .. } => Ok(()),
        }
    }

    fn perform_injection(&mut self, chip: &Chip, injection_id: InjectionId) -> SimResult<()> {
        let injection = *self
            .injections
            .get(&injection_id)
            .ok_or(SimError::UnknownInjection(injection_id))?;
        let channel = chip.channel(injection.position().channel())?;
        let droplet = self
            .droplets
            .get_mut(&injection.droplet())
            .ok_or(SimError::UnknownDroplet(injection.droplet()))?;

        let relative_length = droplet.volume() / channel.volume();
        let center = injection.position().position();
        // the interior lies towards node1 from the tail and towards node0
        // from the head
        droplet.add_boundary(Boundary::new(
            channel.id(),
            center - relative_length / 2.0,
            false,
            BoundaryState::Normal,
        ));
        droplet.add_boundary(Boundary::new(
            channel.id(),
            center + relative_length / 2.0,
            true,
            BoundaryState::Normal,
        ));
        droplet.set_state(DropletState::Network);
        Ok(())
    }

    fn perform_boundary_head(
        &mut self,
        chip: &Chip,
        droplet_id: DropletId,
        boundary_index: usize,
    ) -> SimResult<()> {
        let droplet = self
            .droplets
            .get_mut(&droplet_id)
            .ok_or(SimError::UnknownDroplet(droplet_id))?;

        let (channel_id, node) = {
            let boundary = droplet.boundary(boundary_index).ok_or(SimError::Invariant {
                what: "head event references a missing boundary",
            })?;
            let channel = chip.channel(boundary.channel())?;
            (channel.id(), boundary.opposite_node(channel))
        };

        // a head reaching a sink removes the droplet from the network
        if chip.is_sink(node) {
            droplet.set_state(DropletState::Sink);
            return Ok(());
        }

        // choose the normal channel with the strongest outflow away from
        // the node
        let mut next: Option<(EdgeId, f64)> = None;
        for &candidate_id in chip.channels_at_node(node) {
            if candidate_id == channel_id {
                continue;
            }
            let candidate = chip.channel(candidate_id)?;
            if candidate.kind() != ChannelKind::Normal {
                continue;
            }
            let flow_rate = if candidate.node0() == node {
                chip.channel_flow_rate(candidate)
            } else {
                -chip.channel_flow_rate(candidate)
            };
            if flow_rate <= 0.0 {
                continue;
            }
            if next.map_or(true, |(_, best)| flow_rate > best) {
                next = Some((candidate_id, flow_rate));
            }
        }

        let Some((next_id, _)) = next else {
            // nowhere to go: park until the flow field changes
            if let Some(boundary) = droplet.boundary_mut(boundary_index) {
                boundary.park(BoundaryState::WaitOutflow);
            }
            return Ok(());
        };

        // a droplet spanning several channels leaves its old channel
        // fully occupied behind the head
        if !droplet.is_inside_single_channel() {
            droplet.add_fully_occupied_channel(channel_id);
        }

        let next_channel = chip.channel(next_id)?;
        let enters_at_node0 = next_channel.node0() == node;
        let boundary = droplet.boundary_mut(boundary_index).ok_or(SimError::Invariant {
            what: "head event references a missing boundary",
        })?;
        boundary.position_mut().set_channel(next_id);
        boundary
            .position_mut()
            .set_position(if enters_at_node0 { 0.0 } else { 1.0 });
        boundary.set_volume_towards_node0(enters_at_node0);
        boundary.set_state(BoundaryState::Normal);
        Ok(())
    }

    fn perform_boundary_tail(
        &mut self,
        chip: &Chip,
        droplet_id: DropletId,
        boundary_index: usize,
    ) -> SimResult<()> {
        let droplet = self
            .droplets
            .get_mut(&droplet_id)
            .ok_or(SimError::UnknownDroplet(droplet_id))?;

        let reference_node = {
            let boundary = droplet.boundary(boundary_index).ok_or(SimError::Invariant {
                what: "tail event references a missing boundary",
            })?;
            let channel = chip.channel(boundary.channel())?;
            boundary.reference_node(channel)
        };

        let connected = droplet.connected_boundary_indices(chip, reference_node, Some(boundary_index))?;
        let occupied = droplet.connected_fully_occupied_channels(chip, reference_node)?;

        if connected.len() + occupied.len() == 1 {
            // exactly one droplet fragment continues behind the node: the
            // tail steps into it
            let next_id = match connected.first() {
                Some(&other) => droplet
                    .boundary(other)
                    .map(Boundary::channel)
                    .ok_or(SimError::Invariant {
                        what: "connected boundary index out of range",
                    })?,
                None => occupied[0],
            };
            let next_channel = chip.channel(next_id)?;
            let enters_at_node0 = next_channel.node0() == reference_node;
            {
                let boundary = droplet.boundary_mut(boundary_index).ok_or(SimError::Invariant {
                    what: "tail event references a missing boundary",
                })?;
                boundary.position_mut().set_channel(next_id);
                boundary
                    .position_mut()
                    .set_position(if enters_at_node0 { 0.0 } else { 1.0 });
                // the interior now lies away from the node the tail left
                boundary.set_volume_towards_node0(!enters_at_node0);
                boundary.set_state(BoundaryState::Normal);
            }
            if occupied.len() == 1 {
                droplet.remove_fully_occupied_channel(next_id);
            }
        } else {
            // several fragments stay connected through the node; this
            // interface vanishes
            droplet.remove_boundary(boundary_index);
        }
        Ok(())
    }

    fn perform_merge_channel(
        &mut self,
        droplet0: DropletId,
        boundary0: usize,
        droplet1: DropletId,
        boundary1: usize,
    ) -> SimResult<()> {
        let merged_id = self.merge_droplets(droplet0, droplet1)?;

        let (boundaries0, occupied0) = {
            let droplet = self.droplet(droplet0)?;
            (droplet.boundaries().to_vec(), droplet.fully_occupied_channels().to_vec())
        };
        let (boundaries1, occupied1) = {
            let droplet = self.droplet(droplet1)?;
            (droplet.boundaries().to_vec(), droplet.fully_occupied_channels().to_vec())
        };

        {
            let merged = self.droplets.get_mut(&merged_id).ok_or(SimError::Invariant {
                what: "merged droplet missing from registry",
            })?;
            // the two colliding interfaces vanish into the interior
            for (index, boundary) in boundaries0.iter().enumerate() {
                if index != boundary0 {
                    merged.add_boundary(*boundary);
                }
            }
            for (index, boundary) in boundaries1.iter().enumerate() {
                if index != boundary1 {
                    merged.add_boundary(*boundary);
                }
            }
            for channel_id in occupied0.into_iter().chain(occupied1) {
                merged.add_fully_occupied_channel(channel_id);
            }
            merged.set_state(DropletState::Network);
        }

        self.retire(droplet0)?;
        self.retire(droplet1)
    }

    fn perform_merge_bifurcation(
        &mut self,
        droplet0: DropletId,
        boundary0: usize,
        droplet1: DropletId,
    ) -> SimResult<()> {
        let merged_id = self.merge_droplets(droplet0, droplet1)?;

        let (boundaries0, occupied0, was_single0) = {
            let droplet = self.droplet(droplet0)?;
            (
                droplet.boundaries().to_vec(),
                droplet.fully_occupied_channels().to_vec(),
                droplet.is_inside_single_channel(),
            )
        };
        let (boundaries1, occupied1) = {
            let droplet = self.droplet(droplet1)?;
            (droplet.boundaries().to_vec(), droplet.fully_occupied_channels().to_vec())
        };
        let advancing_channel = boundaries0
            .get(boundary0)
            .map(Boundary::channel)
            .ok_or(SimError::Invariant {
                what: "merge event references a missing boundary",
            })?;

        {
            let merged = self.droplets.get_mut(&merged_id).ok_or(SimError::Invariant {
                what: "merged droplet missing from registry",
            })?;
            // the advancing head dissolves into droplet1 at the node
            for (index, boundary) in boundaries0.iter().enumerate() {
                if index != boundary0 {
                    merged.add_boundary(*boundary);
                }
            }
            for channel_id in occupied0 {
                merged.add_fully_occupied_channel(channel_id);
            }
            for boundary in &boundaries1 {
                merged.add_boundary(*boundary);
            }
            for channel_id in occupied1 {
                merged.add_fully_occupied_channel(channel_id);
            }
            // the channel the head was leaving stays filled
            if !was_single0 {
                merged.add_fully_occupied_channel(advancing_channel);
            }
            merged.set_state(DropletState::Network);
        }

        self.retire(droplet0)?;
        self.retire(droplet1)
    }

    fn retire(&mut self, droplet_id: DropletId) -> SimResult<()> {
        self.droplet_mut(droplet_id)?.set_state(DropletState::Sink);
        Ok(())
    }

    // --- mixing ---------------------------------------------------------

    /// Mix two fluids by volume; mixing a fluid with itself is the
    /// identity.
    pub fn mix_fluids(
        &mut self,
        fluid0: FluidId,
        volume0: f64,
        fluid1: FluidId,
        volume1: f64,
    ) -> SimResult<FluidId> {
        if fluid0 == fluid1 {
            self.fluid(fluid0)?;
            return Ok(fluid0);
        }

        let (viscosity, density, concentration) = {
            let f0 = self.fluid(fluid0)?;
            let f1 = self.fluid(fluid1)?;
            let volume = volume0 + volume1;
            let ratio0 = volume0 / volume;
            let ratio1 = volume1 / volume;
            (
                ratio0 * f0.viscosity() + ratio1 * f1.viscosity(),
                ratio0 * f0.density() + ratio1 * f1.density(),
                ratio0 * f0.concentration() + ratio1 * f1.concentration(),
            )
        };

        let id = self.add_fluid(viscosity, density, concentration);
        let fluid = self.fluids.get_mut(&id).ok_or(SimError::Invariant {
            what: "freshly added fluid missing from registry",
        })?;
        fluid.add_parent(fluid0);
        fluid.add_parent(fluid1);
        Ok(id)
    }

    /// Merge two droplets into a new one carrying the mixed fluid;
    /// merging a droplet with itself is the identity.
    pub fn merge_droplets(&mut self, droplet0: DropletId, droplet1: DropletId) -> SimResult<DropletId> {
        if droplet0 == droplet1 {
            self.droplet(droplet0)?;
            return Ok(droplet0);
        }

        let (volume0, fluid0) = {
            let droplet = self.droplet(droplet0)?;
            (droplet.volume(), droplet.fluid())
        };
        let (volume1, fluid1) = {
            let droplet = self.droplet(droplet1)?;
            (droplet.volume(), droplet.fluid())
        };

        let fluid = self.mix_fluids(fluid0, volume0, fluid1, volume1)?;
        let id = self.add_droplet(fluid, volume0 + volume1)?;
        let merged = self.droplets.get_mut(&id).ok_or(SimError::Invariant {
            what: "freshly added droplet missing from registry",
        })?;
        merged.add_parent(droplet0);
        merged.add_parent(droplet1);
        Ok(id)
    }

    // --- result recording -----------------------------------------------

    fn store_parameters(&self, chip: &Chip, result: &mut SimulationResult) -> SimResult<()> {
        result.chip.name = chip.name().to_string();

        for channel in chip.channels().values() {
            result.chip.channels.insert(
                channel.id(),
                results::ChannelSummary {
                    id: channel.id(),
                    name: channel.name.clone(),
                    node0_id: channel.node0(),
                    node1_id: channel.node1(),
                    width: channel.width(),
                    height: channel.height(),
                    length: channel.length(),
                    kind: channel_kind_record(channel.kind()),
                },
            );
        }
        for pump in chip.flow_rate_pumps().values() {
            result.chip.flow_rate_pumps.insert(
                pump.id(),
                results::FlowRatePumpSummary {
                    id: pump.id(),
                    name: pump.name.clone(),
                    node0_id: pump.node0(),
                    node1_id: pump.node1(),
                    flow_rate: pump.flow_rate(),
                },
            );
        }
        for pump in chip.pressure_pumps().values() {
            result.chip.pressure_pumps.insert(
                pump.id(),
                results::PressurePumpSummary {
                    id: pump.id(),
                    name: pump.name.clone(),
                    node0_id: pump.node0(),
                    node1_id: pump.node1(),
                    pressure: pump.pressure(),
                },
            );
        }

        self.store_fluids_and_droplets(result);

        for injection in self.injections.values() {
            result.injections.insert(
                injection.id(),
                results::InjectionSummary {
                    id: injection.id(),
                    droplet_id: injection.droplet(),
                    time: injection.time(),
                    position: results::ChannelPositionRecord {
                        channel_id: injection.position().channel(),
                        position: injection.position().position(),
                    },
                },
            );
        }

        result.continuous_phase_id = self.continuous_phase.ok_or(SimError::MissingContinuousPhase)?;
        result.maximal_adaptive_time_step = self.maximal_adaptive_time_step;
        result.resistance_model = resistance_model_record(self.resistance_model);
        Ok(())
    }

    /// Fluids and droplets are append-only; registering them again after
    /// a merge only adds the new entries.
    fn store_fluids_and_droplets(&self, result: &mut SimulationResult) {
        for fluid in self.fluids.values() {
            result.fluids.entry(fluid.id()).or_insert_with(|| results::FluidSummary {
                id: fluid.id(),
                name: fluid.name.clone(),
                mixed_fluid_ids: fluid.mixed_from().to_vec(),
                viscosity: fluid.viscosity(),
                density: fluid.density(),
                concentration: fluid.concentration(),
            });
        }
        for droplet in self.droplets.values() {
            result.droplets.entry(droplet.id()).or_insert_with(|| results::DropletSummary {
                id: droplet.id(),
                name: droplet.name.clone(),
                merged_droplet_ids: droplet.merged_from().to_vec(),
                volume: droplet.volume(),
                fluid_id: droplet.fluid(),
            });
        }
    }

    fn record_state(
        &self,
        chip: &Chip,
        result: &mut SimulationResult,
        state_id: usize,
    ) -> SimResult<()> {
        self.store_fluids_and_droplets(result);

        let mut state = results::State::new(state_id, self.current_time);

        for (&node_id, node) in chip.nodes() {
            state.pressures.insert(node_id, node.pressure());
        }
        for channel in chip.channels().values() {
            state.flow_rates.insert(channel.id(), chip.channel_flow_rate(channel));
        }
        for pump in chip.flow_rate_pumps().values() {
            state.flow_rates.insert(pump.id(), pump.flow_rate());
        }
        for pump in chip.pressure_pumps().values() {
            state.flow_rates.insert(pump.id(), pump.flow_rate());
        }

        for (&droplet_id, droplet) in &self.droplets {
            let mut position = results::DropletPositionRecord {
                state: droplet_state_record(droplet.state()),
                boundaries: Vec::with_capacity(droplet.boundaries().len()),
                channel_ids: droplet.fully_occupied_channels().to_vec(),
            };
            for boundary in droplet.boundaries() {
                position.boundaries.push(results::BoundaryRecord {
                    position: results::ChannelPositionRecord {
                        channel_id: boundary.channel(),
                        position: boundary.position().position(),
                    },
                    volume_towards0: boundary.is_volume_towards_node0(),
                    flow_rate: boundary.flow_rate(),
                    state: boundary_state_record(boundary.state()),
                });
            }
            state.droplet_positions.insert(droplet_id, position);
        }

        result.states.push(state);
        Ok(())
    }
}

fn channel_kind_record(kind: ChannelKind) -> results::ChannelKind {
    match kind {
        ChannelKind::Normal => results::ChannelKind::Normal,
        ChannelKind::Bypass => results::ChannelKind::Bypass,
        ChannelKind::Cloggable => results::ChannelKind::Cloggable,
    }
}

fn droplet_state_record(state: DropletState) -> results::DropletState {
    match state {
        DropletState::Injection => results::DropletState::Injection,
        DropletState::Network => results::DropletState::Network,
        DropletState::Trapped => results::DropletState::Trapped,
        DropletState::Sink => results::DropletState::Sink,
    }
}

fn boundary_state_record(state: BoundaryState) -> results::BoundaryState {
    match state {
        BoundaryState::Normal => results::BoundaryState::Normal,
        BoundaryState::WaitInflow => results::BoundaryState::WaitInflow,
        BoundaryState::WaitOutflow => results::BoundaryState::WaitOutflow,
    }
}

fn resistance_model_record(kind: ResistanceModelKind) -> results::ResistanceModelKind {
    match kind {
        ResistanceModelKind::Rectangular => results::ResistanceModelKind::Rectangular,
        ResistanceModelKind::Test => results::ResistanceModelKind::Test,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_chip::ChannelKind;

    #[test]
    fn mix_fluids_is_volume_weighted() {
        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let f1 = sim.add_fluid(3e-3, 2e3, 1.0);

        let mixed = sim.mix_fluids(f0, 1.0e-12, f1, 3.0e-12).unwrap();
        let fluid = sim.fluid(mixed).unwrap();
        assert!((fluid.viscosity() - 2.5e-3).abs() < 1e-18);
        assert!((fluid.density() - 1.75e3).abs() < 1e-9);
        assert!((fluid.concentration() - 0.75).abs() < 1e-12);
        assert_eq!(fluid.mixed_from(), &[f0, f1]);
    }

    #[test]
    fn mixing_a_fluid_with_itself_is_identity() {
        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let mixed = sim.mix_fluids(f0, 1.0, f0, 2.0).unwrap();
        assert_eq!(mixed, f0);
        assert_eq!(sim.fluids.len(), 1);
    }

    #[test]
    fn merge_droplets_sums_volumes_and_records_parents() {
        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let f1 = sim.add_fluid(3e-3, 1e3, 0.0);
        let d0 = sim.add_droplet(f0, 1e-12).unwrap();
        let d1 = sim.add_droplet(f1, 1e-12).unwrap();

        let merged = sim.merge_droplets(d0, d1).unwrap();
        let droplet = sim.droplet(merged).unwrap();
        assert!((droplet.volume() - 2e-12).abs() < 1e-24);
        assert_eq!(droplet.merged_from(), &[d0, d1]);
        // equal volumes mix to the mean viscosity
        let fluid = sim.fluid(droplet.fluid()).unwrap();
        assert!((fluid.viscosity() - 2e-3).abs() < 1e-18);
    }

    #[test]
    fn merge_bifurcation_collects_fragments() {
        // droplet A straddles node 1 (tail in c1, head in c2); droplet B
        // advances its head through c3 into node 1
        let mut chip = Chip::new();
        let c1 = chip.add_channel(0, 1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();
        let c2 = chip.add_channel(1, 2, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();
        let c3 = chip.add_channel(3, 1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();

        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let a = sim.add_droplet(f0, 1e-12).unwrap();
        let b = sim.add_droplet(f0, 1e-12).unwrap();

        {
            let droplet = sim.droplet_mut(a).unwrap();
            droplet.add_boundary(Boundary::new(c1, 0.8, false, BoundaryState::Normal));
            droplet.add_boundary(Boundary::new(c2, 0.2, true, BoundaryState::Normal));
            droplet.set_state(DropletState::Network);
        }
        {
            let droplet = sim.droplet_mut(b).unwrap();
            droplet.add_boundary(Boundary::new(c3, 0.6, false, BoundaryState::Normal));
            droplet.add_boundary(Boundary::new(c3, 1.0, true, BoundaryState::Normal));
            droplet.set_state(DropletState::Network);
        }

        // droplet B's head (index 1) merges into droplet A at node 1
        sim.perform_merge_bifurcation(b, 1, a).unwrap();

        assert_eq!(sim.droplet(a).unwrap().state(), DropletState::Sink);
        assert_eq!(sim.droplet(b).unwrap().state(), DropletState::Sink);

        let merged_id = 2;
        let merged = sim.droplet(merged_id).unwrap();
        assert_eq!(merged.state(), DropletState::Network);
        // B's tail plus both of A's boundaries survive
        assert_eq!(merged.boundaries().len(), 3);
        // B was inside a single channel, so nothing becomes fully occupied
        assert!(merged.fully_occupied_channels().is_empty());
        assert!((merged.volume() - 2e-12).abs() < 1e-24);
        assert_eq!(merged.merged_from(), &[b, a]);
    }

    #[test]
    fn merge_bifurcation_fills_left_channel_of_spanning_droplet() {
        let mut chip = Chip::new();
        let c1 = chip.add_channel(0, 1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();
        let c2 = chip.add_channel(1, 2, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();
        let c3 = chip.add_channel(2, 3, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();

        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let a = sim.add_droplet(f0, 1e-12).unwrap();
        let b = sim.add_droplet(f0, 2e-12).unwrap();

        {
            // spanning droplet: tail in c1, head in c2 about to enter node 2
            let droplet = sim.droplet_mut(a).unwrap();
            droplet.add_boundary(Boundary::new(c1, 0.9, false, BoundaryState::Normal));
            droplet.add_boundary(Boundary::new(c2, 1.0, true, BoundaryState::Normal));
            droplet.set_state(DropletState::Network);
        }
        {
            // droplet B straddles node 2 into c3
            let droplet = sim.droplet_mut(b).unwrap();
            droplet.add_boundary(Boundary::new(c2, 0.7, false, BoundaryState::Normal));
            droplet.add_boundary(Boundary::new(c3, 0.3, true, BoundaryState::Normal));
            droplet.set_state(DropletState::Network);
        }

        sim.perform_merge_bifurcation(a, 1, b).unwrap();

        let merged = sim.droplet(2).unwrap();
        // A spanned two channels, so the channel its head was leaving
        // becomes fully occupied
        assert_eq!(merged.fully_occupied_channels(), &[c2]);
        assert_eq!(merged.boundaries().len(), 3);
    }

    #[test]
    fn injection_requires_fitting_droplet() {
        let mut chip = Chip::new();
        let c1 = chip.add_channel(0, 1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();

        let mut sim = Simulation::new();
        let f0 = sim.add_fluid(1e-3, 1e3, 0.0);
        let channel_volume = chip.channel(c1).unwrap().volume();

        // droplet as large as the channel can never fit
        let too_big = sim.add_droplet(f0, channel_volume).unwrap();
        let err = sim.add_injection(&chip, too_big, 0.0, c1, 0.5).unwrap_err();
        assert!(matches!(err, SimError::InvalidInjection { .. }));

        // droplet of half the channel volume injected too close to the end
        let tight = sim.add_droplet(f0, 0.5 * channel_volume).unwrap();
        let err = sim.add_injection(&chip, tight, 0.0, c1, 0.9).unwrap_err();
        assert!(matches!(err, SimError::InvalidInjection { .. }));

        // and fits in the middle
        assert!(sim.add_injection(&chip, tight, 0.0, c1, 0.5).is_ok());
    }

    #[test]
    fn simulate_without_continuous_phase_fails() {
        let mut chip = Chip::new();
        chip.add_channel(0, -1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal).unwrap();
        chip.add_ground(-1);

        let mut sim = Simulation::new();
        let err = sim.simulate(&mut chip).unwrap_err();
        assert!(matches!(err, SimError::MissingContinuousPhase));
    }
}
