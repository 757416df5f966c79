//! Public builder facade.

use mf_chip::{ChannelKind, Chip};
use mf_core::{DropletId, EdgeId, FluidId, NodeId};
use mf_results::SimulationResult;

use crate::error::SimResult;
use crate::resistance::ResistanceModelKind;
use crate::simulation::Simulation;

/// Builder-style front end owning the chip and the simulation.
///
/// Configuration errors are reported synchronously by the builder calls;
/// `simulate` runs the event loop to quiescence.
///
/// ```
/// use mf_sim::Simulator;
///
/// let mut sim = Simulator::new();
/// let pump = sim.add_flow_rate_pump(-1, 0, 3e-11);
/// let c1 = sim.add_channel(0, -1, 30e-6, 100e-6, 1000e-6).unwrap();
/// sim.add_sink(-1);
/// sim.add_ground(-1);
/// let oil = sim.add_fluid(1e-3, 1e3, 0.0);
/// sim.set_continuous_phase(oil).unwrap();
/// sim.check_chip_validity().unwrap();
/// let result = sim.simulate().unwrap();
/// assert_eq!(result.states.len(), 1);
/// # let _ = (pump, c1);
/// ```
#[derive(Debug, Default)]
pub struct Simulator {
    chip: Chip,
    simulation: Simulation,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the chip (carried into results).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.chip.set_name(name);
    }

    /// Add a normal channel; dimensions in m, all positive.
    pub fn add_channel(
        &mut self,
        node0: NodeId,
        node1: NodeId,
        height: f64,
        width: f64,
        length: f64,
    ) -> SimResult<EdgeId> {
        Ok(self
            .chip
            .add_channel(node0, node1, height, width, length, ChannelKind::Normal)?)
    }

    /// Add a bypass channel: carries continuous phase but never admits a
    /// droplet boundary.
    pub fn add_bypass_channel(
        &mut self,
        node0: NodeId,
        node1: NodeId,
        height: f64,
        width: f64,
        length: f64,
    ) -> SimResult<EdgeId> {
        Ok(self
            .chip
            .add_channel(node0, node1, height, width, length, ChannelKind::Bypass)?)
    }

    /// Add a fixed-flow pump driving `flow_rate` m^3/s from node0 to
    /// node1.
    pub fn add_flow_rate_pump(&mut self, node0: NodeId, node1: NodeId, flow_rate: f64) -> EdgeId {
        self.chip.add_flow_rate_pump(node0, node1, flow_rate)
    }

    /// Add a fixed-pressure pump with `pressure` Pa rise from node0 to
    /// node1.
    pub fn add_pressure_pump(&mut self, node0: NodeId, node1: NodeId, pressure: f64) -> EdgeId {
        self.chip.add_pressure_pump(node0, node1, pressure)
    }

    pub fn add_sink(&mut self, node_id: NodeId) {
        self.chip.add_sink(node_id);
    }

    pub fn add_ground(&mut self, node_id: NodeId) {
        self.chip.add_ground(node_id);
    }

    /// Register a fluid (viscosity Pa s, density kg/m^3, concentration in
    /// [0, 1]).
    pub fn add_fluid(&mut self, viscosity: f64, density: f64, concentration: f64) -> FluidId {
        self.simulation.add_fluid(viscosity, density, concentration)
    }

    /// Select the carrier fluid. Required before `simulate`.
    pub fn set_continuous_phase(&mut self, fluid_id: FluidId) -> SimResult<()> {
        self.simulation.set_continuous_phase(fluid_id)
    }

    /// Upper bound for the adaptive time step in s; 0 disables it.
    pub fn set_maximal_adaptive_time_step(&mut self, time_step: f64) {
        self.simulation.set_maximal_adaptive_time_step(time_step);
    }

    pub fn set_resistance_model(&mut self, model: ResistanceModelKind) {
        self.simulation.set_resistance_model(model);
    }

    pub fn set_slip_factor(&mut self, slip_factor: f64) {
        self.simulation.set_slip_factor(slip_factor);
    }

    pub fn set_merging_enabled(&mut self, enabled: bool) {
        self.simulation.set_merging_enabled(enabled);
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.simulation.set_max_iterations(max_iterations);
    }

    /// Register a droplet and schedule its injection at `time` into the
    /// channel at the given relative position.
    pub fn add_droplet(
        &mut self,
        fluid_id: FluidId,
        volume: f64,
        time: f64,
        channel_id: EdgeId,
        position: f64,
    ) -> SimResult<DropletId> {
        let droplet_id = self.simulation.add_droplet(fluid_id, volume)?;
        self.simulation
            .add_injection(&self.chip, droplet_id, time, channel_id, position)?;
        Ok(droplet_id)
    }

    /// Check that every node and channel reaches a ground node via
    /// non-cloggable channels.
    pub fn check_chip_validity(&self) -> SimResult<()> {
        Ok(self.chip.check_validity()?)
    }

    /// Run the simulation to quiescence (or to the iteration cap).
    pub fn simulate(&mut self) -> SimResult<SimulationResult> {
        self.simulation.simulate(&mut self.chip)
    }

    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }
}
