//! Fluids.

use mf_core::FluidId;

/// A fluid phase.
///
/// Fluids are append-only: mixing two fluids registers a new fluid that
/// records its parents; existing entries are never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Fluid {
    id: FluidId,
    pub name: String,
    /// Viscosity in Pa s.
    viscosity: f64,
    /// Density in kg/m^3.
    density: f64,
    /// Concentration in [0, 1].
    concentration: f64,
    /// Parent fluid ids when created by mixing.
    mixed_from: Vec<FluidId>,
}

impl Fluid {
    pub fn new(id: FluidId, viscosity: f64, density: f64, concentration: f64) -> Self {
        Self {
            id,
            name: String::new(),
            viscosity,
            density,
            concentration,
            mixed_from: Vec::new(),
        }
    }

    pub fn id(&self) -> FluidId {
        self.id
    }

    pub fn viscosity(&self) -> f64 {
        self.viscosity
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn concentration(&self) -> f64 {
        self.concentration
    }

    pub fn mixed_from(&self) -> &[FluidId] {
        &self.mixed_from
    }

    pub fn add_parent(&mut self, fluid_id: FluidId) {
        self.mixed_from.push(fluid_id);
    }
}
