//! Error types for simulation operations.

use mf_chip::ChipError;
use mf_core::{DropletId, EdgeId, FluidId, InjectionId};
use mf_results::SimulationResult;
use mf_solver::SolverError;
use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("No continuous phase set; call set_continuous_phase before simulate")]
    MissingContinuousPhase,

    #[error("Invalid injection of droplet {droplet} into channel {channel}: {reason}")]
    InvalidInjection {
        droplet: DropletId,
        channel: EdgeId,
        reason: &'static str,
    },

    #[error("Fluid with id {0} does not exist")]
    UnknownFluid(FluidId),

    #[error("Droplet with id {0} does not exist")]
    UnknownDroplet(DropletId),

    #[error("Injection with id {0} does not exist")]
    UnknownInjection(InjectionId),

    #[error("Iteration limit of {iterations} reached before quiescence")]
    IterationLimit {
        iterations: usize,
        /// States recorded up to the point the limit was hit.
        partial: Box<SimulationResult>,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: &'static str },

    #[error(transparent)]
    Chip(#[from] ChipError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}
