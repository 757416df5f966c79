//! mf-solver: modified nodal analysis for dropletflow.
//!
//! The solver is decoupled from concrete edge types: callers hand it
//! capability views (conductors, pressure sources, flow sources) and get
//! back node pressures plus the solved flow of every pressure source.

pub mod error;
pub mod mna;

pub use error::{SolverError, SolverResult};
pub use mna::{Conductor, FlowSource, NodalSolution, PressureSource, solve_network};
