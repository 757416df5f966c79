//! Error types for the nodal analysis.

use thiserror::Error;

pub type SolverResult<T> = Result<T, SolverError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Nodal analysis system of size {size} is singular")]
    NetworkSingular { size: usize },

    #[error("Nodal analysis produced a non-finite {what}")]
    NonFinite { what: &'static str },
}
