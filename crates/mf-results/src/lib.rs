//! mf-results: simulation result data and serialization.
//!
//! Provides:
//! - The result schema (chip summary, fluids, droplets, injections and
//!   the per-iteration states)
//! - Two JSON emitters behind a format selector, plus the parser for the
//!   full schema
//! - Droplet path derivation over recorded states

pub mod json;
pub mod path;
pub mod types;

pub use json::JsonFormat;
pub use path::{DropletPath, DropletPathPosition};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
