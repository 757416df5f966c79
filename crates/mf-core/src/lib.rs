//! mf-core: stable foundation for dropletflow.
//!
//! Contains:
//! - ids (identifier aliases shared across the chip/simulation graph)
//! - numeric (tolerances + float helpers)
//! - error (shared error kinds)

pub mod error;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
