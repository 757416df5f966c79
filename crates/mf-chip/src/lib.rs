//! mf-chip: static network model for dropletflow.
//!
//! Provides:
//! - Chip: nodes, channels, pumps, sinks and grounds with incremental
//!   construction (nodes are created on first reference by an edge)
//! - Hydraulic channel geometry and the resistance bookkeeping the
//!   simulation updates each iteration
//! - Relative channel positions used by droplet boundaries and injections
//! - Ground-connectivity validation with offender reporting

pub mod chip;
pub mod edge;
pub mod error;
pub mod node;
pub mod position;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use chip::Chip;
pub use edge::{Channel, ChannelKind, FlowRatePump, PressurePump};
pub use error::{ChipError, ChipResult};
pub use node::Node;
pub use position::ChannelPosition;
