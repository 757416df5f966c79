//! Chip construction and validation errors.

use mf_core::{EdgeId, NodeId};
use thiserror::Error;

pub type ChipResult<T> = Result<T, ChipError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChipError {
    #[error("Invalid channel geometry: {what} must be positive, got {value}")]
    InvalidGeometry { what: &'static str, value: f64 },

    #[error("Ground node not defined")]
    MissingGround,

    #[error(
        "Chip is not connected to ground: nodes {nodes:?} and channels {channels:?} cannot reach a ground node"
    )]
    DisconnectedNetwork {
        nodes: Vec<NodeId>,
        channels: Vec<EdgeId>,
    },

    #[error("Node with id {0} does not exist")]
    UnknownNode(NodeId),

    #[error("Channel with id {0} does not exist")]
    UnknownChannel(EdgeId),
}
