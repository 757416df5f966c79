//! Droplet path derivation over recorded states.

use std::collections::BTreeSet;

use mf_core::{DropletId, EdgeId};
use serde::{Deserialize, Serialize};

use crate::types::{DropletState, SimulationResult};

/// Location of a droplet at one recorded state: the set of channels
/// touched by its boundaries and fully occupied channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropletPathPosition {
    pub state_id: usize,
    pub channel_ids: BTreeSet<EdgeId>,
}

/// The channel-level path a droplet took through the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropletPath {
    pub droplet_id: DropletId,
    /// One entry per recorded state in which the droplet was inside the
    /// network, with consecutive identical channel sets collapsed.
    pub positions: Vec<DropletPathPosition>,
}

impl SimulationResult {
    /// Derive the path of a droplet across the recorded states.
    pub fn droplet_path(&self, droplet_id: DropletId) -> DropletPath {
        let mut path = DropletPath {
            droplet_id,
            positions: Vec::new(),
        };

        for state in &self.states {
            let Some(position) = state.droplet_positions.get(&droplet_id) else {
                continue;
            };
            if position.state != DropletState::Network {
                continue;
            }

            let mut channel_ids: BTreeSet<EdgeId> = BTreeSet::new();
            for boundary in &position.boundaries {
                channel_ids.insert(boundary.position.channel_id);
            }
            channel_ids.extend(position.channel_ids.iter().copied());

            // collapse runs of identical channel sets
            if path
                .positions
                .last()
                .is_some_and(|last| last.channel_ids == channel_ids)
            {
                continue;
            }
            path.positions.push(DropletPathPosition {
                state_id: state.id,
                channel_ids,
            });
        }

        path
    }
}
