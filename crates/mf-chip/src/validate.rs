//! Ground-connectivity validation.

use std::collections::BTreeSet;

use mf_core::{EdgeId, NodeId};

use crate::chip::Chip;
use crate::edge::ChannelKind;
use crate::error::{ChipError, ChipResult};

/// Check that every node and channel reaches at least one ground node via
/// non-cloggable channels.
///
/// Traversal starts from all ground nodes at once. A channel counts as
/// connected when both endpoints are reachable; a cloggable channel is
/// never traversed but its endpoints may still be reached through other
/// channels.
pub(crate) fn check_reaches_ground(chip: &Chip) -> ChipResult<()> {
    let grounds = chip.ground_ids()?;

    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack: Vec<NodeId> = grounds.iter().copied().collect();

    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        for &channel_id in chip.channels_at_node(node) {
            let channel = chip.channel(channel_id)?;
            if channel.kind() == ChannelKind::Cloggable {
                continue;
            }
            let other = if channel.node0() == node {
                channel.node1()
            } else {
                channel.node0()
            };
            if !visited.contains(&other) {
                stack.push(other);
            }
        }
    }

    let unreachable_nodes: Vec<NodeId> = chip
        .nodes()
        .keys()
        .copied()
        .filter(|id| !visited.contains(id))
        .collect();
    let unreachable_channels: Vec<EdgeId> = chip
        .channels()
        .values()
        .filter(|c| !visited.contains(&c.node0()) || !visited.contains(&c.node1()))
        .map(|c| c.id())
        .collect();

    if unreachable_nodes.is_empty() && unreachable_channels.is_empty() {
        Ok(())
    } else {
        Err(ChipError::DisconnectedNetwork {
            nodes: unreachable_nodes,
            channels: unreachable_channels,
        })
    }
}
