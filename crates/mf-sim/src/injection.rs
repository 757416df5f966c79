//! Scheduled droplet injections.

use mf_chip::ChannelPosition;
use mf_core::{DropletId, InjectionId};

/// A scheduled placement of a droplet into a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Injection {
    id: InjectionId,
    droplet: DropletId,
    /// Scheduled time in s since simulation start.
    time: f64,
    /// Where the droplet center is placed.
    position: ChannelPosition,
}

impl Injection {
    pub fn new(id: InjectionId, droplet: DropletId, time: f64, position: ChannelPosition) -> Self {
        Self {
            id,
            droplet,
            time,
            position,
        }
    }

    pub fn id(&self) -> InjectionId {
        self.id
    }

    pub fn droplet(&self) -> DropletId {
        self.droplet
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn position(&self) -> ChannelPosition {
        self.position
    }
}
