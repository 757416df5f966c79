//! The event set driving the simulation loop.

use mf_core::{DropletId, InjectionId};

/// A pending topology event.
///
/// `time` is the fire time relative to the current simulation time.
/// Exactly one event fires per iteration; candidates are ordered by
/// (time ascending, priority ascending), ties beyond that resolve in
/// enumeration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// An outflowing head would enter a node already occupied by another
    /// droplet.
    MergeBifurcation {
        time: f64,
        droplet0: DropletId,
        boundary0: usize,
        droplet1: DropletId,
    },
    /// A scheduled injection is due.
    Injection { time: f64, injection: InjectionId },
    /// A boundary moving away from the droplet center reaches the end of
    /// its channel.
    BoundaryHead {
        time: f64,
        droplet: DropletId,
        boundary: usize,
    },
    /// A boundary moving towards the droplet center reaches the end of
    /// its channel.
    BoundaryTail {
        time: f64,
        droplet: DropletId,
        boundary: usize,
    },
    /// Two boundaries of different droplets collide inside a channel.
    MergeChannel {
        time: f64,
        droplet0: DropletId,
        boundary0: usize,
        droplet1: DropletId,
        boundary1: usize,
    },
    /// Forces a re-solve while a droplet sits at a bifurcation.
    TimeStep { time: f64 },
}

impl Event {
    /// Fire time relative to now, in s.
    pub fn time(&self) -> f64 {
        match *self {
            Event::MergeBifurcation { time, .. }
            | Event::Injection { time, .. }
            | Event::BoundaryHead { time, .. }
            | Event::BoundaryTail { time, .. }
            | Event::MergeChannel { time, .. }
            | Event::TimeStep { time } => time,
        }
    }

    /// Tie-breaker for coincident events; lower fires first.
    pub fn priority(&self) -> u8 {
        match self {
            Event::MergeBifurcation { .. } => 0,
            Event::Injection { .. }
            | Event::BoundaryHead { .. }
            | Event::BoundaryTail { .. }
            | Event::MergeChannel { .. } => 1,
            Event::TimeStep { .. } => 2,
        }
    }
}

/// Order events by (time, priority), keeping enumeration order for ties.
pub(crate) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.time()
            .total_cmp(&b.time())
            .then(a.priority().cmp(&b.priority()))
    });
}
