//! Per-neighbor communication state.

use crate::direction::Direction;
use crate::halo::{HaloDescriptor, IndexBox};
use crate::layout::NDIMS;
use crate::topology::{CartTopology, Rank};

/// State of one neighbor direction: resolved peer rank, the sub-boxes to
/// send from and receive into, and persistent buffers sized at setup.
///
/// A channel is inactive when there is no peer (non-periodic edge) or the
/// sub-boxes are empty (zero-width halo on a participating axis); inactive
/// channels post no operations and their buffers stay empty.
pub(crate) struct NeighborChannel<T> {
    pub direction: Direction,
    pub peer: Option<Rank>,
    pub send_box: IndexBox,
    pub recv_box: IndexBox,
    pub send_buf: Vec<T>,
    pub recv_buf: Vec<T>,
}

impl<T> NeighborChannel<T> {
    /// Derive the channel for one direction from the per-axis halo
    /// geometry and the topology adapter.
    pub fn build(
        direction: Direction,
        halos: &[HaloDescriptor; NDIMS],
        topology: &dyn CartTopology,
        max_arrays: usize,
    ) -> Self {
        let send_box = IndexBox {
            ranges: [
                halos[0].send_range(direction.component(0)),
                halos[1].send_range(direction.component(1)),
                halos[2].send_range(direction.component(2)),
            ],
        };
        let recv_box = IndexBox {
            ranges: [
                halos[0].recv_range(direction.component(0)),
                halos[1].recv_range(direction.component(1)),
                halos[2].recv_range(direction.component(2)),
            ],
        };
        let peer = topology.rank_of(direction);
        let capacity = if peer.is_some() {
            send_box.volume() * max_arrays
        } else {
            0
        };
        Self {
            direction,
            peer,
            send_box,
            recv_box,
            send_buf: Vec::with_capacity(capacity),
            recv_buf: Vec::with_capacity(capacity),
        }
    }

    /// Elements per array covered by this channel.
    pub fn volume(&self) -> usize {
        self.send_box.volume()
    }

    /// Whether this channel exchanges anything at all.
    pub fn is_active(&self) -> bool {
        self.peer.is_some() && !self.send_box.is_empty()
    }

    /// Tag carried by the message this rank sends through the channel.
    pub fn send_tag(&self) -> u16 {
        self.direction.index() as u16
    }

    /// Tag of the inbound message: the peer at `direction` sent towards us,
    /// i.e. in the opposite direction.
    pub fn recv_tag(&self) -> u16 {
        self.direction.opposite().index() as u16
    }
}
