//! The 26-direction neighbor space of a 3D Cartesian decomposition.

use crate::layout::NDIMS;

/// A relative neighbor offset in {-1, 0, 1}^3, excluding (0, 0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction(pub [i8; NDIMS]);

/// Number of non-self directions in 3D.
pub const NUM_DIRECTIONS: usize = 26;

impl Direction {
    /// Base-3 encoding of the offset triple, in 0..27 minus the center 13.
    /// Stable across ranks, so it doubles as the message tag for a send
    /// issued in this direction.
    pub fn index(&self) -> usize {
        let [dx, dy, dz] = self.0;
        ((dx + 1) as usize) * 9 + ((dy + 1) as usize) * 3 + (dz + 1) as usize
    }

    /// The direction pointing back at the sender.
    pub fn opposite(&self) -> Direction {
        let [dx, dy, dz] = self.0;
        Direction([-dx, -dy, -dz])
    }

    /// Offset along one axis.
    pub fn component(&self, axis: usize) -> i8 {
        self.0[axis]
    }

    /// Enumerate all 26 directions in index order.
    pub fn all() -> impl Iterator<Item = Direction> {
        (0..27).filter(|&i| i != 13).map(|i| {
            Direction([
                (i / 9) as i8 - 1,
                ((i / 3) % 3) as i8 - 1,
                (i % 3) as i8 - 1,
            ])
        })
    }
}
