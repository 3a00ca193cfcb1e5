//! Cartesian process topology adapter.
//!
//! The exchange engine never creates a process group; it only asks an
//! adapter who its neighbors are. `CartGrid` answers those queries by pure
//! arithmetic from (dims, coords, periods) and serves both single-process
//! use and the in-process multi-rank test harness. An MPI-backed adapter
//! lives behind the `distributed` feature.

use crate::direction::Direction;
use crate::layout::NDIMS;

/// Process rank within the topology.
pub type Rank = i32;

/// Neighbor/coordinate queries consumed by the exchange coordinator.
///
/// Implementations: `CartGrid` (arithmetic), `MpiCartTopology` (via the mpi
/// crate, `distributed` feature).
pub trait CartTopology: Send + Sync {
    /// Extent of the process grid along each axis.
    fn dims(&self) -> [usize; NDIMS];

    /// This process's coordinates in the grid.
    fn coords(&self) -> [usize; NDIMS];

    /// Whether the given axis wraps around.
    fn is_periodic(&self, axis: usize) -> bool;

    /// This process's rank.
    fn local_rank(&self) -> Rank;

    /// Rank of the neighbor at relative offset `dir`, or `None` when the
    /// shift crosses a non-periodic domain edge on any axis.
    fn rank_of(&self, dir: Direction) -> Option<Rank>;
}

/// Cartesian topology computed from dims/coords/periods, row-major ranks.
#[derive(Debug, Clone)]
pub struct CartGrid {
    dims: [usize; NDIMS],
    coords: [usize; NDIMS],
    periods: [bool; NDIMS],
}

impl CartGrid {
    pub fn new(dims: [usize; NDIMS], coords: [usize; NDIMS], periods: [bool; NDIMS]) -> Self {
        debug_assert!(dims.iter().all(|&d| d > 0));
        debug_assert!(coords.iter().zip(&dims).all(|(&c, &d)| c < d));
        Self {
            dims,
            coords,
            periods,
        }
    }

    /// Row-major rank of arbitrary coordinates within this grid.
    pub fn rank_at(&self, coords: [usize; NDIMS]) -> Rank {
        let [_, dy, dz] = self.dims;
        ((coords[0] * dy + coords[1]) * dz + coords[2]) as Rank
    }

    /// Coordinates of a row-major rank within this grid.
    pub fn coords_of(&self, rank: Rank) -> [usize; NDIMS] {
        let [_, dy, dz] = self.dims;
        let r = rank as usize;
        [r / (dy * dz), (r / dz) % dy, r % dz]
    }
}

impl CartTopology for CartGrid {
    fn dims(&self) -> [usize; NDIMS] {
        self.dims
    }

    fn coords(&self) -> [usize; NDIMS] {
        self.coords
    }

    fn is_periodic(&self, axis: usize) -> bool {
        self.periods[axis]
    }

    fn local_rank(&self) -> Rank {
        self.rank_at(self.coords)
    }

    fn rank_of(&self, dir: Direction) -> Option<Rank> {
        let mut target = [0usize; NDIMS];
        for a in 0..NDIMS {
            let shifted = self.coords[a] as i64 + dir.component(a) as i64;
            let extent = self.dims[a] as i64;
            if shifted < 0 || shifted >= extent {
                if !self.periods[a] {
                    // One blocked axis disables the whole direction,
                    // corners included.
                    return None;
                }
                target[a] = shifted.rem_euclid(extent) as usize;
            } else {
                target[a] = shifted as usize;
            }
        }
        Some(self.rank_at(target))
    }
}
