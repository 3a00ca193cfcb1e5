//! Data-layout description for 3D strided storage.
//!
//! A `LayoutDescriptor` maps each logical axis (0, 1, 2) to its rank in the
//! stride order of the underlying memory. The axis with the highest rank is
//! contiguous (stride 1); lower ranks get progressively larger strides. An
//! axis can be marked absent for degenerate storages, in which case its
//! stride is zero and its extent is ignored.

use crate::error::{HaloError, Result};

/// Number of logical axes handled by the engine.
pub const NDIMS: usize = 3;

/// Sentinel rank for an axis not present in storage.
pub const ABSENT: i32 = -1;

/// Immutable permutation mapping logical axis -> stride rank.
///
/// `LayoutDescriptor::row_major()` is the identity mapping where logical
/// axis 2 is contiguous. `new([2, 1, 0])` makes logical axis 0 contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutDescriptor {
    ranks: [i32; NDIMS],
}

impl LayoutDescriptor {
    /// Build a layout from stride ranks, one per logical axis.
    ///
    /// The present (non-`ABSENT`) entries must form a bijection over
    /// `0..n_present`, otherwise strides would be ambiguous.
    pub fn new(ranks: [i32; NDIMS]) -> Result<Self> {
        let present: Vec<i32> = ranks.iter().copied().filter(|&r| r != ABSENT).collect();
        let n = present.len() as i32;
        for r in &present {
            if *r < 0 || *r >= n {
                return Err(HaloError::InvalidGeometry(format!(
                    "layout rank {r} out of range for {n} present axes"
                )));
            }
        }
        for i in 0..present.len() {
            for j in (i + 1)..present.len() {
                if present[i] == present[j] {
                    return Err(HaloError::InvalidGeometry(format!(
                        "duplicate layout rank {} in {ranks:?}",
                        present[i]
                    )));
                }
            }
        }
        Ok(Self { ranks })
    }

    /// Standard C ordering: logical axis 2 varies fastest.
    pub fn row_major() -> Self {
        Self { ranks: [0, 1, 2] }
    }

    /// Stride rank of a logical axis (`ABSENT` if masked).
    pub fn rank(&self, axis: usize) -> i32 {
        self.ranks[axis]
    }

    /// Whether the given logical axis is present in storage.
    pub fn is_present(&self, axis: usize) -> bool {
        self.ranks[axis] != ABSENT
    }

    /// Whether the given logical axis is the contiguous (stride 1) one.
    pub fn is_contiguous(&self, axis: usize) -> bool {
        let max = self.ranks.iter().copied().max().unwrap_or(ABSENT);
        self.ranks[axis] != ABSENT && self.ranks[axis] == max
    }

    /// Compute the memory stride of each logical axis for the given axis
    /// lengths. Absent axes get stride 0.
    pub fn strides(&self, lengths: [usize; NDIMS]) -> [usize; NDIMS] {
        let mut strides = [0usize; NDIMS];
        for a in 0..NDIMS {
            let ra = self.ranks[a];
            if ra == ABSENT {
                continue;
            }
            // Stride = product of lengths of all axes laid out after this one.
            let mut s = 1usize;
            for b in 0..NDIMS {
                if self.ranks[b] != ABSENT && self.ranks[b] > ra {
                    s *= lengths[b];
                }
            }
            strides[a] = s;
        }
        strides
    }

    /// Linear address of a logical index under the given strides.
    #[inline]
    pub fn offset(strides: [usize; NDIMS], idx: [usize; NDIMS]) -> usize {
        strides[0] * idx[0] + strides[1] * idx[1] + strides[2] * idx[2]
    }

    /// Total number of elements a storage with these lengths holds.
    pub fn storage_len(&self, lengths: [usize; NDIMS]) -> usize {
        let mut n = 1usize;
        for a in 0..NDIMS {
            if self.ranks[a] != ABSENT {
                n *= lengths[a];
            }
        }
        n
    }
}
