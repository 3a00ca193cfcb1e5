//! Per-axis halo geometry.
//!
//! A `HaloDescriptor` splits one logical axis of a local storage into three
//! sub-intervals: the minus halo, the core (owned cells), and the plus halo.
//! `begin`/`end` bound the core, with `end` inclusive. From these the
//! descriptor derives, for each relative direction -1/0/+1, the index range
//! to send to and to receive from the neighbor on that side.

use crate::error::{HaloError, Result};
use crate::layout::NDIMS;

/// One of the three sub-intervals of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Minus,
    Core,
    Plus,
}

/// A half-open index interval `[lo, hi)` on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub lo: usize,
    pub hi: usize,
}

impl AxisRange {
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }
}

/// Halo geometry of a single logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaloDescriptor {
    minus: usize,
    plus: usize,
    begin: usize,
    end: usize,
    total_length: usize,
}

impl HaloDescriptor {
    /// Validate and store the geometry of one axis.
    ///
    /// `begin` and `end` bound the core region, `end` inclusive. The minus
    /// halo must fit below `begin` and the plus halo above `end` within
    /// `total_length`.
    pub fn new(
        minus: usize,
        plus: usize,
        begin: usize,
        end: usize,
        total_length: usize,
    ) -> Result<Self> {
        if begin < minus {
            return Err(HaloError::InvalidGeometry(format!(
                "core begin {begin} leaves no room for minus halo of width {minus}"
            )));
        }
        if end < begin {
            return Err(HaloError::InvalidGeometry(format!(
                "empty core: begin {begin} > end {end}"
            )));
        }
        if end + plus >= total_length {
            return Err(HaloError::InvalidGeometry(format!(
                "core end {end} plus halo width {plus} exceeds total length {total_length}"
            )));
        }
        Ok(Self {
            minus,
            plus,
            begin,
            end,
            total_length,
        })
    }

    pub fn minus(&self) -> usize {
        self.minus
    }

    pub fn plus(&self) -> usize {
        self.plus
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Inclusive upper bound of the core.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// Half-open interval covered by the given region.
    pub fn sub_box(&self, region: Region) -> AxisRange {
        match region {
            Region::Minus => AxisRange {
                lo: self.begin - self.minus,
                hi: self.begin,
            },
            Region::Core => AxisRange {
                lo: self.begin,
                hi: self.end + 1,
            },
            Region::Plus => AxisRange {
                lo: self.end + 1,
                hi: self.end + 1 + self.plus,
            },
        }
    }

    /// Range of core cells to send towards direction `d` on this axis.
    ///
    /// Towards -1 this is the core slice adjacent to the minus boundary (the
    /// neighbor stores it in its plus halo); towards +1 the slice adjacent to
    /// the plus boundary; for 0 the full core.
    pub fn send_range(&self, d: i8) -> AxisRange {
        match d {
            -1 => AxisRange {
                lo: self.begin,
                hi: self.begin + self.minus,
            },
            0 => self.sub_box(Region::Core),
            1 => AxisRange {
                lo: self.end + 1 - self.plus,
                hi: self.end + 1,
            },
            _ => unreachable!("direction component out of range"),
        }
    }

    /// Range of halo cells receiving from direction `d` on this axis.
    pub fn recv_range(&self, d: i8) -> AxisRange {
        match d {
            -1 => self.sub_box(Region::Minus),
            0 => self.sub_box(Region::Core),
            1 => self.sub_box(Region::Plus),
            _ => unreachable!("direction component out of range"),
        }
    }
}

/// An axis-aligned box of logical indices, one half-open range per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBox {
    pub ranges: [AxisRange; NDIMS],
}

impl IndexBox {
    /// Number of index triples in the box.
    pub fn volume(&self) -> usize {
        self.ranges.iter().map(AxisRange::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().any(AxisRange::is_empty)
    }

    /// Visit every index triple in logical row-major order (axis 2 fastest).
    ///
    /// This order is fixed regardless of storage layout; it defines the
    /// deterministic wire order of packed elements.
    pub fn for_each(&self, mut f: impl FnMut([usize; NDIMS])) {
        for i in self.ranges[0].lo..self.ranges[0].hi {
            for j in self.ranges[1].lo..self.ranges[1].hi {
                for k in self.ranges[2].lo..self.ranges[2].hi {
                    f([i, j, k]);
                }
            }
        }
    }
}
