//! Halo exchange engine for regularly-decomposed 3D grids.
//!
//! Keeps the ghost (halo) regions of a distributed grid consistent across
//! the ranks of a Cartesian process topology. A pattern is built once from
//! per-axis halo geometry, then driven through rounds of the four-phase
//! protocol:
//!
//! ```no_run
//! use gridhalo::exchange::{HaloExchange, InProcessNetwork};
//! use gridhalo::layout::LayoutDescriptor;
//! use gridhalo::topology::CartGrid;
//!
//! # fn main() -> gridhalo::error::Result<()> {
//! let net = InProcessNetwork::new();
//! let topo = CartGrid::new([1, 1, 1], [0, 0, 0], [true; 3]);
//! let mut he = HaloExchange::<f64>::new(
//!     LayoutDescriptor::row_major(),
//!     Box::new(topo),
//!     Box::new(net.endpoint(0)),
//! );
//! // 4x4x4 core with halo width 1 on every axis.
//! for axis in 0..3 {
//!     he.add_halo(axis, 1, 1, 1, 4, 6)?;
//! }
//! he.setup(2)?;
//!
//! let mut a = vec![0.0f64; 216];
//! let mut b = vec![0.0f64; 216];
//! he.post_receives()?;
//! he.pack(&[a.as_slice(), b.as_slice()])?;
//! he.do_sends()?;
//! he.wait()?;
//! let mut refs = [a.as_mut_slice(), b.as_mut_slice()];
//! he.unpack(&mut refs)?;
//! # Ok(())
//! # }
//! ```
//!
//! Both communicating ranks must register congruent geometry and pass their
//! arrays in the same order: messages carry raw elements with no header, so
//! sizes are agreed implicitly.

pub mod direction;
pub mod error;
pub mod exchange;
pub mod halo;
pub mod layout;
pub mod topology;

pub use direction::Direction;
pub use error::{HaloError, Result};
pub use exchange::{HaloExchange, PackStrategy};
pub use halo::{HaloDescriptor, Region};
pub use layout::LayoutDescriptor;
pub use topology::{CartGrid, CartTopology, Rank};
