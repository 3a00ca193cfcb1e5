//! Halo exchange: channels, packing, transport, and the coordinator.

pub mod channel;
pub mod packing;
pub mod pattern;
pub mod transport;
#[cfg(feature = "distributed")]
pub mod transport_mpi;

pub use packing::PackStrategy;
pub use pattern::HaloExchange;
pub use transport::{InProcessEndpoint, InProcessNetwork, OpToken, Tag, Transport};
