//! MPI transport and topology adapter for multi-process halo exchange.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! The caller must initialize MPI before constructing either type:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let cart = universe.world().create_cartesian_communicator(...);
//! let topo = MpiCartTopology::from_communicator(&cart);
//! let transport = MpiTransport::<f64>::new();
//! ```
//!
//! Posted operations are recorded and issued together inside `wait_all`:
//! all immediate receives first, then all immediate sends, then a wait on
//! every request within one scope. Deferring the issue keeps request
//! lifetimes inside a single rsmpi scope; the engine-level phase machine
//! still enforces the receive-before-send protocol between ranks.

use mpi::topology::{CartesianCommunicator, SimpleCommunicator};
use mpi::traits::*;

use crate::error::{HaloError, Result};
use crate::exchange::transport::{OpToken, Tag, Transport};
use crate::layout::NDIMS;
use crate::topology::{CartGrid, CartTopology, Rank};

/// Topology adapter reading dims/periods/coords from a Cartesian
/// communicator once at construction.
///
/// Neighbor ranks are computed arithmetically in row-major order, which is
/// the rank ordering MPI guarantees for Cartesian communicators created
/// without reordering.
pub struct MpiCartTopology {
    grid: CartGrid,
}

impl MpiCartTopology {
    pub fn from_communicator(comm: &CartesianCommunicator) -> Self {
        let layout = comm.get_layout();
        let coords = comm.rank_to_coordinates(comm.rank());
        let mut dims = [1usize; NDIMS];
        let mut periods = [false; NDIMS];
        let mut local = [0usize; NDIMS];
        for a in 0..NDIMS.min(layout.dims.len()) {
            dims[a] = layout.dims[a] as usize;
            periods[a] = layout.periods[a];
            local[a] = coords[a] as usize;
        }
        Self {
            grid: CartGrid::new(dims, local, periods),
        }
    }
}

impl CartTopology for MpiCartTopology {
    fn dims(&self) -> [usize; NDIMS] {
        self.grid.dims()
    }

    fn coords(&self) -> [usize; NDIMS] {
        self.grid.coords()
    }

    fn is_periodic(&self, axis: usize) -> bool {
        self.grid.is_periodic(axis)
    }

    fn local_rank(&self) -> Rank {
        self.grid.local_rank()
    }

    fn rank_of(&self, dir: crate::direction::Direction) -> Option<Rank> {
        self.grid.rank_of(dir)
    }
}

struct PendingRecv {
    token: OpToken,
    from: Rank,
    tag: Tag,
    capacity: usize,
}

struct PendingSend<T> {
    to: Rank,
    tag: Tag,
    payload: Vec<T>,
}

/// MPI transport over the world communicator.
///
/// Panics in `wait_all` if MPI has not been initialized via
/// `mpi::initialize()`.
pub struct MpiTransport<T> {
    recvs: Vec<PendingRecv>,
    sends: Vec<PendingSend<T>>,
    next_token: u64,
}

impl<T> MpiTransport<T> {
    pub fn new() -> Self {
        Self {
            recvs: Vec::new(),
            sends: Vec::new(),
            next_token: 0,
        }
    }

    fn fresh_token(&mut self) -> OpToken {
        let t = OpToken(self.next_token);
        self.next_token += 1;
        t
    }
}

impl<T> Default for MpiTransport<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Transport<T> for MpiTransport<T>
where
    T: Equivalence + Default + Copy + Send,
{
    fn post_receive(&mut self, from: Rank, tag: Tag, capacity: usize) -> Result<OpToken> {
        let token = self.fresh_token();
        self.recvs.push(PendingRecv {
            token,
            from,
            tag,
            capacity,
        });
        Ok(token)
    }

    fn post_send(&mut self, to: Rank, tag: Tag, payload: &[T]) -> Result<OpToken> {
        // The payload must stay valid until the round's wait, so keep an
        // owned copy.
        self.sends.push(PendingSend {
            to,
            tag,
            payload: payload.to_vec(),
        });
        Ok(self.fresh_token())
    }

    fn wait_all(
        &mut self,
        deliver: &mut dyn FnMut(OpToken, &[T]) -> Result<()>,
    ) -> Result<()> {
        let world = SimpleCommunicator::world();
        let recvs = std::mem::take(&mut self.recvs);
        let sends = std::mem::take(&mut self.sends);

        let mut recv_bufs: Vec<Vec<T>> = recvs
            .iter()
            .map(|r| vec![T::default(); r.capacity])
            .collect();
        let mut counts = vec![0usize; recvs.len()];

        mpi::request::scope(|scope| {
            let mut recv_reqs = Vec::with_capacity(recvs.len());
            for (r, buf) in recvs.iter().zip(recv_bufs.iter_mut()) {
                let req = world.process_at_rank(r.from).immediate_receive_into_with_tag(
                    scope,
                    &mut buf[..],
                    r.tag as i32,
                );
                recv_reqs.push(req);
            }
            let mut send_reqs = Vec::with_capacity(sends.len());
            for s in &sends {
                let req = world.process_at_rank(s.to).immediate_send_with_tag(
                    scope,
                    &s.payload[..],
                    s.tag as i32,
                );
                send_reqs.push(req);
            }
            for (i, req) in recv_reqs.into_iter().enumerate() {
                let status = req.wait();
                counts[i] = status.count(T::equivalent_datatype()) as usize;
            }
            for req in send_reqs {
                req.wait_without_status();
            }
        });

        for ((r, buf), n) in recvs.iter().zip(&recv_bufs).zip(&counts) {
            if *n > r.capacity {
                return Err(HaloError::Comm(format!(
                    "message from rank {} tag {} has {n} elements, receive capacity is {}",
                    r.from, r.tag, r.capacity
                )));
            }
            deliver(r.token, &buf[..*n])?;
        }
        Ok(())
    }
}
