//! The exchange coordinator: geometry registration, setup, and the
//! four-phase exchange protocol.
//!
//! A `HaloExchange` is driven through a fixed cycle once set up:
//! `post_receives -> pack -> do_sends -> wait -> unpack`, then back to
//! `post_receives` for the next round. Calling an operation out of order is
//! rejected without touching any buffer. `wait` is the only blocking point.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::direction::Direction;
use crate::error::{HaloError, Result};
use crate::exchange::channel::NeighborChannel;
use crate::exchange::packing::{pack_channel, unpack_channel, PackStrategy};
use crate::exchange::transport::{OpToken, Transport};
use crate::halo::HaloDescriptor;
use crate::layout::{LayoutDescriptor, NDIMS};
use crate::topology::CartTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    SetupDone,
    ReceivesPosted,
    Packed,
    SendsIssued,
    Waited,
    Unpacked,
    Failed,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Created => "Created",
            Phase::SetupDone => "SetupDone",
            Phase::ReceivesPosted => "ReceivesPosted",
            Phase::Packed => "Packed",
            Phase::SendsIssued => "SendsIssued",
            Phase::Waited => "Waited",
            Phase::Unpacked => "Unpacked",
            Phase::Failed => "Failed",
        }
    }
}

/// A halo exchange pattern over one Cartesian topology.
///
/// Construction takes the storage layout, the topology adapter and the
/// transport. Geometry is registered per axis with `add_halo`, frozen by
/// `setup`, and then rounds of the exchange protocol may run indefinitely.
/// Caller arrays are borrowed for the duration of a single `pack` or
/// `unpack` call; between `pack` and `unpack` of one round the caller must
/// not mutate them.
pub struct HaloExchange<T> {
    layout: LayoutDescriptor,
    strategy: PackStrategy,
    topology: Box<dyn CartTopology>,
    transport: Box<dyn Transport<T>>,
    halos: [Option<HaloDescriptor>; NDIMS],
    strides: [usize; NDIMS],
    storage_len: usize,
    max_arrays: usize,
    round_arrays: usize,
    channels: Vec<NeighborChannel<T>>,
    recv_tokens: HashMap<OpToken, usize>,
    phase: Phase,
}

impl<T: Copy + Send + Sync> HaloExchange<T> {
    pub fn new(
        layout: LayoutDescriptor,
        topology: Box<dyn CartTopology>,
        transport: Box<dyn Transport<T>>,
    ) -> Self {
        Self {
            layout,
            strategy: PackStrategy::default(),
            topology,
            transport,
            halos: [None; NDIMS],
            strides: [0; NDIMS],
            storage_len: 0,
            max_arrays: 0,
            round_arrays: 0,
            channels: Vec::new(),
            recv_tokens: HashMap::new(),
            phase: Phase::Created,
        }
    }

    /// Select the packing strategy (before or after setup; both strategies
    /// produce identical wire bytes).
    pub fn with_strategy(mut self, strategy: PackStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Register the halo geometry of one logical axis. Must be called once
    /// per axis before `setup`; re-registering an axis overwrites it.
    pub fn add_halo(
        &mut self,
        axis: usize,
        minus: usize,
        plus: usize,
        begin: usize,
        end: usize,
        total_length: usize,
    ) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(HaloError::AlreadySetUp);
        }
        if axis >= NDIMS {
            return Err(HaloError::InvalidGeometry(format!(
                "axis {axis} out of range, engine is {NDIMS}-dimensional"
            )));
        }
        self.halos[axis] = Some(HaloDescriptor::new(minus, plus, begin, end, total_length)?);
        Ok(())
    }

    /// Freeze the geometry and size all channel buffers for exchanging up
    /// to `max_arrays` arrays per round.
    pub fn setup(&mut self, max_arrays: usize) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(HaloError::AlreadySetUp);
        }
        if max_arrays == 0 {
            return Err(HaloError::InvalidGeometry(
                "setup requires capacity for at least one array".into(),
            ));
        }
        let mut halos = [HaloDescriptor::new(0, 0, 0, 0, 1)?; NDIMS];
        for (axis, h) in self.halos.iter().enumerate() {
            halos[axis] = h.ok_or_else(|| {
                HaloError::InvalidGeometry(format!("no halo registered for axis {axis}"))
            })?;
        }
        let _span = tracing::debug_span!("halo_setup", max_arrays).entered();

        let lengths = [
            halos[0].total_length(),
            halos[1].total_length(),
            halos[2].total_length(),
        ];
        self.strides = self.layout.strides(lengths);
        self.storage_len = self.layout.storage_len(lengths);
        self.max_arrays = max_arrays;
        self.channels = Direction::all()
            .map(|d| NeighborChannel::build(d, &halos, self.topology.as_ref(), max_arrays))
            .collect();
        self.phase = Phase::SetupDone;

        let active = self.channels.iter().filter(|c| c.is_active()).count();
        let elements: usize = self
            .channels
            .iter()
            .filter(|c| c.is_active())
            .map(NeighborChannel::volume)
            .sum();
        tracing::debug!(active, elements_per_array = elements, "halo pattern set up");
        Ok(())
    }

    /// Issue the non-blocking receives of a new round.
    pub fn post_receives(&mut self) -> Result<()> {
        match self.phase {
            Phase::Created => return Err(HaloError::NotSetUp),
            Phase::SetupDone | Phase::Unpacked => {}
            _ => {
                return Err(HaloError::ProtocolViolation {
                    op: "post_receives",
                    expected: "SetupDone or Unpacked",
                    actual: self.phase.name(),
                })
            }
        }
        self.recv_tokens.clear();
        for (idx, channel) in self.channels.iter().enumerate() {
            if !channel.is_active() {
                continue;
            }
            let peer = channel.peer.ok_or_else(|| {
                HaloError::Comm("active channel without a peer rank".into())
            })?;
            let capacity = channel.volume() * self.max_arrays;
            let token = self
                .transport
                .post_receive(peer, channel.recv_tag(), capacity)?;
            self.recv_tokens.insert(token, idx);
        }
        self.phase = Phase::ReceivesPosted;
        Ok(())
    }

    /// Serialize the send sub-box of every array into the channel buffers.
    /// Performs no communication.
    pub fn pack(&mut self, arrays: &[&[T]]) -> Result<()> {
        match self.phase {
            Phase::Created => return Err(HaloError::NotSetUp),
            Phase::ReceivesPosted => {}
            _ => {
                return Err(HaloError::ProtocolViolation {
                    op: "pack",
                    expected: "ReceivesPosted",
                    actual: self.phase.name(),
                })
            }
        }
        self.check_arrays(arrays.len())?;
        for (i, array) in arrays.iter().enumerate() {
            if array.len() != self.storage_len {
                return Err(HaloError::InvalidGeometry(format!(
                    "array {i} has {} elements, geometry requires {}",
                    array.len(),
                    self.storage_len
                )));
            }
        }
        let _span = tracing::debug_span!("halo_pack", arrays = arrays.len()).entered();

        let strategy = self.strategy;
        let strides = self.strides;
        let inner_contiguous = self.layout.is_contiguous(2);
        self.channels
            .par_iter_mut()
            .filter(|c| c.is_active())
            .for_each(|channel| {
                pack_channel(strategy, channel, arrays, strides, inner_contiguous);
            });

        self.round_arrays = arrays.len();
        self.phase = Phase::Packed;
        Ok(())
    }

    /// Issue the non-blocking sends for every active channel.
    pub fn do_sends(&mut self) -> Result<()> {
        match self.phase {
            Phase::Created => return Err(HaloError::NotSetUp),
            Phase::Packed => {}
            _ => {
                return Err(HaloError::ProtocolViolation {
                    op: "do_sends",
                    expected: "Packed",
                    actual: self.phase.name(),
                })
            }
        }
        for channel in &self.channels {
            if !channel.is_active() {
                continue;
            }
            let peer = channel.peer.ok_or_else(|| {
                HaloError::Comm("active channel without a peer rank".into())
            })?;
            self.transport
                .post_send(peer, channel.send_tag(), &channel.send_buf)?;
        }
        self.phase = Phase::SendsIssued;
        Ok(())
    }

    /// Block until every send and receive of this round completes and the
    /// received payloads sit in the channel buffers.
    ///
    /// Communication faults surfacing here are fatal for the pattern; the
    /// halo content is unspecified and the pattern must be rebuilt.
    pub fn wait(&mut self) -> Result<()> {
        match self.phase {
            Phase::Created => return Err(HaloError::NotSetUp),
            Phase::SendsIssued => {}
            _ => {
                return Err(HaloError::ProtocolViolation {
                    op: "wait",
                    expected: "SendsIssued",
                    actual: self.phase.name(),
                })
            }
        }
        let _span = tracing::debug_span!("halo_wait").entered();

        let channels = &mut self.channels;
        let tokens = &self.recv_tokens;
        let round_arrays = self.round_arrays;
        let waited = self.transport.wait_all(&mut |token, payload| {
            let idx = *tokens
                .get(&token)
                .ok_or_else(|| HaloError::Comm("delivery for unknown receive token".into()))?;
            let channel = &mut channels[idx];
            let expected = channel.volume() * round_arrays;
            if payload.len() != expected {
                return Err(HaloError::Comm(format!(
                    "channel {:?} received {} elements, expected {expected}",
                    channel.direction.0,
                    payload.len()
                )));
            }
            channel.recv_buf.clear();
            channel.recv_buf.extend_from_slice(payload);
            Ok(())
        });
        if let Err(e) = waited {
            // A communication fault leaves the halo content unspecified;
            // the pattern refuses further rounds and must be rebuilt.
            self.phase = Phase::Failed;
            return Err(e);
        }
        self.recv_tokens.clear();
        self.phase = Phase::Waited;
        Ok(())
    }

    /// Scatter the received buffers into the halo regions of the arrays.
    /// The array count and order must match the `pack` of this round.
    pub fn unpack(&mut self, arrays: &mut [&mut [T]]) -> Result<()> {
        match self.phase {
            Phase::Created => return Err(HaloError::NotSetUp),
            Phase::Waited => {}
            _ => {
                return Err(HaloError::ProtocolViolation {
                    op: "unpack",
                    expected: "Waited",
                    actual: self.phase.name(),
                })
            }
        }
        self.check_arrays(arrays.len())?;
        if arrays.len() != self.round_arrays {
            return Err(HaloError::InvalidGeometry(format!(
                "unpack got {} arrays, this round packed {}",
                arrays.len(),
                self.round_arrays
            )));
        }
        for (i, array) in arrays.iter().enumerate() {
            if array.len() != self.storage_len {
                return Err(HaloError::InvalidGeometry(format!(
                    "array {i} has {} elements, geometry requires {}",
                    array.len(),
                    self.storage_len
                )));
            }
        }
        let _span = tracing::debug_span!("halo_unpack", arrays = arrays.len()).entered();

        let inner_contiguous = self.layout.is_contiguous(2);
        for channel in self.channels.iter().filter(|c| c.is_active()) {
            unpack_channel(self.strategy, channel, arrays, self.strides, inner_contiguous);
        }
        self.phase = Phase::Unpacked;
        Ok(())
    }

    /// Channels that will actually exchange messages.
    pub fn num_active_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    fn check_arrays(&self, given: usize) -> Result<()> {
        if given > self.max_arrays {
            return Err(HaloError::TooManyArrays {
                given,
                max: self.max_arrays,
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn send_buffers_snapshot(&self) -> Vec<Vec<T>> {
        self.channels.iter().map(|c| c.send_buf.clone()).collect()
    }
}
