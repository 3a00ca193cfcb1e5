//! Point-to-point transport abstraction for halo exchange.
//!
//! Provides a capability trait for non-blocking sends/receives identified by
//! operation tokens, and an in-process mailbox implementation that can drive
//! any number of simulated ranks inside one OS process. The MPI transport
//! (behind the `distributed` feature) lives in `transport_mpi`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{HaloError, Result};
use crate::topology::Rank;

/// Message tag disambiguating the up to 26 channels between a pair of ranks.
pub type Tag = u16;

/// Token for a posted non-blocking operation, redeemed by `wait_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpToken(pub(crate) u64);

/// Point-to-point transport used by the exchange coordinator.
///
/// `post_receive` and `post_send` register non-blocking operations;
/// `wait_all` blocks until every outstanding operation of the current round
/// completes, handing each received payload to `deliver` together with the
/// token of the receive it satisfies. A transport is used by exactly one
/// rank's coordinator at a time.
pub trait Transport<T>: Send {
    /// Register a non-blocking receive of at most `capacity` elements.
    fn post_receive(&mut self, from: Rank, tag: Tag, capacity: usize) -> Result<OpToken>;

    /// Register a non-blocking send.
    fn post_send(&mut self, to: Rank, tag: Tag, payload: &[T]) -> Result<OpToken>;

    /// Block until all operations posted since the last `wait_all` complete.
    ///
    /// A peer that never sent a registered message, or sent more than the
    /// receive capacity, is a fatal `Comm` error.
    fn wait_all(
        &mut self,
        deliver: &mut dyn FnMut(OpToken, &[T]) -> Result<()>,
    ) -> Result<()>;
}

type Mailboxes<T> = HashMap<(Rank, Rank, Tag), VecDeque<Vec<T>>>;

/// Shared mailbox fabric connecting in-process endpoints.
///
/// Messages are keyed by (destination, source, tag); sends deliver eagerly,
/// receives are matched at `wait_all`. Self-sends (periodic wrap on a
/// 1-process axis) work like any other pair.
pub struct InProcessNetwork<T> {
    mailboxes: Arc<Mutex<Mailboxes<T>>>,
}

impl<T> InProcessNetwork<T> {
    pub fn new() -> Self {
        Self {
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create the transport endpoint for one rank.
    pub fn endpoint(&self, rank: Rank) -> InProcessEndpoint<T> {
        InProcessEndpoint {
            rank,
            mailboxes: Arc::clone(&self.mailboxes),
            pending: Vec::new(),
            next_token: 0,
        }
    }
}

impl<T> Default for InProcessNetwork<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingRecv {
    token: OpToken,
    from: Rank,
    tag: Tag,
    capacity: usize,
}

/// One rank's endpoint on an `InProcessNetwork`.
pub struct InProcessEndpoint<T> {
    rank: Rank,
    mailboxes: Arc<Mutex<Mailboxes<T>>>,
    pending: Vec<PendingRecv>,
    next_token: u64,
}

impl<T> InProcessEndpoint<T> {
    fn fresh_token(&mut self) -> OpToken {
        let t = OpToken(self.next_token);
        self.next_token += 1;
        t
    }
}

impl<T: Clone + Send> Transport<T> for InProcessEndpoint<T> {
    fn post_receive(&mut self, from: Rank, tag: Tag, capacity: usize) -> Result<OpToken> {
        let token = self.fresh_token();
        self.pending.push(PendingRecv {
            token,
            from,
            tag,
            capacity,
        });
        Ok(token)
    }

    fn post_send(&mut self, to: Rank, tag: Tag, payload: &[T]) -> Result<OpToken> {
        let token = self.fresh_token();
        let mut boxes = self
            .mailboxes
            .lock()
            .map_err(|_| HaloError::Comm("transport mailbox poisoned".into()))?;
        boxes
            .entry((to, self.rank, tag))
            .or_default()
            .push_back(payload.to_vec());
        Ok(token)
    }

    fn wait_all(
        &mut self,
        deliver: &mut dyn FnMut(OpToken, &[T]) -> Result<()>,
    ) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for recv in pending {
            let payload = {
                let mut boxes = self
                    .mailboxes
                    .lock()
                    .map_err(|_| HaloError::Comm("transport mailbox poisoned".into()))?;
                boxes
                    .get_mut(&(self.rank, recv.from, recv.tag))
                    .and_then(VecDeque::pop_front)
            };
            let payload = payload.ok_or_else(|| {
                HaloError::Comm(format!(
                    "no message from rank {} with tag {} for rank {}",
                    recv.from, recv.tag, self.rank
                ))
            })?;
            if payload.len() > recv.capacity {
                return Err(HaloError::Comm(format!(
                    "message from rank {} tag {} has {} elements, receive capacity is {}",
                    recv.from,
                    recv.tag,
                    payload.len(),
                    recv.capacity
                )));
            }
            deliver(recv.token, &payload)?;
        }
        Ok(())
    }
}
