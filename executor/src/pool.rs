//! Sources of transfers for the packer.
//!
//! A [`TransferPipe`] is a single pass over transfers of one token, to be
//! packed into one commitment paying one fee receiver. Sources hand out a
//! fresh pipe per commitment. The consumer decides how much of a pipe to
//! pull, so a pipe may be unbounded.

use std::collections::VecDeque;
use std::fmt;

use ethereum_types::U256;
use merkle_store::StorageError;
use thiserror::Error;

use crate::tx::OffchainTx;

/// Capacity of a [`TransferPool`] unless given otherwise.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// An error type for transfer sources.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PoolError {
    #[error("Pool is full ({capacity} transfers)")]
    PoolFull { capacity: usize },

    /// Simulated transfers need a sender and a distinct receiver.
    #[error("Need at least 2 users, got {0}")]
    NotEnoughUsers(usize),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct TransferPipe<'a> {
    pub source: Box<dyn Iterator<Item = OffchainTx> + 'a>,
    pub token_id: U256,
    pub fee_receiver_id: u32,
}

impl fmt::Debug for TransferPipe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferPipe")
            .field("token_id", &self.token_id)
            .field("fee_receiver_id", &self.fee_receiver_id)
            .finish_non_exhaustive()
    }
}

pub trait TransferSource {
    /// `true` once no further pipe would yield a transfer.
    fn is_empty(&self) -> bool;

    fn next_pipe(&mut self) -> TransferPipe<'_>;
}

/// First-in first-out queue of transfers in one token, paying one fee
/// receiver.
#[derive(Clone, Debug)]
pub struct TransferPool {
    token_id: U256,
    fee_receiver_id: u32,
    capacity: usize,
    queue: VecDeque<OffchainTx>,
}

impl TransferPool {
    pub fn new(token_id: U256, fee_receiver_id: u32) -> Self {
        Self::with_capacity(token_id, fee_receiver_id, DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(token_id: U256, fee_receiver_id: u32, capacity: usize) -> Self {
        Self {
            token_id,
            fee_receiver_id,
            capacity,
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, tx: OffchainTx) -> Result<(), PoolError> {
        if self.queue.len() >= self.capacity {
            return Err(PoolError::PoolFull {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(tx);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl TransferSource for TransferPool {
    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops one transfer per pull. Whatever is not pulled stays queued.
    fn next_pipe(&mut self) -> TransferPipe<'_> {
        let queue = &mut self.queue;
        TransferPipe {
            source: Box::new(std::iter::from_fn(move || queue.pop_front())),
            token_id: self.token_id,
            fee_receiver_id: self.fee_receiver_id,
        }
    }
}

impl fmt::Display for TransferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TransferPool size {}>", self.queue.len())
    }
}
