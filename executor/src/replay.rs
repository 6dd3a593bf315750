//! Following batches submitted by others.

use std::future::Future;

use ethereum_types::H256;
use merkle_store::StorageEngine;
use rollup_common::DeploymentParameters;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::calldata::{CalldataError, SubmitTransferCall};
use crate::commitment::Batch;
use crate::state::{Pubkey, State, StorageManager};
use crate::state_transition::{replay_commitment, TransitionError};

/// Kinds of batch the rollup contract accepts, as tagged in its `NewBatch`
/// event.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BatchType {
    Genesis = 0,
    Transfer = 1,
    MassMigration = 2,
    Create2Transfer = 3,
    Deposit = 4,
}

impl TryFrom<u8> for BatchType {
    type Error = ReplayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Genesis),
            1 => Ok(Self::Transfer),
            2 => Ok(Self::MassMigration),
            3 => Ok(Self::Create2Transfer),
            4 => Ok(Self::Deposit),
            other => Err(ReplayError::UnknownBatchType(other)),
        }
    }
}

/// What a replica learns from a `NewBatch` event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewBatchEvent {
    pub batch_id: u64,
    pub account_root: H256,
    pub batch_type: BatchType,
    /// Hash of the transaction that submitted the batch.
    pub tx_hash: H256,
}

/// An error type for batch replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),

    #[error(transparent)]
    Calldata(#[from] CalldataError),

    #[error("Commitment {index} failed to replay")]
    Commitment {
        index: usize,
        #[source]
        source: TransitionError,
    },

    #[error("No handler for {0:?} batches")]
    UnsupportedBatchType(BatchType),

    #[error("Unknown batch type {0}")]
    UnknownBatchType(u8),
}

/// Looks up the calldata of a chain transaction.
pub trait CalldataSource {
    fn calldata(&self, tx_hash: H256) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Replays one kind of batch.
pub trait BatchHandlingStrategy {
    fn parse_batch(
        &self,
        event: &NewBatchEvent,
    ) -> impl Future<Output = Result<Batch, ReplayError>> + Send;

    /// Replays `batch` in commitment order. The first failing commitment
    /// stops the replay; commitments before it stay committed.
    fn process_batch(&mut self, batch: &Batch)
        -> impl Future<Output = Result<(), ReplayError>> + Send;
}

#[derive(Debug)]
pub struct TransferHandlingStrategy<C, S, P> {
    source: C,
    storage: StorageManager<S, P>,
    params: DeploymentParameters,
}

impl<C, S, P> TransferHandlingStrategy<C, S, P> {
    pub fn new(source: C, storage: StorageManager<S, P>, params: DeploymentParameters) -> Self {
        Self {
            source,
            storage,
            params,
        }
    }

    pub fn storage(&self) -> &StorageManager<S, P> {
        &self.storage
    }

    pub fn into_storage(self) -> StorageManager<S, P> {
        self.storage
    }
}

impl<C, S, P> BatchHandlingStrategy for TransferHandlingStrategy<C, S, P>
where
    C: CalldataSource + Send + Sync,
    S: StorageEngine<State> + Send + Sync,
    P: StorageEngine<Pubkey> + Send + Sync,
{
    async fn parse_batch(&self, event: &NewBatchEvent) -> Result<Batch, ReplayError> {
        let calldata = self.source.calldata(event.tx_hash).await?;
        let batch = SubmitTransferCall::decode(&calldata)?.into_batch(event.account_root)?;
        Ok(batch)
    }

    async fn process_batch(&mut self, batch: &Batch) -> Result<(), ReplayError> {
        for (index, commitment) in batch.commitments.iter().enumerate() {
            replay_commitment(commitment, &mut self.storage, self.params.max_txs_per_commit)
                .map_err(|source| ReplayError::Commitment { index, source })?;
        }
        Ok(())
    }
}

/// Routes each batch to the strategy for its type.
#[derive(Debug)]
pub struct BatchDispatcher<H> {
    pub transfer: H,
}

impl<H: BatchHandlingStrategy> BatchDispatcher<H> {
    pub fn new(transfer: H) -> Self {
        Self { transfer }
    }

    /// Parses and replays the batch announced by `event`.
    #[instrument(skip_all, fields(batch_id = event.batch_id))]
    pub async fn handle(&mut self, event: &NewBatchEvent) -> Result<Batch, ReplayError> {
        let strategy = match event.batch_type {
            BatchType::Transfer => &mut self.transfer,
            other => return Err(ReplayError::UnsupportedBatchType(other)),
        };
        let batch = strategy.parse_batch(event).await?;
        strategy.process_batch(&batch).await?;
        info!(%batch, "Replayed batch");
        Ok(batch)
    }
}
