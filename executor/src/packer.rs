//! Turning pooled transfers into commitments and batches.

use std::future::Future;

use anyhow::Context as _;
use ethereum_types::{H256, U256};
use merkle_store::StorageEngine;
use rollup_common::DeploymentParameters;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calldata::SubmitTransferCall;
use crate::commitment::{Batch, TransferCommitment};
use crate::pool::{TransferPipe, TransferSource};
use crate::signature::SignatureScheme;
use crate::state::{Pubkey, State, StorageManager};
use crate::state_transition::{apply_transfer, process_receiver, validate_transfer, TransitionError};
use crate::tx::{CodecError, OffchainTx};

/// A pulled transfer that was left out, and why.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedTx {
    pub tx: OffchainTx,
    pub reason: TransitionError,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackedCommitment {
    pub commitment: TransferCommitment,
    pub skipped: Vec<SkippedTx>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackedBatch {
    pub batch: Batch,
    /// Skipped transfers of every pipe, in pull order.
    pub skipped: Vec<SkippedTx>,
}

/// An error type for packing.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PackError {
    #[error("No tx accepted out of {} pulled", .skipped.len())]
    NoAcceptedTx { skipped: Vec<SkippedTx> },

    #[error("The batch has no commitment")]
    NoCommitment,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn accept<S, P, V>(
    tx: &OffchainTx,
    token_id: U256,
    storage: &mut StorageManager<S, P>,
    verifier: &V,
) -> Result<(), TransitionError>
where
    S: StorageEngine<State>,
    P: StorageEngine<Pubkey>,
    V: SignatureScheme,
{
    // Catches amounts that validate but could not be put on the wire.
    tx.to_compressed().serialize()?;
    validate_transfer(tx, token_id, storage, verifier)?;

    let checkpoint = storage.state.checkpoint();
    apply_transfer(&tx.to_compressed(), token_id, &mut storage.state).inspect_err(|_| {
        storage.state.revert(checkpoint);
    })
}

/// Packs transfers pulled from `pipe` into one commitment and commits the
/// resulting state.
///
/// Pulls until `max_txs` transfers were accepted or the pipe runs dry.
/// Invalid transfers are skipped and reported; they never reach storage.
/// The summed fees of accepted transfers go to the pipe's fee receiver.
pub fn pack<S, P, V>(
    pipe: TransferPipe<'_>,
    storage: &mut StorageManager<S, P>,
    max_txs: usize,
    verifier: &V,
) -> Result<PackedCommitment, PackError>
where
    S: StorageEngine<State>,
    P: StorageEngine<Pubkey>,
    V: SignatureScheme,
{
    let TransferPipe {
        mut source,
        token_id,
        fee_receiver_id,
    } = pipe;
    let start = storage.state.checkpoint();
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();

    while accepted.len() < max_txs {
        let Some(tx) = source.next() else {
            break;
        };
        match accept(&tx, token_id, storage, verifier) {
            Ok(()) => accepted.push(tx),
            Err(reason) => {
                warn!(%tx, %reason, "Bad tx");
                skipped.push(SkippedTx { tx, reason });
            }
        }
    }
    if accepted.is_empty() {
        return Err(PackError::NoAcceptedTx { skipped });
    }

    let fees = accepted
        .iter()
        .fold(U256::zero(), |acc, tx| acc.saturating_add(tx.transfer.fee));
    if let Err(e) = process_receiver(&mut storage.state, fee_receiver_id, fees, token_id) {
        storage.state.revert(start);
        return Err(e.into());
    }
    storage.state.commit();

    let commitment = TransferCommitment::from_txs(
        &accepted,
        storage.state.root(),
        storage.pubkey.root(),
        fee_receiver_id,
        verifier,
    )?;
    debug!(
        accepted = accepted.len(),
        skipped = skipped.len(),
        state_root = ?commitment.state_root,
        "Packed commitment"
    );
    Ok(PackedCommitment {
        commitment,
        skipped,
    })
}

/// Packs up to `max_commit_per_batch` commitments, one pipe each. A pipe
/// that yields nothing acceptable is skipped.
pub fn pack_batch<T, S, P, V>(
    pool: &mut T,
    storage: &mut StorageManager<S, P>,
    params: &DeploymentParameters,
    verifier: &V,
) -> Result<PackedBatch, PackError>
where
    T: TransferSource,
    S: StorageEngine<State>,
    P: StorageEngine<Pubkey>,
    V: SignatureScheme,
{
    let mut commitments = Vec::new();
    let mut skipped = Vec::new();

    for _ in 0..params.max_commit_per_batch {
        if pool.is_empty() {
            debug!("Transfer source is empty");
            break;
        }
        match pack(
            pool.next_pipe(),
            storage,
            params.max_txs_per_commit,
            verifier,
        ) {
            Ok(packed) => {
                commitments.push(packed.commitment);
                skipped.extend(packed.skipped);
            }
            Err(PackError::NoAcceptedTx { skipped: rejected }) => {
                warn!(pulled = rejected.len(), "No tx accepted from pipe");
                skipped.extend(rejected);
            }
            Err(e) => warn!(error = %e, "Failed to pack a commitment"),
        }
    }

    if commitments.is_empty() {
        return Err(PackError::NoCommitment);
    }
    Ok(PackedBatch {
        batch: Batch::new(commitments),
        skipped,
    })
}

/// Sends calldata to the rollup contract.
pub trait BatchSubmitter {
    /// Submits a call carrying `value` wei, returning the chain transaction
    /// hash.
    fn submit(
        &self,
        calldata: Vec<u8>,
        value: U256,
    ) -> impl Future<Output = anyhow::Result<H256>> + Send;
}

pub trait BatchPackingCommand {
    /// Packs a batch from local state and submits it.
    fn pack_and_submit(&mut self) -> impl Future<Output = anyhow::Result<H256>> + Send;
}

/// Packs transfer batches out of `pool` and submits them through
/// `submitter`, staking [`DeploymentParameters::stake_amount`] with each.
#[derive(Debug)]
pub struct TransferPackingCommand<T, S, P, V, B> {
    pub params: DeploymentParameters,
    pub storage: StorageManager<S, P>,
    pub pool: T,
    pub verifier: V,
    pub submitter: B,
}

impl<T, S, P, V, B> BatchPackingCommand for TransferPackingCommand<T, S, P, V, B>
where
    T: TransferSource + Send,
    S: StorageEngine<State> + Send,
    P: StorageEngine<Pubkey> + Send,
    V: SignatureScheme + Send,
    B: BatchSubmitter + Send + Sync,
{
    async fn pack_and_submit(&mut self) -> anyhow::Result<H256> {
        let PackedBatch { batch, skipped } =
            pack_batch(&mut self.pool, &mut self.storage, &self.params, &self.verifier)
                .context("Failed to pack a transfer batch")?;
        info!(%batch, skipped = skipped.len(), "Submitting batch");

        let calldata = SubmitTransferCall::from_batch(&batch).encode();
        self.submitter
            .submit(calldata, self.params.stake_amount)
            .await
            .context("Failed to submit the transfer batch")
    }
}
