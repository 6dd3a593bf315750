//! Validation and application of transfers against storage.
//!
//! Everything here only stages writes. Committing is left to the caller,
//! except in [`replay_commitment`] which commits the whole commitment at
//! once.

use ethereum_types::{H256, U256};
use merkle_store::{StorageEngine, StorageError};
use thiserror::Error;
use tracing::debug;

use crate::commitment::TransferCommitment;
use crate::signature::SignatureScheme;
use crate::state::{Pubkey, State, StorageManager};
use crate::tx::{CodecError, CompressedTx, OffchainTx};

/// Stores the result of state transitions. Returns a [`TransitionError`]
/// upon failure.
pub type TransitionResult<T> = Result<T, TransitionError>;

/// An error type for state transitions.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TransitionError {
    #[error("Transfer amount must not be zero")]
    ZeroAmount,

    #[error("Insufficient funds: balance {balance}, need {required}")]
    InsufficientFunds { balance: U256, required: U256 },

    #[error("Wrong token: expected {expected}, got {got}")]
    WrongTokenId { expected: U256, got: U256 },

    #[error("Bad nonce: tx {got}, state {expected}")]
    BadNonce { expected: u32, got: u32 },

    #[error("Transfer is not signed")]
    MissingSignature,

    #[error("Invalid signature")]
    BadSignature,

    /// Crediting the receiver would overflow its balance.
    #[error("Balance of state {0} would overflow")]
    BalanceOverflow(u32),

    #[error("Nonce of state {0} would overflow")]
    NonceOverflow(u32),

    #[error("Too many txs: {count} exceeds {max}")]
    TooManyTx { count: usize, max: usize },

    #[error("Commitment has no transactions")]
    EmptyCommitment,

    /// The root reached by replaying differs from the one the commitment
    /// declares.
    #[error("State root mismatch: commitment declares {expected:#x}, replay reached {got:#x}")]
    StateRootMismatch { expected: H256, got: H256 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub fn validate_sender(
    sender: &State,
    token_id: U256,
    amount: U256,
    fee: U256,
) -> TransitionResult<()> {
    if amount.is_zero() {
        return Err(TransitionError::ZeroAmount);
    }
    let required = amount.saturating_add(fee);
    if sender.balance < required {
        return Err(TransitionError::InsufficientFunds {
            balance: sender.balance,
            required,
        });
    }
    check_token(sender, token_id)
}

pub fn validate_receiver(receiver: &State, token_id: U256) -> TransitionResult<()> {
    check_token(receiver, token_id)
}

fn check_token(state: &State, token_id: U256) -> TransitionResult<()> {
    match state.token_id == token_id {
        true => Ok(()),
        false => Err(TransitionError::WrongTokenId {
            expected: token_id,
            got: state.token_id,
        }),
    }
}

/// Stages the debit of `amount + fee` and the nonce bump of the sender.
pub fn process_sender<S: StorageEngine<State>>(
    engine: &mut S,
    sender_id: u32,
    token_id: U256,
    amount: U256,
    fee: U256,
) -> TransitionResult<()> {
    let mut sender = engine.get(sender_id.into())?;
    check_token(&sender, token_id)?;
    let required = amount.saturating_add(fee);
    sender.balance = sender
        .balance
        .checked_sub(required)
        .ok_or(TransitionError::InsufficientFunds {
            balance: sender.balance,
            required,
        })?;
    sender.nonce = sender
        .nonce
        .checked_add(1)
        .ok_or(TransitionError::NonceOverflow(sender_id))?;
    engine.update(sender_id.into(), sender)?;
    Ok(())
}

/// Stages a credit of `increment` to the receiver.
pub fn process_receiver<S: StorageEngine<State>>(
    engine: &mut S,
    receiver_id: u32,
    increment: U256,
    token_id: U256,
) -> TransitionResult<()> {
    let mut receiver = engine.get(receiver_id.into())?;
    check_token(&receiver, token_id)?;
    receiver.balance = receiver
        .balance
        .checked_add(increment)
        .ok_or(TransitionError::BalanceOverflow(receiver_id))?;
    engine.update(receiver_id.into(), receiver)?;
    Ok(())
}

/// Checks that `tx` could be applied on top of the current (staged) state,
/// without changing it.
pub fn validate_transfer<S, P, V>(
    tx: &OffchainTx,
    token_id: U256,
    storage: &StorageManager<S, P>,
    verifier: &V,
) -> TransitionResult<()>
where
    S: StorageEngine<State>,
    P: StorageEngine<Pubkey>,
    V: SignatureScheme,
{
    let transfer = &tx.transfer;
    let sender = storage.state.get(transfer.from_index.into())?;
    let receiver = storage.state.get(transfer.to_index.into())?;

    validate_sender(&sender, token_id, transfer.amount, transfer.fee)?;
    validate_receiver(&receiver, token_id)?;
    if tx.nonce != sender.nonce {
        return Err(TransitionError::BadNonce {
            expected: sender.nonce,
            got: tx.nonce,
        });
    }
    let Pubkey(sender_key) = storage.pubkey.get(sender.pubkey_id.into())?;
    let signature = tx.signature.ok_or(TransitionError::MissingSignature)?;
    match verifier.verify(&signature, &sender_key, &tx.message()) {
        true => Ok(()),
        false => Err(TransitionError::BadSignature),
    }
}

/// Stages the sender and receiver updates of `tx`. Does not credit the fee.
pub fn apply_transfer<S: StorageEngine<State>>(
    tx: &CompressedTx,
    token_id: U256,
    engine: &mut S,
) -> TransitionResult<()> {
    process_sender(engine, tx.from_index, token_id, tx.amount, tx.fee)?;
    process_receiver(engine, tx.to_index, tx.amount, token_id)
}

/// Applies a commitment produced elsewhere, commits, and checks the
/// resulting root. Signatures are not checked; the commitment is taken to be
/// accepted by the chain already.
///
/// On any failure before the commit, everything this call staged is
/// reverted.
pub fn replay_commitment<S, P>(
    commitment: &TransferCommitment,
    storage: &mut StorageManager<S, P>,
    max_txs: usize,
) -> TransitionResult<()>
where
    S: StorageEngine<State>,
    P: StorageEngine<Pubkey>,
{
    let txs = commitment.decompress_txs()?;
    if txs.len() > max_txs {
        return Err(TransitionError::TooManyTx {
            count: txs.len(),
            max: max_txs,
        });
    }
    let first = txs.first().ok_or(TransitionError::EmptyCommitment)?;

    let engine = &mut storage.state;
    let checkpoint = engine.checkpoint();
    let applied = engine
        .get(first.from_index.into())
        .map_err(TransitionError::from)
        .and_then(|sender| {
            let token_id = sender.token_id;
            for tx in &txs {
                apply_transfer(tx, token_id, engine)?;
            }
            let fees = txs
                .iter()
                .fold(U256::zero(), |acc, tx| acc.saturating_add(tx.fee));
            process_receiver(engine, commitment.fee_receiver, fees, token_id)
        });
    if let Err(e) = applied {
        engine.revert(checkpoint);
        return Err(e);
    }

    engine.commit();
    let root = engine.root();
    debug!(txs = txs.len(), root = ?root, "Replayed commitment");
    match root == commitment.state_root {
        true => Ok(()),
        false => Err(TransitionError::StateRootMismatch {
            expected: commitment.state_root,
            got: root,
        }),
    }
}

#[cfg(test)]
mod tests {
    use merkle_store::StorageResult;
    use rollup_common::DeploymentParameters;

    use super::*;
    use crate::signature::{DevKeypair, DevScheme};
    use crate::state::{Genesis, GenesisAccount, MemoryStorage};

    fn token() -> U256 {
        U256::one()
    }

    fn storage(balances: &[u64]) -> StorageResult<MemoryStorage> {
        let params = DeploymentParameters {
            state_tree_depth: 2,
            pubkey_tree_depth: 2,
            ..Default::default()
        };
        let accounts = balances
            .iter()
            .enumerate()
            .map(|(i, balance)| GenesisAccount {
                state_id: i as u32,
                pubkey_id: i as u32,
                pubkey: DevKeypair::from_seed(i as u64).pubkey,
                token_id: token(),
                balance: (*balance).into(),
                nonce: 0,
            })
            .collect();
        MemoryStorage::from_genesis(&params, &Genesis { accounts })
    }

    fn signed(from: u32, to: u32, amount: u64, fee: u64, nonce: u32) -> OffchainTx {
        let tx = OffchainTx::new(from, to, amount.into(), fee.into(), nonce);
        let signature = DevKeypair::from_seed(from.into()).sign(&tx.message());
        tx.with_signature(signature)
    }

    #[test]
    fn sender_rules() {
        let state = State {
            pubkey_id: 0,
            token_id: token(),
            balance: U256::from(11),
            nonce: 0,
        };
        assert_eq!(
            validate_sender(&state, token(), U256::zero(), U256::zero()),
            Err(TransitionError::ZeroAmount)
        );
        assert_eq!(
            validate_sender(&state, token(), U256::from(10), U256::from(2)),
            Err(TransitionError::InsufficientFunds {
                balance: U256::from(11),
                required: U256::from(12)
            })
        );
        assert_eq!(
            validate_sender(&state, U256::from(2), U256::from(10), U256::one()),
            Err(TransitionError::WrongTokenId {
                expected: U256::from(2),
                got: token()
            })
        );
        assert_eq!(
            validate_sender(&state, token(), U256::from(10), U256::one()),
            Ok(())
        );
    }

    #[test]
    fn validate_checks_nonce_and_signature() -> TransitionResult<()> {
        let storage = storage(&[100, 0])?;
        validate_transfer(&signed(0, 1, 10, 1, 0), token(), &storage, &DevScheme)?;

        assert_eq!(
            validate_transfer(&signed(0, 1, 10, 1, 1), token(), &storage, &DevScheme),
            Err(TransitionError::BadNonce {
                expected: 0,
                got: 1
            })
        );
        let forged = OffchainTx::new(0, 1, 10.into(), 1.into(), 0)
            .with_signature(DevKeypair::from_seed(1).sign(&signed(0, 1, 10, 1, 0).message()));
        assert_eq!(
            validate_transfer(&forged, token(), &storage, &DevScheme),
            Err(TransitionError::BadSignature)
        );
        assert_eq!(
            validate_transfer(
                &OffchainTx::new(0, 1, 10.into(), 1.into(), 0),
                token(),
                &storage,
                &DevScheme
            ),
            Err(TransitionError::MissingSignature)
        );
        assert_eq!(
            validate_transfer(&signed(0, 3, 10, 1, 0), token(), &storage, &DevScheme),
            Err(TransitionError::Storage(StorageError::NotFound(3)))
        );
        assert_eq!(storage.state.staged_len(), 0);

        Ok(())
    }

    #[test]
    fn apply_moves_amount_and_leaves_fee_pending() -> TransitionResult<()> {
        let mut storage = storage(&[100, 0])?;
        apply_transfer(&signed(0, 1, 10, 1, 0).to_compressed(), token(), &mut storage.state)?;

        let sender = storage.state.get(0)?;
        assert_eq!(sender.balance, U256::from(89));
        assert_eq!(sender.nonce, 1);
        assert_eq!(storage.state.get(1)?.balance, U256::from(10));

        Ok(())
    }

    #[test]
    fn receiver_credit_checks_token() -> TransitionResult<()> {
        let mut storage = storage(&[100])?;
        assert_eq!(
            process_receiver(&mut storage.state, 0, U256::one(), U256::from(5)),
            Err(TransitionError::WrongTokenId {
                expected: U256::from(5),
                got: token()
            })
        );
        assert_eq!(storage.state.staged_len(), 0);

        Ok(())
    }

    fn replayable(txs: &[OffchainTx], fee_receiver: u32) -> TransitionResult<TransferCommitment> {
        let mut scratch = storage(&[100, 50, 0])?;
        for tx in txs {
            apply_transfer(&tx.to_compressed(), token(), &mut scratch.state)?;
        }
        let fees = txs.iter().fold(U256::zero(), |acc, tx| acc + tx.transfer.fee);
        process_receiver(&mut scratch.state, fee_receiver, fees, token())?;
        scratch.state.commit();
        Ok(TransferCommitment::from_txs(
            txs,
            scratch.state.root(),
            scratch.pubkey.root(),
            fee_receiver,
            &DevScheme,
        )?)
    }

    #[test]
    fn replay_reaches_the_declared_root() -> TransitionResult<()> {
        let txs = [signed(0, 1, 10, 1, 0), signed(1, 2, 20, 2, 0)];
        let commitment = replayable(&txs, 2)?;

        let mut storage = storage(&[100, 50, 0])?;
        replay_commitment(&commitment, &mut storage, 32)?;
        assert_eq!(storage.state.root(), commitment.state_root);
        assert_eq!(storage.state.get(2)?.balance, U256::from(23));

        Ok(())
    }

    #[test]
    fn replay_reports_a_root_mismatch() -> TransitionResult<()> {
        let mut commitment = replayable(&[signed(0, 1, 10, 1, 0)], 2)?;
        commitment.state_root = H256::zero();

        let mut storage = storage(&[100, 50, 0])?;
        let err = replay_commitment(&commitment, &mut storage, 32).unwrap_err();
        assert!(matches!(err, TransitionError::StateRootMismatch { .. }));

        Ok(())
    }

    #[test]
    fn replay_bounds_the_tx_count() -> TransitionResult<()> {
        let txs = [signed(0, 1, 10, 1, 0), signed(1, 2, 20, 2, 0)];
        let commitment = replayable(&txs, 2)?;
        let mut storage = storage(&[100, 50, 0])?;
        assert_eq!(
            replay_commitment(&commitment, &mut storage, 1),
            Err(TransitionError::TooManyTx { count: 2, max: 1 })
        );

        let empty = TransferCommitment::from_txs(&[], H256::zero(), H256::zero(), 0, &DevScheme)?;
        assert_eq!(
            replay_commitment(&empty, &mut storage, 32),
            Err(TransitionError::EmptyCommitment)
        );

        Ok(())
    }

    #[test]
    fn failed_replay_leaves_nothing_staged() -> TransitionResult<()> {
        // The second transfer overdraws state 1 once replayed out of context.
        let commitment = replayable(&[signed(0, 1, 10, 1, 0), signed(1, 2, 55, 1, 0)], 2)?;
        let mut storage = storage(&[100, 0, 0])?;
        let root = storage.state.root();

        let err = replay_commitment(&commitment, &mut storage, 32).unwrap_err();
        assert!(matches!(err, TransitionError::InsufficientFunds { .. }));
        assert_eq!(storage.state.staged_len(), 0);
        assert_eq!(storage.state.root(), root);

        Ok(())
    }
}
