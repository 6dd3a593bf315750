use ethereum_types::H256;
use merkle_store::{MemoryEngine, StorageEngine};

use crate::calldata::SubmitTransferCall;
use crate::chain::LocalChain;
use crate::packer::{pack_batch, BatchPackingCommand, TransferPackingCommand};
use crate::pool::TransferPool;
use crate::replay::{
    BatchDispatcher, BatchHandlingStrategy, BatchType, NewBatchEvent, ReplayError,
    TransferHandlingStrategy,
};
use crate::signature::DevScheme;
use crate::simulator::TransferSimulator;
use crate::state::{MemoryStorage, Pubkey, State};
use crate::state_transition::TransitionError;
use crate::testing_utils::{common_setup, signed, storage, test_params, users, TOKEN};

type TestResult = anyhow::Result<()>;

const BALANCES: [u64; 4] = [1_000_000, 300_000, 45_000, 8_000];

fn event(account_root: H256, batch_type: BatchType, tx_hash: H256) -> NewBatchEvent {
    NewBatchEvent {
        batch_id: 1,
        account_root,
        batch_type,
        tx_hash,
    }
}

type Replica = TransferHandlingStrategy<LocalChain, MemoryEngine<State>, MemoryEngine<Pubkey>>;

fn replica(chain: &LocalChain) -> anyhow::Result<Replica> {
    let params = test_params(8);
    let storage = storage(&params, &BALANCES)?;
    Ok(TransferHandlingStrategy::new(chain.clone(), storage, params))
}

#[tokio::test]
async fn submitted_batch_is_replayed_by_a_replica() -> TestResult {
    common_setup();
    let params = test_params(8);
    let chain = LocalChain::new();
    let storage = storage(&params, &BALANCES)?;
    let pool = TransferSimulator::new(users(BALANCES.len()), &storage.state, 7)?;
    let mut command = TransferPackingCommand {
        params: params.clone(),
        storage,
        pool,
        verifier: DevScheme,
        submitter: chain.clone(),
    };

    let tx_hash = command.pack_and_submit().await?;

    let submissions = chain.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].tx_hash, tx_hash);
    assert_eq!(submissions[0].value, params.stake_amount);

    let mut dispatcher = BatchDispatcher::new(replica(&chain)?);
    let account_root = command.storage.pubkey.root();
    let batch = dispatcher
        .handle(&event(account_root, BatchType::Transfer, tx_hash))
        .await?;

    assert_eq!(batch.commitments.len(), params.max_commit_per_batch);
    assert!(batch.commitments.iter().all(|c| c.account_root == account_root));
    assert_eq!(
        dispatcher.transfer.storage().state.root(),
        command.storage.state.root()
    );

    Ok(())
}

#[tokio::test]
async fn parsed_batch_matches_the_packed_one() -> TestResult {
    common_setup();
    let params = test_params(8);
    let mut packer = storage(&params, &BALANCES)?;
    let mut pool = TransferPool::new(TOKEN.into(), 3);
    pool.push(signed(0, 1, 1_000, 10, 0))?;
    pool.push(signed(1, 2, 2_000, 20, 0))?;
    let packed = pack_batch(&mut pool, &mut packer, &params, &DevScheme)?;

    let chain = LocalChain::new();
    let calldata = SubmitTransferCall::from_batch(&packed.batch).encode();
    let tx_hash = chain.record(calldata, params.stake_amount).await;

    let strategy = replica(&chain)?;
    let parsed = strategy
        .parse_batch(&event(packer.pubkey.root(), BatchType::Transfer, tx_hash))
        .await?;
    assert_eq!(parsed, packed.batch);
    assert_eq!(parsed.commitment_root(), packed.batch.commitment_root());

    Ok(())
}

#[tokio::test]
async fn unknown_transaction_fails_to_fetch() -> TestResult {
    common_setup();
    let chain = LocalChain::new();
    let mut dispatcher = BatchDispatcher::new(replica(&chain)?);

    let err = dispatcher
        .handle(&event(H256::zero(), BatchType::Transfer, H256::repeat_byte(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Fetch(_)));

    Ok(())
}

#[tokio::test]
async fn other_batch_types_are_not_handled() -> TestResult {
    common_setup();
    let chain = LocalChain::new();
    let mut dispatcher = BatchDispatcher::new(replica(&chain)?);

    for batch_type in [
        BatchType::Genesis,
        BatchType::MassMigration,
        BatchType::Create2Transfer,
        BatchType::Deposit,
    ] {
        let err = dispatcher
            .handle(&event(H256::zero(), batch_type, H256::zero()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedBatchType(t) if t == batch_type));
    }
    assert!(matches!(
        BatchType::try_from(9),
        Err(ReplayError::UnknownBatchType(9))
    ));
    assert_eq!(BatchType::try_from(1)?, BatchType::Transfer);

    Ok(())
}

#[tokio::test]
async fn divergent_commitment_stops_the_replay() -> TestResult {
    common_setup();
    let params = test_params(8);
    let mut packer: MemoryStorage = storage(&params, &BALANCES)?;
    let mut pool = TransferPool::new(TOKEN.into(), 3);
    pool.push(signed(0, 1, 1_000, 10, 0))?;
    let mut packed = pack_batch(&mut pool, &mut packer, &params, &DevScheme)?;
    packed.batch.commitments[0].state_root = H256::repeat_byte(0xee);

    let mut strategy = replica(&LocalChain::new())?;
    let err = strategy.process_batch(&packed.batch).await.unwrap_err();

    assert!(matches!(
        err,
        ReplayError::Commitment {
            index: 0,
            source: TransitionError::StateRootMismatch { .. }
        }
    ));

    Ok(())
}
