use std::fs;

use anyhow::{ensure, Context, Result};
use ethereum_types::U256;
use merkle_store::StorageEngine;
use rollup_common::DeploymentParameters;
use rollup_executor::chain::LocalChain;
use rollup_executor::packer::{BatchPackingCommand, TransferPackingCommand};
use rollup_executor::replay::{BatchDispatcher, BatchType, NewBatchEvent, TransferHandlingStrategy};
use rollup_executor::signature::{DevKeypair, DevScheme};
use rollup_executor::simulator::{SimulatedUser, TransferSimulator};
use rollup_executor::state::{Genesis, GenesisAccount, MemoryStorage};
use tracing::info;

use super::cli::SimulateArgs;
use super::report::BatchReport;

const TOKEN_ID: u64 = 1;

pub(crate) async fn run(mut params: DeploymentParameters, args: SimulateArgs) -> Result<()> {
    if let Some(commitments) = args.commitments {
        params.max_commit_per_batch = commitments;
    }
    let users: Vec<_> = (0..args.users)
        .map(|state_id| SimulatedUser {
            state_id,
            keypair: DevKeypair::from_seed(state_id.into()),
        })
        .collect();
    let genesis = Genesis {
        accounts: users
            .iter()
            .map(|user| GenesisAccount {
                state_id: user.state_id,
                pubkey_id: user.state_id,
                pubkey: user.keypair.pubkey,
                token_id: TOKEN_ID.into(),
                balance: U256::from(args.balance),
                nonce: 0,
            })
            .collect(),
    };
    if let Some(path) = &args.genesis_out {
        fs::write(path, serde_json::to_vec_pretty(&genesis)?)
            .with_context(|| format!("Failed to write genesis to {}", path.display()))?;
    }

    let storage = MemoryStorage::from_genesis(&params, &genesis)?;
    let replica = storage.clone();
    let pool = TransferSimulator::new(users, &storage.state, args.seed)?;
    let chain = LocalChain::new();
    let mut command = TransferPackingCommand {
        params: params.clone(),
        storage,
        pool,
        verifier: DevScheme,
        submitter: chain.clone(),
    };

    let tx_hash = command.pack_and_submit().await?;
    info!(tx_hash = ?tx_hash, "Batch submitted");
    if let Some(path) = &args.calldata_out {
        let submission = chain
            .submissions()
            .await
            .pop()
            .context("Submitted batch is missing")?;
        fs::write(path, hex::encode(submission.calldata))
            .with_context(|| format!("Failed to write calldata to {}", path.display()))?;
    }

    let account_root = command.storage.pubkey.root();
    let mut dispatcher = BatchDispatcher::new(TransferHandlingStrategy::new(chain, replica, params));
    let batch = dispatcher
        .handle(&NewBatchEvent {
            batch_id: 1,
            account_root,
            batch_type: BatchType::Transfer,
            tx_hash,
        })
        .await?;

    let state_root = command.storage.state.root();
    let replayed_root = dispatcher.transfer.storage().state.root();
    ensure!(
        replayed_root == state_root,
        "Replica diverged: packed {state_root:#x}, replayed {replayed_root:#x}"
    );

    BatchReport::new(tx_hash, &batch, state_root).print()
}
