use std::fs::{self, File};
use std::io::BufReader;

use anyhow::{Context, Result};
use merkle_store::StorageEngine;
use rollup_common::DeploymentParameters;
use rollup_executor::chain::LocalChain;
use rollup_executor::replay::{BatchDispatcher, BatchType, NewBatchEvent, TransferHandlingStrategy};
use rollup_executor::state::{Genesis, MemoryStorage};

use super::cli::ReplayArgs;
use super::report::BatchReport;

pub(crate) async fn run(params: DeploymentParameters, args: ReplayArgs) -> Result<()> {
    let file = File::open(&args.genesis)
        .with_context(|| format!("Failed to open {}", args.genesis.display()))?;
    let genesis: Genesis = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse genesis {}", args.genesis.display()))?;
    let storage = MemoryStorage::from_genesis(&params, &genesis)?;

    let calldata = fs::read_to_string(&args.calldata)
        .with_context(|| format!("Failed to read {}", args.calldata.display()))?;
    let calldata = hex::decode(calldata.trim().trim_start_matches("0x"))
        .context("Calldata is not hex")?;

    let account_root = args.account_root.unwrap_or_else(|| storage.pubkey.root());
    let chain = LocalChain::new();
    let tx_hash = chain.record(calldata, params.stake_amount).await;

    let mut dispatcher = BatchDispatcher::new(TransferHandlingStrategy::new(chain, storage, params));
    let batch = dispatcher
        .handle(&NewBatchEvent {
            batch_id: 0,
            account_root,
            batch_type: BatchType::Transfer,
            tx_hash,
        })
        .await?;

    let state_root = dispatcher.transfer.storage().state.root();
    BatchReport::new(tx_hash, &batch, state_root).print()
}
