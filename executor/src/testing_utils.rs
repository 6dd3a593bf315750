use ethereum_types::U256;
use merkle_store::StorageResult;
use rollup_common::DeploymentParameters;

use crate::signature::DevKeypair;
use crate::simulator::SimulatedUser;
use crate::state::{Genesis, GenesisAccount, MemoryStorage};
use crate::tx::OffchainTx;

pub(crate) const TOKEN: u64 = 1;

pub(crate) fn common_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small trees so that tests stay fast.
pub(crate) fn test_params(max_txs_per_commit: usize) -> DeploymentParameters {
    DeploymentParameters {
        max_txs_per_commit,
        max_commit_per_batch: 4,
        state_tree_depth: 4,
        pubkey_tree_depth: 4,
        ..Default::default()
    }
}

/// One user per balance, each with its own key, all holding [`TOKEN`].
pub(crate) fn genesis(balances: &[u64]) -> Genesis {
    let accounts = balances
        .iter()
        .enumerate()
        .map(|(i, balance)| GenesisAccount {
            state_id: i as u32,
            pubkey_id: i as u32,
            pubkey: DevKeypair::from_seed(i as u64).pubkey,
            token_id: TOKEN.into(),
            balance: (*balance).into(),
            nonce: 0,
        })
        .collect();
    Genesis { accounts }
}

pub(crate) fn storage(
    params: &DeploymentParameters,
    balances: &[u64],
) -> StorageResult<MemoryStorage> {
    MemoryStorage::from_genesis(params, &genesis(balances))
}

pub(crate) fn users(count: usize) -> Vec<SimulatedUser> {
    (0..count)
        .map(|i| SimulatedUser {
            state_id: i as u32,
            keypair: DevKeypair::from_seed(i as u64),
        })
        .collect()
}

/// A transfer signed by the key [`genesis`] gives to `from`.
pub(crate) fn signed(from: u32, to: u32, amount: u64, fee: u64, nonce: u32) -> OffchainTx {
    let tx = OffchainTx::new(from, to, U256::from(amount), U256::from(fee), nonce);
    let signature = DevKeypair::from_seed(from.into()).sign(&tx.message());
    tx.with_signature(signature)
}
