use ethereum_types::U256;
use serde::{Deserialize, Serialize};

pub mod float16;

/// Width of a state or pubkey id on the wire.
pub const STATE_ID_LENGTH: usize = 4;

/// Width of an offchain transaction nonce on the wire.
pub const NONCE_LENGTH: usize = 4;

/// Width of a serialized signature: two 32-byte big-endian coordinates.
pub const SIGNATURE_LENGTH: usize = 64;

/// Parameters the rollup contracts were deployed with. The executor must use
/// the same values as the chain, or packed batches will be rejected and
/// replayed ones will diverge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DeploymentParameters {
    /// Upper bound on transactions in one commitment.
    pub max_txs_per_commit: usize,
    /// Upper bound on commitments in one batch.
    pub max_commit_per_batch: usize,
    /// Depth of the state tree.
    pub state_tree_depth: usize,
    /// Depth of the account (pubkey) registry tree.
    pub pubkey_tree_depth: usize,
    /// Depth of the subtrees deposits are grafted in as. Deposits are not
    /// processed here, but the value is part of the deployment and has to fit
    /// in the state tree.
    pub max_deposit_subtree_depth: usize,
    /// Value, in wei, staked with every submitted batch.
    pub stake_amount: U256,
}

impl Default for DeploymentParameters {
    fn default() -> Self {
        Self {
            max_txs_per_commit: 32,
            max_commit_per_batch: 32,
            state_tree_depth: 32,
            pubkey_tree_depth: 32,
            max_deposit_subtree_depth: 2,
            // 0.1 ether.
            stake_amount: eth_to_wei(U256::one()) / 10,
        }
    }
}

/// Converts an amount in `ETH` to `wei` units.
pub fn eth_to_wei(eth: U256) -> U256 {
    // 1 ether = 10^18 wei.
    eth * U256::exp10(18)
}

#[test]
fn test_default_stake() {
    assert_eq!(
        DeploymentParameters::default().stake_amount,
        U256::from(100_000_000_000_000_000u64)
    );
}

#[test]
fn test_parameters_use_contract_names() {
    let json = serde_json::to_value(DeploymentParameters::default()).unwrap();
    assert_eq!(json["MAX_TXS_PER_COMMIT"], 32);
    assert_eq!(json["MAX_DEPOSIT_SUBTREE_DEPTH"], 2);

    let back: DeploymentParameters = serde_json::from_value(json).unwrap();
    assert_eq!(back, DeploymentParameters::default());
}
