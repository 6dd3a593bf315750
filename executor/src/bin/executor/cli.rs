use std::path::PathBuf;

use anyhow::ensure;
use clap::{Args, Parser, Subcommand, ValueHint};
use ethereum_types::H256;
use merkle_store::tree::MAX_TREE_DEPTH;
use rollup_common::DeploymentParameters;

const PARAMS_HELP_HEADING: &str = "Deployment parameters";

/// Rollup transfer executor
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[clap(flatten)]
    pub(crate) params: CliDeploymentParameters,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Packs a batch of simulated transfers, then replays it on a fresh
    /// replica and checks that both reach the same state root.
    Simulate(SimulateArgs),
    /// Replays `submitTransfer` calldata on top of a genesis file.
    Replay(ReplayArgs),
}

#[derive(Args)]
pub(crate) struct SimulateArgs {
    /// Number of simulated users.
    #[arg(short, long, default_value_t = 8)]
    pub(crate) users: u32,
    /// Upper bound on commitments in the batch. Defaults to
    /// MAX_COMMIT_PER_BATCH.
    #[arg(short, long)]
    pub(crate) commitments: Option<usize>,
    /// Starting balance of every user.
    #[arg(short, long, default_value_t = 1_000_000_000)]
    pub(crate) balance: u64,
    /// Seed for picking transfer receivers.
    #[arg(long, default_value_t = 0)]
    pub(crate) seed: u64,
    /// Where to write the generated genesis, as JSON.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub(crate) genesis_out: Option<PathBuf>,
    /// Where to write the submitted calldata, as hex.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub(crate) calldata_out: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct ReplayArgs {
    /// Genesis JSON file.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub(crate) genesis: PathBuf,
    /// File holding the calldata as hex.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub(crate) calldata: PathBuf,
    /// Account root recorded with the batch. Defaults to the root of the
    /// genesis account tree.
    #[arg(short, long, value_parser = parse_h256)]
    pub(crate) account_root: Option<H256>,
}

/// Deployment parameters of the rollup contracts.
#[derive(Args, Clone, Debug)]
pub(crate) struct CliDeploymentParameters {
    /// Maximum number of transactions in one commitment.
    #[arg(long, env = "EXECUTOR_MAX_TXS_PER_COMMIT", help_heading = PARAMS_HELP_HEADING, default_value_t = 32)]
    max_txs_per_commit: usize,
    /// Maximum number of commitments in one batch.
    #[arg(long, env = "EXECUTOR_MAX_COMMIT_PER_BATCH", help_heading = PARAMS_HELP_HEADING, default_value_t = 32)]
    max_commit_per_batch: usize,
    /// Depth of the state tree.
    #[arg(long, env = "EXECUTOR_STATE_TREE_DEPTH", help_heading = PARAMS_HELP_HEADING, default_value_t = 32)]
    state_tree_depth: usize,
    /// Depth of the account tree.
    #[arg(long, env = "EXECUTOR_PUBKEY_TREE_DEPTH", help_heading = PARAMS_HELP_HEADING, default_value_t = 32)]
    pubkey_tree_depth: usize,
    /// Depth of deposit subtrees.
    #[arg(long, env = "EXECUTOR_MAX_DEPOSIT_SUBTREE_DEPTH", help_heading = PARAMS_HELP_HEADING, default_value_t = 2)]
    max_deposit_subtree_depth: usize,
    /// Stake sent with every batch, in wei.
    #[arg(long, env = "EXECUTOR_STAKE_AMOUNT", help_heading = PARAMS_HELP_HEADING, default_value_t = 100_000_000_000_000_000)]
    stake_amount: u128,
}

impl TryFrom<CliDeploymentParameters> for DeploymentParameters {
    type Error = anyhow::Error;

    fn try_from(cli: CliDeploymentParameters) -> anyhow::Result<Self> {
        for (name, depth) in [
            ("state tree", cli.state_tree_depth),
            ("pubkey tree", cli.pubkey_tree_depth),
        ] {
            ensure!(
                depth <= MAX_TREE_DEPTH,
                "{name} depth {depth} exceeds the maximum of {MAX_TREE_DEPTH}"
            );
        }
        ensure!(
            cli.max_deposit_subtree_depth <= cli.state_tree_depth,
            "deposit subtree depth {} exceeds the state tree depth {}",
            cli.max_deposit_subtree_depth,
            cli.state_tree_depth
        );

        Ok(Self {
            max_txs_per_commit: cli.max_txs_per_commit,
            max_commit_per_batch: cli.max_commit_per_batch,
            state_tree_depth: cli.state_tree_depth,
            pubkey_tree_depth: cli.pubkey_tree_depth,
            max_deposit_subtree_depth: cli.max_deposit_subtree_depth,
            stake_amount: cli.stake_amount.into(),
        })
    }
}

pub(crate) fn parse_h256(s: &str) -> anyhow::Result<H256> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    ensure!(bytes.len() == 32, "expected 32 bytes, got {}", bytes.len());
    Ok(H256::from_slice(&bytes))
}
