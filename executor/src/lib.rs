//! Off-chain executor of a rollup.
//!
//! The executor mirrors the rollup's state and account trees in
//! [`merkle_store`] engines. On one side it validates user transfers, applies
//! them and packs them into [`TransferCommitment`]s that are submitted in
//! [`Batch`]es. On the other it replays batches submitted by others to stay in
//! sync with the chain.
//!
//! - [`tx`]: wire forms of a transfer.
//! - [`state_transition`]: per-transfer rules and commitment replay.
//! - [`packer`]: pool to batch, and submission.
//! - [`replay`]: chain event to local state.
//!
//! [`TransferCommitment`]: commitment::TransferCommitment
//! [`Batch`]: commitment::Batch

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod calldata;
pub mod chain;
pub mod commitment;
pub mod packer;
pub mod pool;
pub mod replay;
#[cfg(test)]
mod replay_test;
pub mod signature;
pub mod simulator;
pub mod state;
pub mod state_transition;
#[cfg(test)]
pub(crate) mod testing_utils;
pub mod tracing;
pub mod tx;
pub mod utils;
