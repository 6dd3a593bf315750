//! An in-process stand-in for the rollup contract.
//!
//! It accepts submissions and serves their calldata back by transaction
//! hash, which is all a packer and a replica need to exchange batches
//! without a node.

use std::sync::Arc;

use anyhow::anyhow;
use ethereum_types::{H256, U256};
use keccak_hash::keccak;
use tokio::sync::Mutex;

use crate::packer::BatchSubmitter;
use crate::replay::CalldataSource;
use crate::utils::Packed;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submission {
    pub tx_hash: H256,
    pub calldata: Vec<u8>,
    pub value: U256,
}

/// Clones share the same submissions.
#[derive(Clone, Debug, Default)]
pub struct LocalChain {
    submissions: Arc<Mutex<Vec<Submission>>>,
}

impl LocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a submission and returns its transaction hash.
    pub async fn record(&self, calldata: Vec<u8>, value: U256) -> H256 {
        let mut submissions = self.submissions.lock().await;
        // The position keeps identical resubmissions apart.
        let tx_hash = Packed::new()
            .uint(submissions.len())
            .bytes32(keccak(&calldata))
            .keccak();
        submissions.push(Submission {
            tx_hash,
            calldata,
            value,
        });
        tx_hash
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }
}

impl BatchSubmitter for LocalChain {
    async fn submit(&self, calldata: Vec<u8>, value: U256) -> anyhow::Result<H256> {
        Ok(self.record(calldata, value).await)
    }
}

impl CalldataSource for LocalChain {
    async fn calldata(&self, tx_hash: H256) -> anyhow::Result<Vec<u8>> {
        self.submissions
            .lock()
            .await
            .iter()
            .find(|submission| submission.tx_hash == tx_hash)
            .map(|submission| submission.calldata.clone())
            .ok_or_else(|| anyhow!("Unknown transaction {tx_hash:#x}"))
    }
}
