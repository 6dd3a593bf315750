use ethereum_types::H256;
use rollup_executor::commitment::Batch;
use serde::Serialize;

/// What gets printed once a batch went through.
#[derive(Debug, Serialize)]
pub(crate) struct BatchReport {
    pub(crate) tx_hash: H256,
    pub(crate) commitment_root: H256,
    pub(crate) state_root: H256,
    pub(crate) commitments: Vec<CommitmentReport>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommitmentReport {
    pub(crate) state_root: H256,
    pub(crate) body_root: H256,
    pub(crate) fee_receiver: u32,
    pub(crate) txs: usize,
}

impl BatchReport {
    pub(crate) fn new(tx_hash: H256, batch: &Batch, state_root: H256) -> Self {
        Self {
            tx_hash,
            commitment_root: batch.commitment_root(),
            state_root,
            commitments: batch
                .commitments
                .iter()
                .map(|c| CommitmentReport {
                    state_root: c.state_root,
                    body_root: c.body_root(),
                    fee_receiver: c.fee_receiver,
                    txs: c.tx_count(),
                })
                .collect(),
        }
    }

    pub(crate) fn print(&self) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(std::io::stdout().lock(), self)?;
        println!();
        Ok(())
    }
}
