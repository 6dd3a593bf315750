//! Commitments and batches of them.

use std::fmt;

use ethereum_types::H256;
use keccak_hash::keccak;
use merkle_store::Tree;
use serde::{Deserialize, Serialize};

use crate::signature::{Signature, SignatureScheme};
use crate::tx::{CodecError, CompressedTx, OffchainTx, COMPRESSED_TX_LENGTH};
use crate::utils::Packed;

/// The result of packing one group of transfers: the state root after they
/// were applied, and a body binding everything needed to replay them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransferCommitment {
    pub state_root: H256,
    pub account_root: H256,
    pub signature: Signature,
    pub fee_receiver: u32,
    /// Concatenated [`CompressedTx`] records.
    #[serde(with = "hex_bytes")]
    pub txs: Vec<u8>,
}

/// What the rollup contract stores per commitment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompressedStruct {
    pub state_root: H256,
    pub body_root: H256,
}

/// Proof that a commitment is the `path`-th leaf of a batch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommitmentInclusionProof {
    pub commitment: CompressedStruct,
    pub path: u32,
    pub witness: Vec<H256>,
}

impl TransferCommitment {
    /// Aggregates the signatures of `txs` and compresses them in order.
    pub fn from_txs<V: SignatureScheme>(
        txs: &[OffchainTx],
        state_root: H256,
        account_root: H256,
        fee_receiver: u32,
        scheme: &V,
    ) -> Result<Self, CodecError> {
        let signatures = txs
            .iter()
            .map(|tx| tx.signature.ok_or(CodecError::MissingSignature))
            .collect::<Result<Vec<_>, _>>()?;
        let mut compressed = Vec::with_capacity(txs.len() * COMPRESSED_TX_LENGTH);
        for tx in txs {
            compressed.extend(tx.to_compressed().serialize()?);
        }

        Ok(Self {
            state_root,
            account_root,
            signature: scheme.aggregate(&signatures),
            fee_receiver,
            txs: compressed,
        })
    }

    /// `keccak256(abi.encodePacked(accountRoot, signature, feeReceiver, txs))`
    pub fn body_root(&self) -> H256 {
        Packed::new()
            .bytes32(self.account_root)
            .uint(self.signature.0[0])
            .uint(self.signature.0[1])
            .uint(self.fee_receiver)
            .bytes(&self.txs)
            .keccak()
    }

    /// Leaf of this commitment in its batch's commitment tree.
    pub fn hash(&self) -> H256 {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.state_root.as_bytes());
        buf[32..].copy_from_slice(self.body_root().as_bytes());
        keccak(buf)
    }

    pub fn to_compressed_struct(&self) -> CompressedStruct {
        CompressedStruct {
            state_root: self.state_root,
            body_root: self.body_root(),
        }
    }

    pub fn decompress_txs(&self) -> Result<Vec<CompressedTx>, CodecError> {
        if self.txs.len() % COMPRESSED_TX_LENGTH != 0 {
            return Err(CodecError::InvalidBlob {
                record: COMPRESSED_TX_LENGTH,
                got: self.txs.len(),
            });
        }
        self.txs
            .chunks(COMPRESSED_TX_LENGTH)
            .map(CompressedTx::deserialize)
            .collect()
    }

    pub fn tx_count(&self) -> usize {
        self.txs.len() / COMPRESSED_TX_LENGTH
    }
}

/// Commitments submitted together.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub commitments: Vec<TransferCommitment>,
}

impl Batch {
    pub fn new(commitments: Vec<TransferCommitment>) -> Self {
        Self { commitments }
    }

    fn tree(&self) -> Tree {
        let leaves: Vec<_> = self.commitments.iter().map(|c| c.hash()).collect();
        Tree::merklize(&leaves)
    }

    /// Root of the tree whose leaves are the commitment hashes.
    pub fn commitment_root(&self) -> H256 {
        self.tree().root()
    }

    /// Inclusion proof of the `index`-th commitment, or `None` if there is no
    /// such commitment.
    pub fn proof(&self, index: usize) -> Option<CommitmentInclusionProof> {
        let commitment = self.commitments.get(index)?;
        let tree = self.tree();
        Some(CommitmentInclusionProof {
            commitment: commitment.to_compressed_struct(),
            path: index as u32,
            witness: tree.witness(index as u64, tree.depth()),
        })
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Batch commitments {} txs {} root {:#x}>",
            self.commitments.len(),
            self.commitments.iter().map(|c| c.tx_count()).sum::<usize>(),
            self.commitment_root()
        )
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
