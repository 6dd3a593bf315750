//! ABI codec for the rollup's `submitTransfer` call.
//!
//! A submitted batch is not stored on-chain in full; replicas recover it from
//! the calldata of the submitting transaction.

use ethereum_types::{H256, U256};
use itertools::izip;
use keccak_hash::keccak;
use thiserror::Error;

use crate::commitment::{Batch, TransferCommitment};
use crate::signature::Signature;
use crate::utils::u256_to_bytes;

const WORD: usize = 32;

/// An error type for calldata decoding.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CalldataError {
    #[error("Calldata is {0} bytes, too short for a selector")]
    TooShort(usize),

    #[error("Unexpected selector 0x{}", hex::encode(.0))]
    WrongSelector([u8; 4]),

    #[error("Read of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },

    /// An offset or length word is larger than any calldata could be.
    #[error("Word at offset {0} is too large for an offset or length")]
    ValueTooLarge(usize),

    #[error("Fee receiver {0} does not fit in a state id")]
    FeeReceiverOverflow(U256),

    #[error(
        "Argument arrays differ in length: {state_roots} state roots, {signatures} signatures, \
         {fee_receivers} fee receivers, {txss} tx blobs"
    )]
    LengthMismatch {
        state_roots: usize,
        signatures: usize,
        fee_receivers: usize,
        txss: usize,
    },
}

/// Arguments of
/// `submitTransfer(bytes32[] stateRoots, uint256[2][] signatures, uint256[] feeReceivers, bytes[] txss)`,
/// one entry per commitment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubmitTransferCall {
    pub state_roots: Vec<H256>,
    pub signatures: Vec<Signature>,
    pub fee_receivers: Vec<u32>,
    pub txss: Vec<Vec<u8>>,
}

impl SubmitTransferCall {
    pub const SIGNATURE: &'static str = "submitTransfer(bytes32[],uint256[2][],uint256[],bytes[])";

    pub fn selector() -> [u8; 4] {
        let hash = keccak(Self::SIGNATURE.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn from_batch(batch: &Batch) -> Self {
        let commitments = &batch.commitments;
        Self {
            state_roots: commitments.iter().map(|c| c.state_root).collect(),
            signatures: commitments.iter().map(|c| c.signature).collect(),
            fee_receivers: commitments.iter().map(|c| c.fee_receiver).collect(),
            txss: commitments.iter().map(|c| c.txs.clone()).collect(),
        }
    }

    /// Rebuilds the batch. The account root is not part of the call; it is
    /// the one the contract recorded with the batch.
    pub fn into_batch(self, account_root: H256) -> Result<Batch, CalldataError> {
        let lengths = [
            self.state_roots.len(),
            self.signatures.len(),
            self.fee_receivers.len(),
            self.txss.len(),
        ];
        if lengths.iter().any(|len| *len != lengths[0]) {
            return Err(CalldataError::LengthMismatch {
                state_roots: lengths[0],
                signatures: lengths[1],
                fee_receivers: lengths[2],
                txss: lengths[3],
            });
        }

        let commitments = izip!(
            self.state_roots,
            self.signatures,
            self.fee_receivers,
            self.txss
        )
        .map(
            |(state_root, signature, fee_receiver, txs)| TransferCommitment {
                state_root,
                account_root,
                signature,
                fee_receiver,
                txs,
            },
        )
        .collect();
        Ok(Batch::new(commitments))
    }

    pub fn encode(&self) -> Vec<u8> {
        let sections = [
            words(
                self.state_roots.len(),
                self.state_roots.iter().map(|root| root.0),
            ),
            words(
                self.signatures.len(),
                self.signatures
                    .iter()
                    .flat_map(|signature| signature.0.map(u256_to_bytes)),
            ),
            words(
                self.fee_receivers.len(),
                self.fee_receivers
                    .iter()
                    .map(|receiver| u256_to_bytes((*receiver).into())),
            ),
            byte_strings(&self.txss),
        ];

        let mut out = Self::selector().to_vec();
        let mut offset = sections.len() * WORD;
        for section in &sections {
            out.extend(word(offset));
            offset += section.len();
        }
        for section in sections {
            out.extend(section);
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CalldataError> {
        if data.len() < 4 {
            return Err(CalldataError::TooShort(data.len()));
        }
        let (selector, args) = data.split_at(4);
        if selector != Self::selector() {
            return Err(CalldataError::WrongSelector([
                selector[0],
                selector[1],
                selector[2],
                selector[3],
            ]));
        }

        let args = Reader(args);
        let state_roots = args.static_array(args.offset(0)?, 1, |at| Ok(H256(*args.word(at)?)))?;
        let signatures = args.static_array(args.offset(WORD)?, 2, |at| {
            Ok(Signature([args.uint(at)?, args.uint(at + WORD)?]))
        })?;
        let fee_receivers = args.static_array(args.offset(2 * WORD)?, 1, |at| {
            let receiver = args.uint(at)?;
            match receiver > U256::from(u32::MAX) {
                true => Err(CalldataError::FeeReceiverOverflow(receiver)),
                false => Ok(receiver.low_u32()),
            }
        })?;
        let txss = args.byte_strings(args.offset(3 * WORD)?)?;

        Ok(Self {
            state_roots,
            signatures,
            fee_receivers,
            txss,
        })
    }
}

fn word(value: usize) -> [u8; WORD] {
    u256_to_bytes(value.into())
}

/// A dynamic array of static items: length, then the items in place.
fn words(len: usize, items: impl Iterator<Item = [u8; WORD]>) -> Vec<u8> {
    let mut out = word(len).to_vec();
    for item in items {
        out.extend(item);
    }
    out
}

/// A `bytes[]`: length, one offset per item relative to the end of the
/// length word, then each item as length and right-padded data.
fn byte_strings(items: &[Vec<u8>]) -> Vec<u8> {
    let mut head = word(items.len()).to_vec();
    let mut tail = Vec::new();
    for item in items {
        head.extend(word(items.len() * WORD + tail.len()));
        tail.extend(word(item.len()));
        tail.extend(item);
        tail.resize(tail.len().next_multiple_of(WORD), 0);
    }
    head.extend(tail);
    head
}

/// Bounds-checked reads over the argument area.
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], CalldataError> {
        offset
            .checked_add(len)
            .and_then(|end| self.0.get(offset..end))
            .ok_or(CalldataError::OutOfBounds { offset, len })
    }

    fn word(&self, at: usize) -> Result<&'a [u8; WORD], CalldataError> {
        let slice = self.slice(at, WORD)?;
        slice
            .try_into()
            .map_err(|_| CalldataError::OutOfBounds { offset: at, len: WORD })
    }

    fn uint(&self, at: usize) -> Result<U256, CalldataError> {
        Ok(U256::from_big_endian(self.word(at)?))
    }

    /// An offset or length, which can never exceed the calldata itself.
    fn offset(&self, at: usize) -> Result<usize, CalldataError> {
        let value = self.uint(at)?;
        match value > U256::from(self.0.len()) {
            true => Err(CalldataError::ValueTooLarge(at)),
            false => Ok(value.as_usize()),
        }
    }

    /// Reads a length at `at` and checks that `len * item_size` bytes follow.
    fn length(&self, at: usize, item_size: usize) -> Result<usize, CalldataError> {
        let len = self.offset(at)?;
        let body = len
            .checked_mul(item_size)
            .ok_or(CalldataError::ValueTooLarge(at))?;
        self.slice(at + WORD, body)?;
        Ok(len)
    }

    fn static_array<T>(
        &self,
        at: usize,
        words_per_item: usize,
        mut item: impl FnMut(usize) -> Result<T, CalldataError>,
    ) -> Result<Vec<T>, CalldataError> {
        let stride = words_per_item * WORD;
        let len = self.length(at, stride)?;
        (0..len).map(|i| item(at + WORD + i * stride)).collect()
    }

    fn byte_strings(&self, at: usize) -> Result<Vec<Vec<u8>>, CalldataError> {
        let len = self.length(at, WORD)?;
        let base = at + WORD;
        (0..len)
            .map(|i| {
                let start = base + self.offset(base + i * WORD)?;
                let bytes = self.length(start, 1)?;
                let padded = self.slice(start + WORD, bytes.next_multiple_of(WORD))?;
                Ok(padded[..bytes].to_vec())
            })
            .collect()
    }
}
