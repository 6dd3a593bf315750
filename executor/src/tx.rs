//! Wire forms of a transfer.
//!
//! | field        | bytes | form            |
//! |--------------|-------|-----------------|
//! | `from_index` | 4     | big-endian      |
//! | `to_index`   | 4     | big-endian      |
//! | `amount`     | 2     | float16         |
//! | `fee`        | 2     | float16         |
//! | `nonce`      | 4     | big-endian      |
//! | `signature`  | 64    | two uint256     |
//!
//! The compressed form, which is what commitments carry, stops after `fee`.

use std::fmt;

use ethereum_types::{H256, U256};
use keccak_hash::keccak;
use rollup_common::float16::{self, Float16Error, FLOAT_LENGTH};
use rollup_common::{NONCE_LENGTH, SIGNATURE_LENGTH, STATE_ID_LENGTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use winnow::{binary::be_u32, token::take, Parser as _};

use crate::signature::Signature;
use crate::utils::Packed;

pub const COMPRESSED_TX_LENGTH: usize = 2 * STATE_ID_LENGTH + 2 * FLOAT_LENGTH;
pub const OFFCHAIN_TX_LENGTH: usize = COMPRESSED_TX_LENGTH + NONCE_LENGTH + SIGNATURE_LENGTH;

/// An error type for the transaction codec.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CodecError {
    /// Input length differs from the fixed width of the record.
    #[error("Invalid bytes: expected {expected} bytes, got {got}")]
    InvalidBytes { expected: usize, got: usize },

    /// A blob of records is not a whole number of records long.
    #[error("Invalid bytes: {got} is not a multiple of the {record} byte record length")]
    InvalidBlob { record: usize, got: usize },

    #[error("Transaction must be signed before it is serialized")]
    MissingSignature,

    #[error(transparent)]
    Float16(#[from] Float16Error),
}

/// Transaction kinds, as tagged in the signing payload.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    Transfer = 1,
}

/// A transfer as committed on-chain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct CompressedTx {
    pub from_index: u32,
    pub to_index: u32,
    pub amount: U256,
    pub fee: U256,
}

impl CompressedTx {
    pub const TX_TYPE: TxType = TxType::Transfer;

    pub fn new(from_index: u32, to_index: u32, amount: U256, fee: U256) -> Self {
        Self {
            from_index,
            to_index,
            amount,
            fee,
        }
    }

    /// Fails if `amount` or `fee` is not exactly representable as a float16.
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(COMPRESSED_TX_LENGTH);
        buf.extend_from_slice(&self.from_index.to_be_bytes());
        buf.extend_from_slice(&self.to_index.to_be_bytes());
        buf.extend_from_slice(&float16::compress(self.amount)?);
        buf.extend_from_slice(&float16::compress(self.fee)?);
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes, COMPRESSED_TX_LENGTH, compressed_tx)
    }

    /// The payload a sender signs: `abi.encodePacked` of six uint256 words,
    /// with full precision amounts.
    pub fn message(&self, nonce: u32) -> Vec<u8> {
        Packed::new()
            .uint(Self::TX_TYPE as u8)
            .uint(self.from_index)
            .uint(self.to_index)
            .uint(nonce)
            .uint(self.amount)
            .uint(self.fee)
            .into_bytes()
    }
}

/// A transfer as submitted by its sender.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OffchainTx {
    pub transfer: CompressedTx,
    pub nonce: u32,
    pub signature: Option<Signature>,
}

impl OffchainTx {
    /// An unsigned transfer.
    pub fn new(from_index: u32, to_index: u32, amount: U256, fee: U256, nonce: u32) -> Self {
        Self {
            transfer: CompressedTx::new(from_index, to_index, amount, fee),
            nonce,
            signature: None,
        }
    }

    pub fn with_signature(self, signature: Signature) -> Self {
        Self {
            signature: Some(signature),
            ..self
        }
    }

    pub fn to_compressed(&self) -> CompressedTx {
        self.transfer
    }

    pub fn message(&self) -> Vec<u8> {
        self.transfer.message(self.nonce)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let signature = self.signature.ok_or(CodecError::MissingSignature)?;
        let mut buf = self.transfer.serialize()?;
        buf.reserve(NONCE_LENGTH + SIGNATURE_LENGTH);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&signature.to_bytes());
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes, OFFCHAIN_TX_LENGTH, offchain_tx)
    }

    /// Hash of the signed wire form.
    pub fn hash(&self) -> Result<H256, CodecError> {
        Ok(keccak(self.serialize()?))
    }
}

impl fmt::Display for OffchainTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Transfer {}->{} ${} fee {} nonce {}>",
            self.transfer.from_index,
            self.transfer.to_index,
            self.transfer.amount,
            self.transfer.fee,
            self.nonce
        )
    }
}

/// A single place to swap out the error type if required.
type ModalResult<T> = winnow::ModalResult<T, winnow::error::ContextError>;

fn decode<T>(
    bytes: &[u8],
    expected: usize,
    mut parser: impl FnMut(&mut &[u8]) -> ModalResult<T>,
) -> Result<T, CodecError> {
    let invalid = CodecError::InvalidBytes {
        expected,
        got: bytes.len(),
    };
    if bytes.len() != expected {
        return Err(invalid);
    }
    parser.parse(bytes).map_err(|_| invalid)
}

fn compressed_tx(input: &mut &[u8]) -> ModalResult<CompressedTx> {
    (be_u32, be_u32, float, float)
        .map(|(from_index, to_index, amount, fee)| CompressedTx {
            from_index,
            to_index,
            amount,
            fee,
        })
        .parse_next(input)
}

fn offchain_tx(input: &mut &[u8]) -> ModalResult<OffchainTx> {
    (compressed_tx, be_u32, array::<SIGNATURE_LENGTH>)
        .map(|(transfer, nonce, signature)| OffchainTx {
            transfer,
            nonce,
            signature: Some(Signature::from_bytes(&signature)),
        })
        .parse_next(input)
}

fn float(input: &mut &[u8]) -> ModalResult<U256> {
    array::<FLOAT_LENGTH>.map(float16::decompress).parse_next(input)
}

fn array<const N: usize>(input: &mut &[u8]) -> ModalResult<[u8; N]> {
    take(N)
        .try_map(|it: &[u8]| <[u8; N]>::try_from(it))
        .parse_next(input)
}
