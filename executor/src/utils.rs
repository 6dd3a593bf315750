//! `abi.encodePacked`-style byte building.

use ethereum_types::{H256, U256};
use keccak_hash::keccak;

/// Big-endian 32-byte form of `value`.
pub fn u256_to_bytes(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

pub fn h256_to_u256(value: H256) -> U256 {
    U256::from_big_endian(value.as_bytes())
}

/// Concatenates fields without padding or length prefixes, like solidity's
/// `abi.encodePacked`. Fixed size fields still occupy a full word.
#[derive(Clone, Debug, Default)]
pub struct Packed(Vec<u8>);

impl Packed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uint(mut self, value: impl Into<U256>) -> Self {
        self.0.extend_from_slice(&u256_to_bytes(value.into()));
        self
    }

    pub fn bytes32(mut self, value: H256) -> Self {
        self.0.extend_from_slice(value.as_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.0.extend_from_slice(value);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// `keccak256(abi.encodePacked(...))`.
    pub fn keccak(self) -> H256 {
        keccak(self.0)
    }
}
