//! The signature collaborator.
//!
//! Transactions are signed with an aggregatable scheme over a 64-byte G1
//! signature and a 128-byte G2 public key. The executor only needs the three
//! operations of [`SignatureScheme`]; curve arithmetic lives behind it.
//!
//! [`DevScheme`] is an **insecure** stand-in with the same shapes. Anyone who
//! knows a public key can forge its signatures, so it is only fit for tests
//! and local simulation.

use ethereum_types::U256;
use keccak_hash::keccak;
use rollup_common::SIGNATURE_LENGTH;
use serde::{Deserialize, Serialize};

use crate::utils::{h256_to_u256, u256_to_bytes, Packed};

/// A G1 point as two uint256 coordinates.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub [U256; 2]);

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut buf = [0u8; SIGNATURE_LENGTH];
        buf[..32].copy_from_slice(&u256_to_bytes(self.0[0]));
        buf[32..].copy_from_slice(&u256_to_bytes(self.0[1]));
        buf
    }

    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self([
            U256::from_big_endian(&bytes[..32]),
            U256::from_big_endian(&bytes[32..]),
        ])
    }
}

/// A G2 point as four uint256 coordinates.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PublicKey(pub [U256; 4]);

pub trait SignatureScheme {
    /// Combines signatures into one. The result does not depend on the order
    /// of `signatures`.
    fn aggregate(&self, signatures: &[Signature]) -> Signature;

    /// Checks a single signature over `message`.
    fn verify(&self, signature: &Signature, pubkey: &PublicKey, message: &[u8]) -> bool;
}

/// Insecure keyed-hash scheme for tests and simulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevScheme;

impl DevScheme {
    fn sign(pubkey: &PublicKey, message: &[u8]) -> Signature {
        let first = pubkey
            .0
            .iter()
            .fold(Packed::new(), |packed, coordinate| packed.uint(*coordinate))
            .bytes(message)
            .keccak();
        let second = keccak(first.as_bytes());
        Signature([h256_to_u256(first), h256_to_u256(second)])
    }
}

impl SignatureScheme for DevScheme {
    fn aggregate(&self, signatures: &[Signature]) -> Signature {
        signatures
            .iter()
            .fold(Signature::default(), |acc, signature| {
                Signature([
                    acc.0[0].overflowing_add(signature.0[0]).0,
                    acc.0[1].overflowing_add(signature.0[1]).0,
                ])
            })
    }

    fn verify(&self, signature: &Signature, pubkey: &PublicKey, message: &[u8]) -> bool {
        Self::sign(pubkey, message) == *signature
    }
}

/// A [`DevScheme`] identity derived from a seed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DevKeypair {
    pub pubkey: PublicKey,
}

impl DevKeypair {
    pub fn from_seed(seed: u64) -> Self {
        let mut coordinates = [U256::zero(); 4];
        for (i, coordinate) in coordinates.iter_mut().enumerate() {
            *coordinate = h256_to_u256(Packed::new().uint(seed).uint(i as u64).keccak());
        }
        Self {
            pubkey: PublicKey(coordinates),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        DevScheme::sign(&self.pubkey, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_signatures_verify_only_for_their_key_and_message() {
        let alice = DevKeypair::from_seed(1);
        let bob = DevKeypair::from_seed(2);
        let signature = alice.sign(b"hello");

        assert!(DevScheme.verify(&signature, &alice.pubkey, b"hello"));
        assert!(!DevScheme.verify(&signature, &alice.pubkey, b"hellO"));
        assert!(!DevScheme.verify(&signature, &bob.pubkey, b"hello"));
    }

    #[test]
    fn aggregation_is_order_independent() {
        let signatures: Vec<_> = (0..5)
            .map(|seed| DevKeypair::from_seed(seed).sign(b"m"))
            .collect();
        let mut reversed = signatures.clone();
        reversed.reverse();

        assert_eq!(
            DevScheme.aggregate(&signatures),
            DevScheme.aggregate(&reversed)
        );
        assert_eq!(DevScheme.aggregate(&signatures[..1]), signatures[0]);
    }

    #[test]
    fn signature_bytes_are_two_big_endian_words() {
        let signature = Signature([U256::from(1), U256::from(2)]);
        let bytes = signature.to_bytes();
        assert_eq!(bytes[31], 1);
        assert_eq!(bytes[63], 2);
        assert_eq!(Signature::from_bytes(&bytes), signature);
    }
}
