//! Leaf types of the state and account trees, and the pair of engines that
//! hold them.

use ethereum_types::{H256, U256};
use merkle_store::{Hashable, MemoryEngine, StorageEngine, StorageResult};
use rollup_common::DeploymentParameters;
use serde::{Deserialize, Serialize};

use crate::signature::PublicKey;
use crate::utils::Packed;

/// A balance of one token, owned by one registered public key.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub pubkey_id: u32,
    pub token_id: U256,
    pub balance: U256,
    pub nonce: u32,
}

impl Hashable for State {
    fn hash(&self) -> H256 {
        Packed::new()
            .uint(self.pubkey_id)
            .uint(self.token_id)
            .uint(self.balance)
            .uint(self.nonce)
            .keccak()
    }
}

/// A leaf of the account registry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pubkey(pub PublicKey);

impl Hashable for Pubkey {
    fn hash(&self) -> H256 {
        let Pubkey(PublicKey(coordinates)) = self;
        coordinates
            .iter()
            .fold(Packed::new(), |packed, coordinate| packed.uint(*coordinate))
            .keccak()
    }
}

/// The state tree and the account registry. The registry root is what
/// commitments carry as their account root.
#[derive(Clone, Debug)]
pub struct StorageManager<S, P> {
    pub state: S,
    pub pubkey: P,
}

pub type MemoryStorage = StorageManager<MemoryEngine<State>, MemoryEngine<Pubkey>>;

impl MemoryStorage {
    /// Empty engines sized by `params`.
    pub fn new(params: &DeploymentParameters) -> Self {
        Self {
            state: MemoryEngine::new(params.state_tree_depth),
            pubkey: MemoryEngine::new(params.pubkey_tree_depth),
        }
    }

    /// Engines holding `genesis`, committed.
    pub fn from_genesis(params: &DeploymentParameters, genesis: &Genesis) -> StorageResult<Self> {
        let mut storage = Self::new(params);
        for account in &genesis.accounts {
            storage
                .pubkey
                .update(account.pubkey_id.into(), Pubkey(account.pubkey))?;
            storage.state.create(
                account.state_id.into(),
                State {
                    pubkey_id: account.pubkey_id,
                    token_id: account.token_id,
                    balance: account.balance,
                    nonce: account.nonce,
                },
            )?;
        }
        storage.pubkey.commit();
        storage.state.commit();
        Ok(storage)
    }
}

/// Initial contents of both trees.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    pub accounts: Vec<GenesisAccount>,
}

/// One state leaf together with the key it belongs to. Several accounts may
/// share a `pubkey_id`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub state_id: u32,
    pub pubkey_id: u32,
    pub pubkey: PublicKey,
    pub token_id: U256,
    pub balance: U256,
    #[serde(default)]
    pub nonce: u32,
}
