use ethereum_types::{H256, U256};
use keccak_hash::keccak;

use crate::engine::{Hashable, MemoryEngine, StorageEngine};

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// Minimal item: a single word, hashed as its big-endian encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Word(pub(crate) U256);

impl Hashable for Word {
    fn hash(&self) -> H256 {
        let mut buf = [0u8; 32];
        self.0.to_big_endian(&mut buf);
        keccak(buf)
    }
}

pub(crate) fn word(v: u64) -> Word {
    Word(U256::from(v))
}

/// An engine with `ids` created and committed, each holding its own id.
pub(crate) fn committed_engine(depth: usize, ids: &[u64]) -> MemoryEngine<Word> {
    let mut engine = MemoryEngine::new(depth);
    for id in ids {
        engine.create(*id, word(*id)).unwrap();
    }
    engine.commit();
    engine
}
