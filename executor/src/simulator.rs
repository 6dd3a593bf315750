//! An endless [`TransferSource`] for load testing and local runs.

use std::collections::HashMap;

use ethereum_types::U256;
use merkle_store::StorageEngine;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rollup_common::float16::{self, FLOAT16_MAX};
use tracing::trace;

use crate::pool::{PoolError, TransferPipe, TransferSource};
use crate::signature::DevKeypair;
use crate::state::State;
use crate::tx::OffchainTx;

/// A simulated user: a dev key and the state it spends from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimulatedUser {
    pub state_id: u32,
    pub keypair: DevKeypair,
}

/// Generates signed transfers between a fixed group of users, for as long as
/// any of them has something to send.
///
/// Senders take turns in order, skipping users whose balance is too small;
/// each sends a tenth of its balance to a random other user, paying a tenth
/// of that as fee. The first user's state decides the token and receives the
/// fees.
///
/// The simulator keeps its own copy of every user's state, updated as if each
/// generated transfer were accepted, because the engine it reads from at
/// construction is being written by the packer while pipes are pulled.
#[derive(Debug)]
pub struct TransferSimulator {
    users: Vec<SimulatedUser>,
    shadow: HashMap<u32, State>,
    token_id: U256,
    fee_receiver_id: u32,
    next_sender: usize,
    rng: StdRng,
}

impl TransferSimulator {
    pub fn new<S: StorageEngine<State>>(
        users: Vec<SimulatedUser>,
        engine: &S,
        seed: u64,
    ) -> Result<Self, PoolError> {
        let first = match users.len() {
            0 | 1 => return Err(PoolError::NotEnoughUsers(users.len())),
            _ => users[0],
        };
        let shadow = users
            .iter()
            .map(|user| Ok((user.state_id, engine.get(user.state_id.into())?)))
            .collect::<Result<HashMap<_, _>, PoolError>>()?;
        let token_id = shadow[&first.state_id].token_id;

        Ok(Self {
            users,
            shadow,
            token_id,
            fee_receiver_id: first.state_id,
            next_sender: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Amount and fee `state` would send next. A zero amount means the user
    /// is too poor to send anything.
    fn next_amounts(state: &State) -> (U256, U256) {
        let amount = round_down(state.balance / 10);
        (amount, round_down(amount / 10))
    }

    /// The next transfer, or `None` once no user can afford one.
    fn generate(&mut self) -> Option<OffchainTx> {
        let count = self.users.len();
        let sender_index = (0..count)
            .map(|i| (self.next_sender + i) % count)
            .find(|i| {
                let state = &self.shadow[&self.users[*i].state_id];
                !Self::next_amounts(state).0.is_zero()
            })?;
        self.next_sender = (sender_index + 1) % count;
        let mut receiver_index = self.rng.gen_range(0..count - 1);
        if receiver_index >= sender_index {
            receiver_index += 1;
        }
        let sender = self.users[sender_index];
        let receiver = self.users[receiver_index];

        let state = self.shadow.entry(sender.state_id).or_default();
        let (amount, fee) = Self::next_amounts(state);
        let tx = OffchainTx::new(sender.state_id, receiver.state_id, amount, fee, state.nonce);
        state.balance = state.balance.saturating_sub(amount + fee);
        state.nonce = state.nonce.wrapping_add(1);
        let receiver = self.shadow.entry(receiver.state_id).or_default();
        receiver.balance = receiver.balance.saturating_add(amount);
        let fee_receiver = self.shadow.entry(self.fee_receiver_id).or_default();
        fee_receiver.balance = fee_receiver.balance.saturating_add(fee);

        let signature = sender.keypair.sign(&tx.message());
        let tx = tx.with_signature(signature);
        trace!(%tx, "Simulated transfer");
        Some(tx)
    }
}

fn round_down(value: U256) -> U256 {
    float16::round(value.min(FLOAT16_MAX)).unwrap_or_default()
}

impl TransferSource for TransferSimulator {
    fn is_empty(&self) -> bool {
        self.shadow
            .values()
            .all(|state| Self::next_amounts(state).0.is_zero())
    }

    fn next_pipe(&mut self) -> TransferPipe<'_> {
        let token_id = self.token_id;
        let fee_receiver_id = self.fee_receiver_id;
        TransferPipe {
            source: Box::new(std::iter::from_fn(move || self.generate())),
            token_id,
            fee_receiver_id,
        }
    }
}
