//! Execution contexts.

use flow_state::CachedWorldState;
use flow_types::{Encode, Hash, TokenId, TxOutput, U256};

/// World effects accumulated by a stateful execution.
#[derive(Debug, Default)]
pub struct StatefulOutcome {
    /// Tokens minted by the script, with their issued amounts.
    pub issued_tokens: Vec<(TokenId, U256)>,
    /// Asset outputs emitted by the script.
    pub generated_outputs: Vec<TxOutput>,
}

/// The capability set an execution runs with.
///
/// Unlock scripts get the stateless variant; tx scripts the stateful one.
/// The execute loop is generic over the variant: stateful instructions
/// fail with a type mismatch when the context cannot satisfy them.
pub enum Context<'a> {
    /// Read-only: transaction identity only.
    Stateless {
        /// Id of the transaction being unlocked.
        tx_id: Hash,
    },
    /// Read/write: scratch world view plus effect accumulation.
    Stateful {
        /// Id of the executing transaction.
        tx_id: Hash,
        /// Scratch world state; mutations stay here until the caller
        /// persists.
        world: &'a mut CachedWorldState,
        /// Accumulated effects.
        outcome: StatefulOutcome,
        /// Issuance counter feeding token id derivation.
        issuance_counter: u32,
    },
}

impl<'a> Context<'a> {
    /// A stateless context for `tx_id`.
    pub fn stateless(tx_id: Hash) -> Self {
        Context::Stateless { tx_id }
    }

    /// A stateful context over `world` for `tx_id`.
    pub fn stateful(tx_id: Hash, world: &'a mut CachedWorldState) -> Self {
        Context::Stateful {
            tx_id,
            world,
            outcome: StatefulOutcome::default(),
            issuance_counter: 0,
        }
    }

    /// The executing transaction's id.
    pub fn tx_id(&self) -> Hash {
        match self {
            Context::Stateless { tx_id } => *tx_id,
            Context::Stateful { tx_id, .. } => *tx_id,
        }
    }

    /// Mint a fresh token id; `None` in a stateless context.
    pub fn issue_token(&mut self, amount: U256) -> Option<TokenId> {
        match self {
            Context::Stateless { .. } => None,
            Context::Stateful {
                tx_id,
                outcome,
                issuance_counter,
                ..
            } => {
                let mut buf = Vec::with_capacity(36);
                tx_id.encode(&mut buf);
                issuance_counter.encode(&mut buf);
                *issuance_counter += 1;
                let token_id = Hash::hash(&buf);
                outcome.issued_tokens.push((token_id, amount));
                Some(token_id)
            }
        }
    }

    /// Record a script-generated output; `false` in a stateless context.
    pub fn generate_output(&mut self, output: TxOutput) -> bool {
        match self {
            Context::Stateless { .. } => false,
            Context::Stateful { outcome, .. } => {
                outcome.generated_outputs.push(output);
                true
            }
        }
    }

    /// Take the accumulated effects out of a stateful context.
    pub fn into_outcome(self) -> Option<StatefulOutcome> {
        match self {
            Context::Stateless { .. } => None,
            Context::Stateful { outcome, .. } => Some(outcome),
        }
    }
}
