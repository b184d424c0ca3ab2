//! Balanced policy: each tracked pair converges to a 1:1 firing ratio.

use super::{PairTable, Policy};
use crate::petrinet::TransitionPair;

pub struct BalancedPolicy {
    table: PairTable,
}

impl BalancedPolicy {
    pub fn new(pairs: &[TransitionPair], seed: Option<u64>) -> Self {
        Self {
            table: PairTable::new(pairs, seed),
        }
    }
}

impl Policy for BalancedPolicy {
    fn pair_table(&self) -> &PairTable {
        &self.table
    }

    fn pair_table_mut(&mut self) -> &mut PairTable {
        &mut self.table
    }

    /// A tracked transition may fire only while its partner has fired at
    /// least as often, so the side that is behind always wins.
    fn can_fire_transition(&self, transition: usize) -> bool {
        match self.table.partner(transition) {
            Some(partner) => self.table.count(partner) >= self.table.count(transition),
            None => true,
        }
    }
}
