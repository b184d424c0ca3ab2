//! First-come-first-served: no bias, callers proceed in whatever order they
//! win the monitor's lock.

use super::{PairTable, Policy};
use crate::petrinet::TransitionPair;

pub struct FcfsPolicy {
    table: PairTable,
}

impl FcfsPolicy {
    pub fn new(pairs: &[TransitionPair], seed: Option<u64>) -> Self {
        Self {
            table: PairTable::new(pairs, seed),
        }
    }
}

impl Policy for FcfsPolicy {
    fn pair_table(&self) -> &PairTable {
        &self.table
    }

    fn pair_table_mut(&mut self) -> &mut PairTable {
        &mut self.table
    }

    fn can_fire_transition(&self, _transition: usize) -> bool {
        true
    }
}
