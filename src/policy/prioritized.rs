//! Prioritized policy: the first member of each tracked pair converges to a
//! configured share of the pair's total firings.

use super::{PairTable, Policy};
use crate::petrinet::TransitionPair;

pub struct PrioritizedPolicy {
    table: PairTable,
}

impl PrioritizedPolicy {
    pub fn new(pairs: &[TransitionPair], seed: Option<u64>) -> Self {
        Self {
            table: PairTable::new(pairs, seed),
        }
    }
}

impl Policy for PrioritizedPolicy {
    fn pair_table(&self) -> &PairTable {
        &self.table
    }

    fn pair_table_mut(&mut self) -> &mut PairTable {
        &mut self.table
    }

    /// The prioritized member is admitted while its achieved share is below
    /// the target; its partner once the share has reached it. A cold pair
    /// admits its first firing unconditionally, which also keeps the share
    /// computation away from a zero denominator.
    fn can_fire_transition(&self, transition: usize) -> bool {
        let Some(pair) = self.table.pair_of(transition) else {
            return true;
        };

        let prioritized = self.table.count(pair.a);
        let other = self.table.count(pair.b);
        let total = prioritized + other;
        if total == 0 {
            return true;
        }

        let share = prioritized as f64 / total as f64;
        if transition == pair.a {
            share < pair.priority_share
        } else {
            share >= pair.priority_share
        }
    }
}
