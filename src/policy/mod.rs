//! Scheduling policies.
//!
//! When several transitions are enabled at once, a policy decides which
//! caller is admitted and which one is deferred. Policies are stateless with
//! respect to the net itself: the only state they carry is a [`PairTable`]
//! with the tracked transition pairs, a fire count per tracked transition and
//! the RNG used for unbiased selection.
//!
//! The three variants form a closed set:
//!
//! - [`FcfsPolicy`]: no bias, every transition is always admitted.
//! - [`BalancedPolicy`]: a tracked pair converges to a 1:1 firing ratio,
//!   always resolving in favor of whichever side is behind.
//! - [`PrioritizedPolicy`]: the first member of a tracked pair converges to
//!   a configured share of the pair's firings.
//!
//! Policies carry no locking. Every method is invoked with the monitor's
//! lock held, which also serializes the RNG.

pub mod balanced;
pub mod fcfs;
pub mod prioritized;

pub use balanced::BalancedPolicy;
pub use fcfs::FcfsPolicy;
pub use prioritized::PrioritizedPolicy;

use std::collections::HashMap;

use clap::ValueEnum;
use lazy_static::lazy_static;
use rand::{Rng, SeedableRng, rngs::StdRng};
use regex::Regex;

use crate::petrinet::{NetError, TransitionPair};

/// A scheduling strategy. See the module docs for the variants.
pub trait Policy: Send {
    fn pair_table(&self) -> &PairTable;

    fn pair_table_mut(&mut self) -> &mut PairTable;

    /// Pure admission predicate over the internal counters.
    fn can_fire_transition(&self, transition: usize) -> bool;

    /// Record a successful firing.
    fn transition_fired(&mut self, transition: usize) {
        self.pair_table_mut().record(transition);
    }

    /// The subset of `enabled` the policy currently favors: everything that
    /// is untracked, plus every tracked transition its counters admit.
    fn preferred_transitions(&self, enabled: &[usize]) -> Vec<usize> {
        enabled
            .iter()
            .copied()
            .filter(|&t| !self.pair_table().is_tracked(t) || self.can_fire_transition(t))
            .collect()
    }

    /// Choose one transition among the candidate set (`candidates[t]` true
    /// for eligible `t`).
    ///
    /// The choice is uniform among candidates; when the pick belongs to a
    /// tracked pair whose partner is also a candidate, the admission
    /// predicate arbitrates between the two.
    fn next_transition(&mut self, candidates: &[bool]) -> Option<usize> {
        let choice = self.pair_table_mut().random_enabled(candidates)?;
        if let Some(partner) = self.pair_table().partner(choice) {
            if candidates.get(partner).copied().unwrap_or(false) {
                return Some(if self.can_fire_transition(choice) {
                    choice
                } else {
                    partner
                });
            }
        }
        Some(choice)
    }
}

/// Shared policy state: tracked pairs, fire counts and the selection RNG.
pub struct PairTable {
    pairs: Vec<TransitionPair>,
    counts: HashMap<usize, u64>,
    rng: StdRng,
}

impl PairTable {
    pub fn new(pairs: &[TransitionPair], seed: Option<u64>) -> Self {
        let mut counts = HashMap::new();
        for pair in pairs {
            counts.insert(pair.a, 0);
            counts.insert(pair.b, 0);
        }
        Self {
            pairs: pairs.to_vec(),
            counts,
            rng: seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64),
        }
    }

    pub fn pairs(&self) -> &[TransitionPair] {
        &self.pairs
    }

    pub fn is_tracked(&self, transition: usize) -> bool {
        self.counts.contains_key(&transition)
    }

    /// The other member of `transition`'s pair, if it has one.
    pub fn partner(&self, transition: usize) -> Option<usize> {
        self.pair_of(transition).map(|pair| {
            if pair.a == transition {
                pair.b
            } else {
                pair.a
            }
        })
    }

    pub fn pair_of(&self, transition: usize) -> Option<&TransitionPair> {
        self.pairs
            .iter()
            .find(|pair| pair.a == transition || pair.b == transition)
    }

    pub fn count(&self, transition: usize) -> u64 {
        self.counts.get(&transition).copied().unwrap_or(0)
    }

    pub fn record(&mut self, transition: usize) {
        if let Some(count) = self.counts.get_mut(&transition) {
            *count += 1;
        }
    }

    /// Uniformly random index among the set candidates, or `None`.
    pub fn random_enabled(&mut self, candidates: &[bool]) -> Option<usize> {
        let set: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter_map(|(t, &on)| on.then(|| t))
            .collect();
        if set.is_empty() {
            None
        } else {
            Some(set[self.rng.random_range(0..set.len())])
        }
    }
}

/// Policy selector for the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    Fcfs,
    Balanced,
    Prioritized,
}

/// Instantiate the selected policy over the configured pairs.
pub fn make_policy(
    kind: PolicyKind,
    pairs: &[TransitionPair],
    seed: Option<u64>,
) -> Box<dyn Policy> {
    match kind {
        PolicyKind::Fcfs => Box::new(FcfsPolicy::new(pairs, seed)),
        PolicyKind::Balanced => Box::new(BalancedPolicy::new(pairs, seed)),
        PolicyKind::Prioritized => Box::new(PrioritizedPolicy::new(pairs, seed)),
    }
}

/// Parse a `A:B` or `A:B@SHARE` pair spec from the command line. The share
/// applies to `A` under the prioritized policy and defaults to one half.
pub fn parse_pair_spec(spec: &str) -> Result<TransitionPair, NetError> {
    lazy_static! {
        static ref PAIR_RE: Regex =
            Regex::new(r"^([0-9]+):([0-9]+)(?:@(0?\.[0-9]+))?$").unwrap();
    }

    let captures = PAIR_RE
        .captures(spec)
        .ok_or_else(|| NetError::MalformedConfig(format!("bad pair spec \"{}\"", spec)))?;

    let parse_index = |m: regex::Match| {
        m.as_str()
            .parse::<usize>()
            .map_err(|_| NetError::MalformedConfig(format!("bad pair spec \"{}\"", spec)))
    };

    Ok(TransitionPair {
        a: parse_index(captures.get(1).unwrap())?,
        b: parse_index(captures.get(2).unwrap())?,
        priority_share: captures
            .get(3)
            .map_or(Ok(0.5), |m| {
                m.as_str()
                    .parse::<f64>()
                    .map_err(|_| NetError::MalformedConfig(format!("bad pair spec \"{}\"", spec)))
            })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<TransitionPair> {
        vec![TransitionPair {
            a: 2,
            b: 3,
            priority_share: 0.75,
        }]
    }

    #[test]
    fn untracked_transitions_have_no_partner() {
        let table = PairTable::new(&pairs(), Some(1));
        assert_eq!(table.partner(2), Some(3));
        assert_eq!(table.partner(3), Some(2));
        assert_eq!(table.partner(0), None);
        assert!(!table.is_tracked(0));
    }

    #[test]
    fn record_only_touches_tracked_counters() {
        let mut table = PairTable::new(&pairs(), Some(1));
        table.record(2);
        table.record(7);
        assert_eq!(table.count(2), 1);
        assert_eq!(table.count(7), 0);
    }

    #[test]
    fn random_enabled_picks_only_set_candidates() {
        let mut table = PairTable::new(&pairs(), Some(1));
        assert_eq!(table.random_enabled(&[false, false]), None);
        for _ in 0..32 {
            let pick = table.random_enabled(&[false, true, false, true]).unwrap();
            assert!(pick == 1 || pick == 3);
        }
    }

    #[test]
    fn pair_spec_with_share() {
        let pair = parse_pair_spec("2:3@0.75").unwrap();
        assert_eq!((pair.a, pair.b), (2, 3));
        assert!((pair.priority_share - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn pair_spec_share_defaults_to_half() {
        let pair = parse_pair_spec("6:7").unwrap();
        assert_eq!((pair.a, pair.b), (6, 7));
        assert!((pair.priority_share - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_pair_specs_are_rejected() {
        for spec in ["", "2", "2:", ":3", "a:b", "2:3@", "2:3@2.0"] {
            assert!(parse_pair_spec(spec).is_err(), "accepted {:?}", spec);
        }
    }

    #[test]
    fn selection_defers_to_admission_inside_a_pair() {
        let mut policy = BalancedPolicy::new(&pairs(), Some(7));
        policy.transition_fired(2); // 2 is now ahead

        let mut candidates = vec![false; 4];
        candidates[2] = true;
        candidates[3] = true;
        // Whatever the random pick, arbitration resolves to the side behind.
        for _ in 0..16 {
            assert_eq!(policy.next_transition(&candidates), Some(3));
        }
    }

    #[test]
    fn selection_returns_lone_candidate_directly() {
        let mut policy = FcfsPolicy::new(&pairs(), Some(7));
        let mut candidates = vec![false; 8];
        candidates[5] = true;
        assert_eq!(policy.next_transition(&candidates), Some(5));
        assert_eq!(policy.next_transition(&[false; 8]), None);
    }
}
