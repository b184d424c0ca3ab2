//! Static net configuration: topology, invariants, dwell times, worker
//! sequences and the scheduling pairs tracked by the policies.
//!
//! A [`NetConfig`] is read once at construction time; nothing in it changes
//! during a run. [`NetConfig::agency`] is the built-in travel-agency net the
//! binary executes by default.

use std::time::Duration;

use super::{NetError, Place, Transition};

/// A place invariant: `dot(weights, marking) == target` for every reachable
/// marking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceInvariant {
    pub weights: Vec<i64>,
    pub target: i64,
}

impl PlaceInvariant {
    /// Human-readable form, e.g. `M(P1) + M(P2) = 1`.
    pub fn describe(&self) -> String {
        let terms: Vec<String> = self
            .weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != 0)
            .map(|(p, &w)| {
                if w == 1 {
                    format!("M(P{})", p)
                } else {
                    format!("{}*M(P{})", w, p)
                }
            })
            .collect();
        format!("{} = {}", terms.join(" + "), self.target)
    }
}

/// A tracked transition pair. The policies arbitrate between `a` and `b`;
/// `priority_share` is the long-run share of `a` targeted by the prioritized
/// policy (the balanced policy aims at 1:1 and ignores it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPair {
    pub a: usize,
    pub b: usize,
    pub priority_share: f64,
}

/// Immutable description of a timed Petri net and its execution parameters.
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    /// Input incidence matrix (token consumption), `[place][transition]`.
    pub input: Vec<Vec<i64>>,
    /// Output incidence matrix (token production), `[place][transition]`.
    pub output: Vec<Vec<i64>>,
    pub invariants: Vec<PlaceInvariant>,
    /// The transition whose firings count toward run completion.
    pub terminal: usize,
    pub completion_target: u64,
    /// One transition sequence per worker thread.
    pub sequences: Vec<Vec<usize>>,
    pub pairs: Vec<TransitionPair>,
}

impl NetConfig {
    /// Check that all the pieces fit together.
    pub fn validate(&self) -> Result<(), NetError> {
        let places = self.places.len();
        let transitions = self.transitions.len();

        if places == 0 || transitions == 0 {
            return Err(NetError::MalformedConfig(
                "net needs at least one place and one transition".into(),
            ));
        }

        for (name, matrix) in [("input", &self.input), ("output", &self.output)] {
            if matrix.len() != places {
                return Err(NetError::MalformedConfig(format!(
                    "{} matrix has {} rows, expected {} places",
                    name,
                    matrix.len(),
                    places
                )));
            }
            for (place, row) in matrix.iter().enumerate() {
                if row.len() != transitions {
                    return Err(NetError::MalformedConfig(format!(
                        "{} matrix row {} has {} columns, expected {} transitions",
                        name,
                        place,
                        row.len(),
                        transitions
                    )));
                }
                if row.iter().any(|&arc| arc < 0) {
                    return Err(NetError::MalformedConfig(format!(
                        "{} matrix row {} carries a negative arc weight",
                        name, place
                    )));
                }
            }
        }

        for (row, invariant) in self.invariants.iter().enumerate() {
            if invariant.weights.len() != places {
                return Err(NetError::MalformedConfig(format!(
                    "invariant {} has {} weights, expected {}",
                    row,
                    invariant.weights.len(),
                    places
                )));
            }
        }

        if self.terminal >= transitions {
            return Err(NetError::MalformedConfig(format!(
                "terminal transition {} out of range",
                self.terminal
            )));
        }

        if let Some(&t) = self.sequences.iter().flatten().find(|&&t| t >= transitions) {
            return Err(NetError::MalformedConfig(format!(
                "worker sequence names unknown transition {}",
                t
            )));
        }

        for pair in &self.pairs {
            if pair.a >= transitions || pair.b >= transitions || pair.a == pair.b {
                return Err(NetError::MalformedConfig(format!(
                    "invalid transition pair {}:{}",
                    pair.a, pair.b
                )));
            }
            if !(pair.priority_share > 0.0 && pair.priority_share < 1.0) {
                return Err(NetError::MalformedConfig(format!(
                    "pair {}:{} share {} outside (0, 1)",
                    pair.a, pair.b, pair.priority_share
                )));
            }
        }

        Ok(())
    }

    /// The travel-agency reservation net.
    ///
    /// 15 places, 12 transitions. Customers enter through T0/T1, split over
    /// two reservation desks (T2/T3 feeding the timed T4/T5), and either
    /// cancel (T7, T8) or confirm and pay (T6, T9, T10) before leaving
    /// through the terminal T11. The run completes after T11 has fired the
    /// configured number of times.
    pub fn agency() -> Self {
        const INITIAL_MARKING: [i64; 15] = [5, 1, 0, 0, 5, 0, 1, 1, 0, 0, 1, 0, 0, 0, 0];

        const OUTPUT: [[i64; 12]; 15] = [
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1], // P0
            [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P1
            [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P2
            [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P3
            [0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0], // P4
            [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P5
            [0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0], // P6
            [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0], // P7
            [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0], // P8
            [0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0], // P9
            [0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0], // P10
            [0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0], // P11
            [0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0], // P12
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0], // P13
            [0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0], // P14
        ];

        const INPUT: [[i64; 12]; 15] = [
            [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P0
            [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P1
            [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P2
            [0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0], // P3
            [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P4
            [0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0], // P5
            [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0], // P6
            [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0], // P7
            [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0], // P8
            [0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0], // P9
            [0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0], // P10
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0], // P11
            [0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0], // P12
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0], // P13
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1], // P14
        ];

        // Dwell times in milliseconds; zero means immediate.
        const DWELL_MILLIS: [u64; 12] = [0, 2, 0, 0, 15, 15, 0, 0, 5, 5, 15, 0];

        let invariants = vec![
            PlaceInvariant {
                weights: vec![0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                target: 1,
            },
            PlaceInvariant {
                weights: vec![0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                target: 5,
            },
            PlaceInvariant {
                weights: vec![0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0],
                target: 1,
            },
            PlaceInvariant {
                weights: vec![0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0],
                target: 1,
            },
            PlaceInvariant {
                weights: vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 0],
                target: 1,
            },
            PlaceInvariant {
                weights: vec![1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 1, 1, 1, 1],
                target: 5,
            },
        ];

        Self {
            places: INITIAL_MARKING
                .iter()
                .enumerate()
                .map(|(p, &tokens)| Place::new(format!("P{}", p), tokens))
                .collect(),
            transitions: DWELL_MILLIS
                .iter()
                .enumerate()
                .map(|(t, &millis)| Transition::new(t, Duration::from_millis(millis)))
                .collect(),
            input: INPUT.iter().map(|row| row.to_vec()).collect(),
            output: OUTPUT.iter().map(|row| row.to_vec()).collect(),
            invariants,
            terminal: 11,
            completion_target: 186,
            sequences: vec![
                vec![0, 1],
                vec![2, 5],
                vec![3, 4],
                vec![6, 9, 10],
                vec![7, 8],
                vec![11],
            ],
            pairs: vec![
                TransitionPair {
                    a: 2,
                    b: 3,
                    priority_share: 0.75,
                },
                TransitionPair {
                    a: 6,
                    b: 7,
                    priority_share: 0.80,
                },
            ],
        }
    }

    /// Replace the completion target.
    pub fn with_completion_target(mut self, target: u64) -> Self {
        self.completion_target = target;
        self
    }

    /// Replace every dwell time; shorter-than-net slices leave the tail
    /// immediate. Used to speed up tests and benchmarks.
    pub fn with_dwell_millis(mut self, millis: &[u64]) -> Self {
        self.transitions = (0..self.transitions.len())
            .map(|t| {
                let dwell = millis.get(t).copied().unwrap_or(0);
                Transition::new(t, Duration::from_millis(dwell))
            })
            .collect();
        self
    }

    /// Replace the tracked scheduling pairs.
    pub fn with_pairs(mut self, pairs: Vec<TransitionPair>) -> Self {
        self.pairs = pairs;
        self
    }
}
