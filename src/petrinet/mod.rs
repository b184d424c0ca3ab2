//! Timed Petri net state machine.
//!
//! A net is a fixed topology (places, transitions, input/output incidence
//! matrices) plus mutable execution state: the current marking, the set of
//! token-enabled transitions, the dwell clocks of timed transitions and the
//! completion counter of the terminal transition.
//!
//! # Core Concepts
//!
//! ## Marking
//!
//! The marking is the token count of every place, kept as a plain vector
//! indexed by place. Firing transition `t` subtracts column `t` of the input
//! matrix and adds column `t` of the output matrix. After every firing the
//! net re-checks that no place went negative and that every declared place
//! invariant (a weight row whose dot product with the marking must equal a
//! constant) still holds; a failure is a [`NetError`] and means the net
//! definition or the caller's locking discipline is broken.
//!
//! ## Enablement
//!
//! A transition is *token-enabled* when every input place holds at least the
//! tokens its arc consumes, and *enabled* when it is token-enabled and, for
//! timed transitions, has remained so for at least its dwell time (see
//! [`timing::TransitionClocks`]).
//!
//! [`PetriNet`] is not internally synchronized. The monitor serializes all
//! access; see [`crate::monitor`].

pub mod config;
pub mod graph;
pub mod timing;

pub use config::{NetConfig, PlaceInvariant, TransitionPair};
pub use timing::TransitionClocks;

use std::{error::Error, fmt, time::Duration};

use itertools::Itertools;
use string_cache::DefaultAtom;

pub type Symbol = DefaultAtom;

/// Errors raised by net construction and firing.
///
/// Only configuration defects and invariant violations surface as errors;
/// an attempt to fire a transition that is merely not ready reports `false`
/// through the ordinary return value instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Transition index outside the configured range.
    InvalidTransition(usize),
    /// Matrices, invariant rows or indices that do not fit together.
    MalformedConfig(String),
    /// A place went below zero tokens after a firing.
    NegativeTokens { place: usize, marking: String },
    /// A place invariant no longer holds after a firing.
    InvariantViolation { row: usize, marking: String },
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::InvalidTransition(idx) => {
                write!(f, "Invalid transition index: {}", idx)
            }
            NetError::MalformedConfig(msg) => write!(f, "Malformed net configuration: {}", msg),
            NetError::NegativeTokens { place, marking } => {
                write!(f, "Negative token count at P{} in marking: {{{}}}", place, marking)
            }
            NetError::InvariantViolation { row, marking } => {
                write!(f, "Fail place invariant {} in marking: {{{}}}", row, marking)
            }
        }
    }
}

impl Error for NetError {}

/// A place: a named token container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    name: Symbol,
    tokens: i64,
}

impl Place {
    pub fn new(name: impl Into<Symbol>, tokens: i64) -> Self {
        Self {
            name: name.into(),
            tokens,
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Token count this place starts the run with.
    pub fn initial_tokens(&self) -> i64 {
        self.tokens
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} tokens)", self.name, self.tokens)
    }
}

/// A transition: an atomic state-change rule with an optional dwell time.
///
/// The dwell time is the minimum continuous-enablement duration before a
/// firing is permitted; zero means the transition is immediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    index: usize,
    name: Symbol,
    dwell: Duration,
}

impl Transition {
    pub fn new(index: usize, dwell: Duration) -> Self {
        Self {
            index,
            name: format!("T{}", index).into(),
            dwell,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    pub fn is_timed(&self) -> bool {
        !self.dwell.is_zero()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The executable net.
pub struct PetriNet {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    input: Vec<Vec<i64>>,
    output: Vec<Vec<i64>>,
    invariants: Vec<PlaceInvariant>,
    marking: Vec<i64>,
    token_enabled: Vec<bool>,
    clocks: TransitionClocks,
    terminal: usize,
    completions: u64,
    completion_target: u64,
    finished: bool,
}

impl PetriNet {
    /// Build a net from a validated configuration.
    pub fn new(config: &NetConfig) -> Result<Self, NetError> {
        config.validate()?;

        let marking: Vec<i64> = config.places.iter().map(Place::initial_tokens).collect();
        let clocks = TransitionClocks::new(config.transitions.iter().map(Transition::dwell));

        let mut net = Self {
            places: config.places.clone(),
            transitions: config.transitions.clone(),
            input: config.input.clone(),
            output: config.output.clone(),
            invariants: config.invariants.clone(),
            marking,
            token_enabled: vec![false; config.transitions.len()],
            clocks,
            terminal: config.terminal,
            completions: 0,
            completion_target: config.completion_target,
            finished: false,
        };
        net.refresh_enabled();
        Ok(net)
    }

    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn transition(&self, index: usize) -> Result<&Transition, NetError> {
        self.check_index(index)?;
        Ok(&self.transitions[index])
    }

    pub fn marking(&self) -> &[i64] {
        &self.marking
    }

    /// Marking snapshot in the form handed to the log sink, e.g. `4, 0, 1, …`.
    pub fn marking_string(&self) -> String {
        self.marking.iter().join(", ")
    }

    pub fn clocks(&self) -> &TransitionClocks {
        &self.clocks
    }

    /// True iff every input place of `index` holds enough tokens.
    pub fn is_token_enabled(&self, index: usize) -> Result<bool, NetError> {
        self.check_index(index)?;
        Ok(self.token_enabled[index])
    }

    /// Token enablement and, for timed transitions, elapsed dwell.
    pub fn is_transition_enabled(&self, index: usize) -> Result<bool, NetError> {
        self.check_index(index)?;
        Ok(self.token_enabled[index] && self.clocks.check_time(index))
    }

    /// Indices of all currently token-enabled transitions, ascending.
    pub fn enabled_transitions(&self) -> Vec<usize> {
        self.token_enabled
            .iter()
            .enumerate()
            .filter_map(|(t, &on)| on.then(|| t))
            .collect()
    }

    /// Token-enabled set as a bitmask, bit `t` for transition `t`.
    pub fn token_enabled_mask(&self) -> u64 {
        self.token_enabled
            .iter()
            .enumerate()
            .fold(0u64, |mask, (t, &on)| if on { mask | (1 << t) } else { mask })
    }

    /// Attempt to fire a transition.
    ///
    /// Returns `Ok(false)` without mutation when the transition is not
    /// enabled (tokens or dwell). On success the marking is updated, the
    /// invariants re-checked, the enabled set recomputed and the dwell
    /// clocks advanced with the enablement delta. Firing the terminal
    /// transition counts toward the completion target; once reached, the
    /// finished flag is set and never reverts.
    ///
    /// An invariant violation or negative marking entry is returned as a
    /// fatal [`NetError`]: it signals a broken net definition or caller
    /// synchronization, and the net must not be trusted afterwards.
    pub fn try_fire_transition(&mut self, index: usize) -> Result<bool, NetError> {
        self.check_index(index)?;
        if !(self.token_enabled[index] && self.clocks.check_time(index)) {
            return Ok(false);
        }

        for place in 0..self.places.len() {
            self.marking[place] += self.output[place][index] - self.input[place][index];
        }
        self.check_marking()?;

        if index == self.terminal {
            self.completions += 1;
            if self.completions >= self.completion_target {
                self.finished = true;
            }
        }

        self.refresh_enabled();
        Ok(true)
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }

    /// Monotonic: false until the completion target is reached, then true.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn check_index(&self, index: usize) -> Result<(), NetError> {
        if index >= self.transitions.len() {
            return Err(NetError::InvalidTransition(index));
        }
        Ok(())
    }

    fn check_marking(&self) -> Result<(), NetError> {
        if let Some(place) = self.marking.iter().position(|&tokens| tokens < 0) {
            return Err(NetError::NegativeTokens {
                place,
                marking: self.marking_string(),
            });
        }

        for (row, invariant) in self.invariants.iter().enumerate() {
            let sum: i64 = invariant
                .weights
                .iter()
                .zip(&self.marking)
                .map(|(weight, tokens)| weight * tokens)
                .sum();
            if sum != invariant.target {
                return Err(NetError::InvariantViolation {
                    row,
                    marking: self.marking_string(),
                });
            }
        }
        Ok(())
    }

    fn refresh_enabled(&mut self) {
        for t in 0..self.transitions.len() {
            self.token_enabled[t] = (0..self.places.len())
                .all(|place| self.marking[place] >= self.input[place][t]);
        }
        self.clocks.update(&self.token_enabled);
    }
}
