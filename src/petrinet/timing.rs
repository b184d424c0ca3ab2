//! Dwell-time clocks for timed transitions.
//!
//! Each transition carries an alpha (its minimum continuous-enablement
//! duration) and an enable timestamp. The timestamp runs only while the
//! transition is token-enabled: it is set on a disabled→enabled edge and
//! cleared on an enabled→disabled edge. Stable observations leave it alone,
//! so dwell time already accumulated is never discarded by a re-check.

use std::time::{Duration, Instant};

pub struct TransitionClocks {
    alpha: Vec<Duration>,
    /// `None` stands in for the "infinite" timestamp: the clock is not
    /// running and `check_time` can never be satisfied by elapsing time.
    enabled_since: Vec<Option<Instant>>,
    previously_enabled: Vec<bool>,
}

impl TransitionClocks {
    pub fn new(alphas: impl IntoIterator<Item = Duration>) -> Self {
        let alpha: Vec<Duration> = alphas.into_iter().collect();
        let len = alpha.len();
        Self {
            alpha,
            enabled_since: vec![None; len],
            previously_enabled: vec![false; len],
        }
    }

    pub fn alpha(&self, index: usize) -> Duration {
        self.alpha[index]
    }

    /// True iff the transition has dwelled long enough to fire.
    ///
    /// Immediate transitions (alpha zero) are always time-ready; timed ones
    /// require a running clock with at least alpha elapsed.
    pub fn check_time(&self, index: usize) -> bool {
        if self.alpha[index].is_zero() {
            return true;
        }
        match self.enabled_since[index] {
            Some(since) => since.elapsed() >= self.alpha[index],
            None => false,
        }
    }

    /// Dwell time still to elapse; `None` while the clock is not running.
    pub fn remaining(&self, index: usize) -> Option<Duration> {
        let since = self.enabled_since[index]?;
        Some(self.alpha[index].saturating_sub(since.elapsed()))
    }

    /// Feed the new token-enabled set. Edge-triggered only.
    pub fn update(&mut self, token_enabled: &[bool]) {
        let now = Instant::now();
        for (index, &enabled) in token_enabled.iter().enumerate() {
            if enabled && !self.previously_enabled[index] {
                self.enabled_since[index] = Some(now);
            } else if !enabled && self.previously_enabled[index] {
                self.enabled_since[index] = None;
            }
        }
        self.previously_enabled.copy_from_slice(token_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const ALPHA: Duration = Duration::from_millis(30);

    fn clocks() -> TransitionClocks {
        TransitionClocks::new([Duration::ZERO, ALPHA])
    }

    #[test]
    fn immediate_transition_is_always_time_ready() {
        let clocks = clocks();
        assert!(clocks.check_time(0));
    }

    #[test]
    fn timed_transition_requires_elapsed_dwell() {
        let mut clocks = clocks();
        assert!(!clocks.check_time(1));

        clocks.update(&[false, true]);
        assert!(!clocks.check_time(1));
        assert!(clocks.remaining(1).unwrap() <= ALPHA);

        thread::sleep(ALPHA + Duration::from_millis(10));
        assert!(clocks.check_time(1));
        assert_eq!(clocks.remaining(1), Some(Duration::ZERO));
    }

    #[test]
    fn stable_enablement_does_not_restart_the_clock() {
        let mut clocks = clocks();
        clocks.update(&[false, true]);
        thread::sleep(Duration::from_millis(15));

        // Still enabled: the clock must keep its accumulated dwell.
        clocks.update(&[false, true]);
        let remaining = clocks.remaining(1).unwrap();
        assert!(remaining < ALPHA - Duration::from_millis(5));
    }

    #[test]
    fn disable_edge_resets_to_infinite() {
        let mut clocks = clocks();
        clocks.update(&[false, true]);
        thread::sleep(ALPHA + Duration::from_millis(10));
        assert!(clocks.check_time(1));

        clocks.update(&[false, false]);
        assert!(!clocks.check_time(1));
        assert_eq!(clocks.remaining(1), None);

        // Re-enabling starts the dwell from scratch.
        clocks.update(&[false, true]);
        assert!(!clocks.check_time(1));
    }
}
