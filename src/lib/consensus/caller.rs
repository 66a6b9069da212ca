//! Per-position base calling.
//!
//! A [`BaseClassifier`] turns the bases observed at one reference position into a single
//! called base. [`MajorityVote`] is the default policy; trained models plug in through the
//! same trait and are treated as opaque.

use std::fmt;

use scmo_dna::{BASES, NO_CALL_BASE};

use crate::consensus::PositionObservations;

/// Calls a consensus base from the observations at one reference position.
///
/// Returning `None` omits the position from the consensus. The engine does not validate the
/// returned base.
pub trait BaseClassifier: Send + Sync {
    /// Calls the base for `observations`.
    fn call(&self, observations: &PositionObservations) -> Option<u8>;

    /// Name used in log messages.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// The most frequently observed base wins.
///
/// Ties are resolved deterministically:
/// - a tie that includes the reference base resolves to the reference base,
/// - any other tie resolves to the alphabetically smallest base.
///
/// `N` and other non-`ACGT` observations do not vote. A position observed only as `N` is
/// called `N`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MajorityVote;

impl BaseClassifier for MajorityVote {
    fn call(&self, observations: &PositionObservations) -> Option<u8> {
        if observations.depth() == 0 {
            return None;
        }
        let counts = observations.base_counts();
        let best = counts.iter().copied().max().unwrap_or(0);
        if best == 0 {
            return Some(NO_CALL_BASE);
        }

        let mut winners = BASES.iter().zip(counts).filter(|(_, count)| *count == best);
        if let Some(reference) = observations.reference_base {
            if winners.clone().any(|(&base, _)| base == reference) {
                return Some(reference);
            }
        }
        winners.next().map(|(&base, _)| base)
    }

    fn name(&self) -> &str {
        "majority-vote"
    }
}

impl fmt::Display for MajorityVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
