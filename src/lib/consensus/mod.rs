//! Positional consensus over the reads of a molecule.
//!
//! Consensus building happens in two steps. [`collect_observations`] walks the matches-only
//! aligned pairs of every read and gathers, per `(contig, position)`, the observed read bases
//! and the reference base when the record carries it (MD tag). [`build_consensus`] then asks
//! a [`BaseClassifier`] to call each position, dropping thinly supported positions unless
//! the caller explicitly allows them.
//!
//! Positions are 0-based. The result is a [`BTreeMap`] so iteration order (and any tag built
//! from it) is stable between runs.

pub mod caller;

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScmoError};
use crate::record::AlignmentRecord;
use crate::reference::ReferenceSequence;

pub use caller::{BaseClassifier, MajorityVote};

/// Called base per `(contig, 0-based position)`.
pub type Consensus = BTreeMap<(String, usize), u8>;

/// Default minimum number of observations for a position to be called without
/// `allow_unsafe`.
pub const DEFAULT_MIN_SUPPORT: usize = 2;

/// Options for consensus building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusOptions {
    /// Observations required at a position unless unsafe calls are allowed
    pub min_support: usize,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self { min_support: DEFAULT_MIN_SUPPORT }
    }
}

impl ConsensusOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::InvalidParameter`] when `min_support` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.min_support == 0 {
            return Err(ScmoError::invalid_parameter("min_support", "must be at least 1"));
        }
        Ok(())
    }
}

/// Everything observed at one reference position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionObservations {
    /// Contig name
    pub contig: String,
    /// 0-based reference position
    pub position: usize,
    /// Uppercase reference base, when known
    pub reference_base: Option<u8>,
    /// Uppercase read bases, in read order
    pub bases: Vec<u8>,
}

impl PositionObservations {
    /// Empty observations for a position.
    #[must_use]
    pub fn new(contig: &str, position: usize) -> Self {
        Self { contig: contig.to_string(), position, reference_base: None, bases: Vec::new() }
    }

    /// Adds an observed base.
    pub fn push(&mut self, base: u8) {
        self.bases.push(base.to_ascii_uppercase());
    }

    /// Number of observations.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.bases.len()
    }

    /// Counts of `A`, `C`, `G` and `T`, in that order.
    #[must_use]
    pub fn base_counts(&self) -> [u32; 4] {
        let mut counts = [0u32; 4];
        for base in &self.bases {
            let idx = match base {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => continue,
            };
            counts[idx] += 1;
        }
        counts
    }
}

/// Observations per `(contig, position)`.
pub type Observations = BTreeMap<(String, usize), PositionObservations>;

/// Gathers the bases of every aligned (M/=/X) position of `reads`.
///
/// Reference bases derived from the records overwrite each other, so the last read to
/// report a position wins.
pub fn collect_observations<'a, R, I>(reads: I) -> Observations
where
    R: AlignmentRecord + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut observations = Observations::new();
    for read in reads {
        let Some(contig) = read.reference_name() else {
            continue;
        };
        let sequence = read.sequence();
        for pair in read.aligned_pairs() {
            let Some(&base) = sequence.get(pair.query_pos) else {
                continue;
            };
            let entry = observations
                .entry((contig.to_string(), pair.ref_pos))
                .or_insert_with(|| PositionObservations::new(contig, pair.ref_pos));
            entry.push(base);
            if pair.ref_base.is_some() {
                entry.reference_base = pair.ref_base;
            }
        }
    }
    observations
}

/// Fills in reference bases that the records could not provide, fetching each contig's
/// observed interval once.
///
/// Lookup failures leave the reference base unknown.
pub fn fill_reference_bases(observations: &mut Observations, reference: &dyn ReferenceSequence) {
    let mut bounds: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for ((contig, position), obs) in observations.iter() {
        if obs.reference_base.is_none() {
            let entry = bounds.entry(contig.clone()).or_insert((*position, *position + 1));
            entry.0 = entry.0.min(*position);
            entry.1 = entry.1.max(*position + 1);
        }
    }

    for (contig, (start, end)) in bounds {
        let bases = match reference.fetch(&contig, start, end) {
            Ok(bases) => bases,
            Err(e) => {
                debug!("Reference bases unavailable for {contig}:{start}-{end}: {e}");
                continue;
            }
        };
        for (offset, base) in bases.into_iter().enumerate() {
            if let Some(obs) = observations.get_mut(&(contig.clone(), start + offset)) {
                obs.reference_base.get_or_insert(base);
            }
        }
    }
}

/// Calls every observed position with `classifier`.
///
/// Without `allow_unsafe`, positions with fewer than `min_support` observations are omitted.
///
/// # Errors
///
/// Returns [`ScmoError::Consensus`] when there are no observations at all.
pub fn build_consensus(
    observations: &Observations,
    classifier: &dyn BaseClassifier,
    min_support: usize,
    allow_unsafe: bool,
) -> Result<Consensus> {
    if observations.is_empty() {
        return Err(ScmoError::Consensus {
            reason: "no read has an aligned base".to_string(),
        });
    }

    let consensus = observations
        .iter()
        .filter(|(_, obs)| allow_unsafe || obs.depth() >= min_support)
        .filter_map(|(key, obs)| classifier.call(obs).map(|base| (key.clone(), base)))
        .collect();
    Ok(consensus)
}
