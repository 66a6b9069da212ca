//! Metrics collected while clustering fragments into molecules.
//!
//! [`MoleculeMetrics`] counts inputs and outputs and keeps a per-reason tally of rejected
//! molecules. Window-parallel runs produce one instance per window and combine them with
//! [`MoleculeMetrics::merge`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rejection::RejectionReason;

/// A serializable metric type.
pub trait Metric: Serialize + for<'de> Deserialize<'de> + Clone + Default {
    /// Human-readable name used in log messages.
    fn metric_name() -> &'static str;
}

/// Common interface for metrics that count pipeline inputs and outputs.
pub trait ProcessingMetrics {
    /// Items consumed.
    fn total_input(&self) -> u64;

    /// Items produced.
    fn total_output(&self) -> u64;

    /// Items filtered or rejected.
    fn total_filtered(&self) -> u64;

    /// `total_output / total_input` as a percentage.
    fn efficiency(&self) -> f64 {
        if self.total_input() == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let result = self.total_output() as f64 / self.total_input() as f64 * 100.0;
            result
        }
    }
}

/// Counts for one clustering run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeMetrics {
    /// Fragments consumed
    pub input_fragments: u64,
    /// Reads held by the consumed fragments
    pub input_reads: u64,
    /// Molecules emitted
    pub molecules: u64,
    /// Molecules that passed validation
    pub valid_molecules: u64,
    /// Molecules that failed validation
    pub rejected_molecules: u64,
    /// Largest fragment count of any molecule
    pub max_fragments_per_molecule: u64,
    /// Rejected molecules per reason
    pub rejections: BTreeMap<RejectionReason, u64>,
}

impl MoleculeMetrics {
    /// Zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one incoming fragment with `reads` reads.
    pub fn record_fragment(&mut self, reads: usize) {
        self.input_fragments += 1;
        self.input_reads += reads as u64;
    }

    /// Counts one emitted molecule.
    pub fn record_molecule(&mut self, fragments: usize, rejection: Option<RejectionReason>) {
        self.molecules += 1;
        self.max_fragments_per_molecule = self.max_fragments_per_molecule.max(fragments as u64);
        match rejection {
            Some(reason) => {
                self.rejected_molecules += 1;
                *self.rejections.entry(reason).or_default() += 1;
            }
            None => self.valid_molecules += 1,
        }
    }

    /// Adds the counts of `other`.
    pub fn merge(&mut self, other: &MoleculeMetrics) {
        self.input_fragments += other.input_fragments;
        self.input_reads += other.input_reads;
        self.molecules += other.molecules;
        self.valid_molecules += other.valid_molecules;
        self.rejected_molecules += other.rejected_molecules;
        self.max_fragments_per_molecule =
            self.max_fragments_per_molecule.max(other.max_fragments_per_molecule);
        for (&reason, &count) in &other.rejections {
            *self.rejections.entry(reason).or_default() += count;
        }
    }

    /// Total rejected molecules over all reasons.
    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }

    /// Reasons with a non-zero count, most frequent first.
    #[must_use]
    pub fn rejection_summary(&self) -> Vec<(RejectionReason, u64)> {
        let mut summary: Vec<_> = self
            .rejections
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(reason, count)| (*reason, *count))
            .collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        summary
    }

    /// Mean fragments per molecule.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_fragments_per_molecule(&self) -> f64 {
        if self.molecules == 0 { 0.0 } else { self.input_fragments as f64 / self.molecules as f64 }
    }
}

impl Metric for MoleculeMetrics {
    fn metric_name() -> &'static str {
        "molecule assignment"
    }
}

impl ProcessingMetrics for MoleculeMetrics {
    fn total_input(&self) -> u64 {
        self.input_fragments
    }

    fn total_output(&self) -> u64 {
        self.molecules
    }

    fn total_filtered(&self) -> u64 {
        self.rejected_molecules
    }
}
