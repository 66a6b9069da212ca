//! Transcriptome feature annotation.
//!
//! The [`Transcriptome`] capability looks up the features (exons, introns, genes) overlapping
//! the molecule span and writes their names to `XT` and their kinds to `XF`. Feature storage
//! is a collaborator behind [`FeatureLookup`]; [`IntervalFeatures`] is a simple in-memory
//! implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::molecule::{MoleculeCapability, MoleculeCore};
use crate::record::AlignmentRecord;
use crate::rejection::RejectionReason;
use crate::tags::{self, TagValue};

/// An annotated genomic interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    /// Feature name, e.g. a gene or transcript identifier
    pub name: String,
    /// Feature kind, e.g. `exon` or `intron`
    pub kind: String,
    /// Contig name
    pub contig: String,
    /// 0-based start
    pub start: usize,
    /// 0-based exclusive end
    pub end: usize,
}

impl Feature {
    /// Creates a feature.
    #[must_use]
    pub fn new(name: &str, kind: &str, contig: &str, start: usize, end: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            contig: contig.to_string(),
            start,
            end,
        }
    }

    /// Whether the feature overlaps the half-open interval `[start, end)` on `contig`.
    #[must_use]
    pub fn overlaps(&self, contig: &str, start: usize, end: usize) -> bool {
        self.contig == contig && self.start < end && start < self.end
    }
}

/// Finds features overlapping a genomic interval.
pub trait FeatureLookup: Send + Sync {
    /// Features overlapping `[start, end)` on `contig`.
    fn overlapping(&self, contig: &str, start: usize, end: usize) -> Vec<Feature>;
}

/// Features held in memory, sorted by start per contig.
#[derive(Debug, Clone, Default)]
pub struct IntervalFeatures {
    by_contig: AHashMap<String, Vec<Feature>>,
    /// Longest feature per contig, bounding how far back a scan has to start
    longest: AHashMap<String, usize>,
}

impl IntervalFeatures {
    /// An empty feature set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature.
    pub fn insert(&mut self, feature: Feature) {
        let length = feature.end.saturating_sub(feature.start);
        let longest = self.longest.entry(feature.contig.clone()).or_insert(0);
        *longest = (*longest).max(length);

        let features = self.by_contig.entry(feature.contig.clone()).or_default();
        let idx = features.partition_point(|f| f.start <= feature.start);
        features.insert(idx, feature);
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_contig.values().map(Vec::len).sum()
    }

    /// Whether there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Feature> for IntervalFeatures {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        let mut features = Self::new();
        for feature in iter {
            features.insert(feature);
        }
        features
    }
}

impl FeatureLookup for IntervalFeatures {
    fn overlapping(&self, contig: &str, start: usize, end: usize) -> Vec<Feature> {
        let Some(features) = self.by_contig.get(contig) else {
            return Vec::new();
        };
        let longest = self.longest.get(contig).copied().unwrap_or(0);
        let first = features.partition_point(|f| f.start + longest < start);
        features[first..]
            .iter()
            .take_while(|f| f.start < end)
            .filter(|f| f.overlaps(contig, start, end))
            .cloned()
            .collect()
    }
}

/// Annotates molecules with the features overlapping their span.
#[derive(Clone)]
pub struct Transcriptome {
    lookup: Arc<dyn FeatureLookup>,
    features: Vec<Feature>,
}

impl Transcriptome {
    /// Creates the capability around a feature lookup.
    #[must_use]
    pub fn new(lookup: Arc<dyn FeatureLookup>) -> Self {
        Self { lookup, features: Vec::new() }
    }

    /// Features found during finalisation.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

impl std::fmt::Debug for Transcriptome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcriptome").field("features", &self.features).finish_non_exhaustive()
    }
}

impl<R: AlignmentRecord> MoleculeCapability<R> for Transcriptome {
    fn name(&self) -> &'static str {
        "transcriptome"
    }

    fn finalise(&mut self, core: &mut MoleculeCore<R>) {
        let span = core.span();
        if let (Some(contig), Some(start), Some(end)) = (span.contig, span.start, span.end) {
            self.features = self.lookup.overlapping(&contig, start, end);
        }
    }

    fn validate(&self, _core: &MoleculeCore<R>) -> Result<(), RejectionReason> {
        Ok(())
    }

    fn write_tags(&self, core: &mut MoleculeCore<R>) {
        if self.features.is_empty() {
            return;
        }
        let names: BTreeSet<&str> = self.features.iter().map(|f| f.name.as_str()).collect();
        let kinds: BTreeSet<&str> = self.features.iter().map(|f| f.kind.as_str()).collect();
        let names = names.into_iter().collect::<Vec<_>>().join(",");
        let kinds = kinds.into_iter().collect::<Vec<_>>().join(",");
        core.set_tag_on_reads(tags::FEATURE_NAMES, Some(TagValue::from(names)));
        core.set_tag_on_reads(tags::FEATURE_KINDS, Some(TagValue::from(kinds)));
    }
}
