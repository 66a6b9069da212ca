//! Streaming assignment of fragments to molecules.
//!
//! [`MoleculeClusterer`] consumes coordinate-sorted fragments and keeps open molecules in
//! buckets keyed by `(sample, strand)`. Each incoming fragment is compared against the open
//! molecules of its bucket, newest first, and joins the first one that accepts it; otherwise
//! it founds a new molecule. Because input is sorted by start, a molecule whose end plus
//! the assignment radius lies before the current fragment start can never grow again. Such
//! molecules are closed: finalised, validated, tagged and emitted.
//!
//! Emitted molecules are ordered by start and then by creation order, and receive
//! consecutive identifiers starting at the clusterer's id base. [`cluster_windows`] runs
//! independent windows (typically whole contigs) in parallel with `rayon`, giving each
//! window a disjoint id range.

use std::collections::VecDeque;

use ahash::AHashMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScmoError};
use crate::fragment::{Fragment, Strand};
use crate::logging::{OperationTimer, log_molecule_summary};
use crate::metrics::MoleculeMetrics;
use crate::molecule::{ClusterAnchor, Molecule, MoleculeFactory};
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressTracker};
use crate::record::AlignmentRecord;

/// Number of bits reserved for molecule ids within one window of [`cluster_windows`].
pub const WINDOW_ID_SHIFT: u32 = 32;

/// Options for [`MoleculeClusterer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringOptions {
    /// Which fragment of an open molecule new fragments are compared against
    pub anchor: ClusterAnchor,
    /// Stop after emitting this many molecules
    pub max_molecules: Option<usize>,
    /// Fragments between progress log messages
    pub progress_interval: u64,
    /// Reject molecules whose reads all have mapping quality 0
    pub reject_multimapped: bool,
}

impl Default for ClusteringOptions {
    fn default() -> Self {
        Self {
            anchor: ClusterAnchor::default(),
            max_molecules: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            reject_multimapped: false,
        }
    }
}

impl ClusteringOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::InvalidParameter`] for a zero progress interval or a zero
    /// molecule limit.
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval == 0 {
            return Err(ScmoError::invalid_parameter("progress_interval", "must be at least 1"));
        }
        if self.max_molecules == Some(0) {
            return Err(ScmoError::invalid_parameter("max_molecules", "must be at least 1"));
        }
        Ok(())
    }
}

type BucketKey = (Option<String>, Strand);

struct OpenMolecule<R: AlignmentRecord> {
    /// Creation order, breaks ties between molecules with the same start
    serial: u64,
    molecule: Molecule<R>,
}

/// Iterator adapter grouping sorted fragments into finished molecules.
pub struct MoleculeClusterer<I, R>
where
    I: Iterator<Item = Result<Fragment<R>>>,
    R: AlignmentRecord,
{
    fragments: I,
    factory: MoleculeFactory,
    options: ClusteringOptions,
    buckets: AHashMap<BucketKey, Vec<OpenMolecule<R>>>,
    ready: VecDeque<Molecule<R>>,
    contig: Option<String>,
    id_base: u64,
    next_id: u64,
    next_serial: u64,
    emitted: usize,
    exhausted: bool,
    metrics: MoleculeMetrics,
    progress: ProgressTracker,
    log_summary: bool,
}

impl<I, R> MoleculeClusterer<I, R>
where
    I: Iterator<Item = Result<Fragment<R>>>,
    R: AlignmentRecord,
{
    /// Creates a clusterer over `fragments`, which must be sorted by contig and start.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::InvalidParameter`] when `options` are invalid.
    pub fn new(fragments: I, factory: MoleculeFactory, options: ClusteringOptions) -> Result<Self> {
        options.validate()?;
        let factory = factory.with_multimapped_rejection(options.reject_multimapped);
        let progress =
            ProgressTracker::new("Clustered fragments").with_interval(options.progress_interval);
        Ok(Self {
            fragments,
            factory,
            options,
            buckets: AHashMap::new(),
            ready: VecDeque::new(),
            contig: None,
            id_base: 0,
            next_id: 0,
            next_serial: 0,
            emitted: 0,
            exhausted: false,
            metrics: MoleculeMetrics::new(),
            progress,
            log_summary: true,
        })
    }

    /// Offsets every molecule id by `id_base`.
    #[must_use]
    pub fn with_id_base(mut self, id_base: u64) -> Self {
        self.id_base = id_base;
        self
    }

    /// Counts so far.
    #[must_use]
    pub fn metrics(&self) -> &MoleculeMetrics {
        &self.metrics
    }

    /// Number of molecules still open.
    #[must_use]
    pub fn open_molecules(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    fn limit_reached(&self) -> bool {
        self.options.max_molecules.is_some_and(|max| self.emitted >= max)
    }

    fn add(&mut self, fragment: Fragment<R>) -> Result<()> {
        self.metrics.record_fragment(fragment.read_count());
        let span = fragment.span();
        let location = span.contig.as_ref().zip(span.start).map(|(c, s)| format!("{c}:{}", s + 1));
        self.progress.record(1, location.as_deref());

        let Some(start) = span.start.filter(|_| span.is_valid()) else {
            debug!("Fragment without a complete span becomes its own molecule: {fragment}");
            let molecule = self.factory.create(fragment);
            self.finish(vec![molecule]);
            return Ok(());
        };

        if self.contig != span.contig {
            self.close_where(|_| true);
            self.contig = span.contig.clone();
        }
        let radius = fragment.options().assignment_radius;
        self.close_where(|molecule| molecule.span().end.is_none_or(|end| end + radius < start));

        let anchor = self.options.anchor;
        let key = (fragment.sample().map(str::to_string), fragment.strand());
        let bucket = self.buckets.entry(key).or_default();
        let mut target = None;
        for (idx, open) in bucket.iter().enumerate().rev() {
            match open.molecule.accepts(&fragment, anchor) {
                Ok(true) => {
                    target = Some(idx);
                    break;
                }
                Ok(false) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("Treating {fragment} as distinct from {}: {e}", open.molecule);
                }
                Err(e) => return Err(e),
            }
        }

        match target {
            Some(idx) => bucket[idx].molecule.add_fragment(fragment)?,
            None => {
                let molecule = self.factory.create(fragment);
                bucket.push(OpenMolecule { serial: self.next_serial, molecule });
                self.next_serial += 1;
            }
        }
        Ok(())
    }

    /// Closes every open molecule matching `predicate`.
    fn close_where<F>(&mut self, predicate: F)
    where
        F: Fn(&Molecule<R>) -> bool,
    {
        let mut closed = Vec::new();
        for bucket in self.buckets.values_mut() {
            let mut idx = 0;
            while idx < bucket.len() {
                if predicate(&bucket[idx].molecule) {
                    closed.push(bucket.remove(idx));
                } else {
                    idx += 1;
                }
            }
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        if closed.is_empty() {
            return;
        }
        closed.sort_by_key(|open| (open.molecule.span().start, open.serial));
        self.finish(closed.into_iter().map(|open| open.molecule).collect());
    }

    /// Assigns ids, finalises, validates and tags molecules, then queues them for output.
    fn finish(&mut self, molecules: Vec<Molecule<R>>) {
        for mut molecule in molecules {
            molecule.set_molecule_id(self.id_base + self.next_id);
            self.next_id += 1;
            molecule.finalise();
            molecule.is_valid(true);
            molecule.write_tags();
            self.metrics.record_molecule(molecule.fragment_count(), molecule.rejection_reason());
            self.ready.push_back(molecule);
        }
    }
}

impl<I, R> Iterator for MoleculeClusterer<I, R>
where
    I: Iterator<Item = Result<Fragment<R>>>,
    R: AlignmentRecord,
{
    type Item = Result<Molecule<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.limit_reached() {
                if !self.exhausted {
                    info!("Stopping after {} molecules", self.emitted);
                    self.exhausted = true;
                }
                return None;
            }
            if let Some(molecule) = self.ready.pop_front() {
                self.emitted += 1;
                return Some(Ok(molecule));
            }
            if self.exhausted {
                return None;
            }
            match self.fragments.next() {
                Some(Ok(fragment)) => {
                    if let Err(e) = self.add(fragment) {
                        return Some(Err(e));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.close_where(|_| true);
                    self.exhausted = true;
                    self.progress.log_final();
                    if self.log_summary {
                        log_molecule_summary(&self.metrics);
                    }
                }
            }
        }
    }
}

/// Clusters independent windows of sorted fragments in parallel.
///
/// Window `i` numbers its molecules from `i << 32`, so ids stay unique across windows.
/// Molecules are returned in window order together with the merged metrics.
///
/// # Errors
///
/// Returns the first error raised by any window.
pub fn cluster_windows<R>(
    windows: Vec<Vec<Fragment<R>>>,
    factory: &MoleculeFactory,
    options: &ClusteringOptions,
) -> Result<(Vec<Molecule<R>>, MoleculeMetrics)>
where
    R: AlignmentRecord + Send,
{
    let timer = OperationTimer::new(&format!("Clustering {} windows", windows.len()));
    let results: Vec<(Vec<Molecule<R>>, MoleculeMetrics)> = windows
        .into_par_iter()
        .enumerate()
        .map(|(index, fragments)| {
            let fragments = fragments.into_iter().map(Ok);
            let mut clusterer =
                MoleculeClusterer::new(fragments, factory.clone(), options.clone())?
                    .with_id_base((index as u64) << WINDOW_ID_SHIFT);
            clusterer.log_summary = false;
            let molecules = clusterer.by_ref().collect::<Result<Vec<_>>>()?;
            Ok((molecules, clusterer.metrics))
        })
        .collect::<Result<_>>()?;

    let mut metrics = MoleculeMetrics::new();
    let mut molecules = Vec::new();
    for (window_molecules, window_metrics) in results {
        metrics.merge(&window_metrics);
        molecules.extend(window_molecules);
    }
    timer.log_completion(metrics.input_fragments);
    log_molecule_summary(&metrics);
    Ok((molecules, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentOptions;
    use crate::molecule::Flavor;
    use crate::reference::{ReferenceReader, ReferenceSequence};
    use crate::rejection::RejectionReason;
    use crate::tags::{self, TagValue};
    use crate::testutil::RecordBuilder;
    use std::sync::Arc;

    fn factory() -> MoleculeFactory {
        let reference: Arc<dyn ReferenceSequence> = Arc::new(ReferenceReader::from_sequences([
            ("chr1", "A".repeat(1_000)),
            ("chr2", "A".repeat(1_000)),
        ]));
        MoleculeFactory::new(Flavor::Base, reference, None).unwrap()
    }

    fn fragment(contig: &str, start: usize, end: usize, umi: &str) -> Fragment {
        let read = RecordBuilder::mapped(contig, start + 1, &"A".repeat(end - start))
            .tag(tags::SAMPLE, "cell_1")
            .tag(tags::UMI, umi)
            .build();
        Fragment::new(Some(read), None, FragmentOptions::default()).unwrap()
    }

    fn cluster(fragments: Vec<Fragment>, options: ClusteringOptions) -> Vec<Molecule> {
        MoleculeClusterer::new(fragments.into_iter().map(Ok), factory(), options)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn sizes(molecules: &[Molecule]) -> Vec<usize> {
        molecules.iter().map(Molecule::fragment_count).collect()
    }

    #[test]
    fn test_nearby_fragments_form_one_molecule() {
        let molecules = cluster(
            vec![
                fragment("chr1", 100, 200, "AAAA"),
                fragment("chr1", 101, 199, "AAAA"),
                fragment("chr1", 250, 300, "AAAA"),
            ],
            ClusteringOptions::default(),
        );
        assert_eq!(sizes(&molecules), vec![2, 1]);
        assert_eq!(molecules[0].span().start, Some(100));
        assert_eq!(molecules[1].span().start, Some(250));
        assert_eq!(molecules[0].molecule_id(), Some(0));
        assert_eq!(molecules[1].molecule_id(), Some(1));
    }

    #[test]
    fn test_umi_threshold_splits_molecules() {
        let molecules = cluster(
            vec![
                fragment("chr1", 100, 150, "AAAA"),
                fragment("chr1", 100, 150, "AAAT"),
                fragment("chr1", 100, 150, "ATTT"),
            ],
            ClusteringOptions::default(),
        );
        assert_eq!(sizes(&molecules), vec![2, 1]);
    }

    #[test]
    fn test_umi_length_mismatch_is_not_a_match() {
        let molecules = cluster(
            vec![fragment("chr1", 100, 150, "AAAA"), fragment("chr1", 100, 150, "AAAAA")],
            ClusteringOptions::default(),
        );
        assert_eq!(sizes(&molecules), vec![1, 1]);
    }

    #[test]
    fn test_buckets_separate_samples() {
        let mut other = fragment("chr1", 100, 150, "AAAA");
        other.set_sample(Some("cell_2".to_string()));
        let molecules =
            cluster(vec![fragment("chr1", 100, 150, "AAAA"), other], ClusteringOptions::default());
        assert_eq!(sizes(&molecules), vec![1, 1]);
        assert_ne!(molecules[0].sample(), molecules[1].sample());
    }

    #[test]
    fn test_contig_change_closes_molecules() {
        let mut clusterer = MoleculeClusterer::new(
            vec![fragment("chr1", 100, 150, "AAAA"), fragment("chr2", 100, 150, "AAAA")]
                .into_iter()
                .map(Ok),
            factory(),
            ClusteringOptions::default(),
        )
        .unwrap();
        let first = clusterer.next().unwrap().unwrap();
        assert_eq!(first.chromosome(), Some("chr1"));
        assert_eq!(clusterer.open_molecules(), 1);
        let second = clusterer.next().unwrap().unwrap();
        assert_eq!(second.chromosome(), Some("chr2"));
        assert!(clusterer.next().is_none());
    }

    #[test]
    fn test_anchor_controls_chaining() {
        let chain = || {
            vec![
                fragment("chr1", 100, 150, "AAAA"),
                fragment("chr1", 103, 153, "AAAA"),
                fragment("chr1", 106, 156, "AAAA"),
            ]
        };
        let founder = cluster(chain(), ClusteringOptions::default());
        assert_eq!(sizes(&founder), vec![2, 1]);

        let options = ClusteringOptions { anchor: ClusterAnchor::Latest, ..Default::default() };
        let latest = cluster(chain(), options);
        assert_eq!(sizes(&latest), vec![3]);
    }

    #[test]
    fn test_unmapped_fragment_is_rejected_not_dropped() {
        let unmapped = RecordBuilder::unmapped("ACGT").tag(tags::SAMPLE, "cell_1").build();
        let unmapped = Fragment::new(Some(unmapped), None, FragmentOptions::default()).unwrap();
        let mut clusterer = MoleculeClusterer::new(
            vec![fragment("chr1", 100, 150, "AAAA"), fragment("chr1", 100, 150, "AAAA"), unmapped]
                .into_iter()
                .map(Ok),
            factory(),
            ClusteringOptions::default(),
        )
        .unwrap();
        let molecules = clusterer.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(molecules.len(), 2);

        let rejected: Vec<_> =
            molecules.iter().filter(|m| m.rejection_reason().is_some()).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].rejection_reason(), Some(RejectionReason::InvalidSpan));
        let records = molecules.into_iter().flat_map(Molecule::into_records).collect::<Vec<_>>();
        assert!(
            records
                .iter()
                .any(|r| r.tag(tags::REJECTION_REASON) == Some(TagValue::from("invalid_span")))
        );

        let metrics = clusterer.metrics();
        assert_eq!(metrics.input_fragments, 3);
        assert_eq!(metrics.molecules, 2);
        assert_eq!(metrics.valid_molecules, 1);
        assert_eq!(metrics.rejections[&RejectionReason::InvalidSpan], 1);
    }

    #[test]
    fn test_max_molecules_stops_early() {
        let fragments = (0..10).map(|i| fragment("chr1", i * 100, i * 100 + 50, "AAAA")).collect();
        let options = ClusteringOptions { max_molecules: Some(3), ..Default::default() };
        assert_eq!(cluster(fragments, options).len(), 3);
    }

    #[test]
    fn test_input_errors_propagate() {
        let input = vec![
            Ok(fragment("chr1", 100, 150, "AAAA")),
            Err(ScmoError::Order { read_name: "q1".to_string() }),
        ];
        let result: Result<Vec<_>> =
            MoleculeClusterer::new(input.into_iter(), factory(), ClusteringOptions::default())
                .unwrap()
                .collect();
        assert!(matches!(result, Err(ScmoError::Order { .. })));
    }

    #[test]
    fn test_options_validation() {
        assert!(ClusteringOptions::default().validate().is_ok());
        let options = ClusteringOptions { progress_interval: 0, ..Default::default() };
        assert!(options.validate().is_err());
        let options = ClusteringOptions { max_molecules: Some(0), ..Default::default() };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_cluster_windows_assigns_disjoint_ids() {
        let windows = vec![
            vec![fragment("chr1", 100, 150, "AAAA"), fragment("chr1", 101, 150, "AAAA")],
            vec![fragment("chr2", 100, 150, "AAAA"), fragment("chr2", 500, 550, "AAAA")],
        ];
        let (molecules, metrics) =
            cluster_windows(windows, &factory(), &ClusteringOptions::default()).unwrap();
        let ids: Vec<_> = molecules.iter().filter_map(Molecule::molecule_id).collect();
        assert_eq!(ids, vec![0, 1 << 32, (1 << 32) + 1]);
        assert_eq!(metrics.input_fragments, 4);
        assert_eq!(metrics.molecules, 3);
    }
}
