//! Fragments: the one or two reads produced from a single physical fragment.
//!
//! A [`Fragment`] owns its read 1 and read 2 records and exposes the facts needed to cluster
//! fragments into molecules: strand, genomic span, sample and UMI. [`Fragment::matches`] is
//! the clustering predicate. It is not transitive, so the clusterer only ever compares a
//! fragment against one representative per open molecule.
//!
//! Records are moved into the fragment. Tags written later by molecule assignment end up on
//! those owned records, which are handed back to the caller through
//! [`Molecule::into_records`](crate::molecule::Molecule::into_records).

pub mod assembler;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use scmo_dna::reverse_complement;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScmoError};
use crate::record::{AlignmentRecord, SamRecord};
use crate::tags::{self, TagDefinitions, TagKey, TagKind, TagValue};
use crate::umi::umi_matches;

pub use assembler::FragmentAssembler;

/// Default distance, in bp, within which fragment boundaries are considered the same.
pub const DEFAULT_ASSIGNMENT_RADIUS: usize = 3;
/// Default number of UMI mismatches tolerated.
pub const DEFAULT_UMI_HAMMING_DISTANCE: usize = 1;
/// Default number of read 1 bases originating from a primer.
pub const DEFAULT_R1_PRIMER_LENGTH: usize = 0;
/// Default number of read 2 bases originating from the random primer.
pub const DEFAULT_R2_PRIMER_LENGTH: usize = 6;

/// Parameters shared by every fragment of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentOptions {
    /// Maximum boundary distance (bp) for two fragments to belong to the same molecule
    pub assignment_radius: usize,
    /// Maximum UMI Hamming distance; 0 requires identical UMIs
    pub umi_hamming_distance: usize,
    /// Number of read 1 bases originating from a primer
    pub r1_primer_length: usize,
    /// Number of read 2 bases originating from the random primer
    pub r2_primer_length: usize,
    /// Decoding rules for the tags read from the input records
    #[serde(skip)]
    pub tag_definitions: Arc<TagDefinitions>,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            assignment_radius: DEFAULT_ASSIGNMENT_RADIUS,
            umi_hamming_distance: DEFAULT_UMI_HAMMING_DISTANCE,
            r1_primer_length: DEFAULT_R1_PRIMER_LENGTH,
            r2_primer_length: DEFAULT_R2_PRIMER_LENGTH,
            tag_definitions: Arc::new(TagDefinitions::default()),
        }
    }
}

impl FragmentOptions {
    /// Options for single-end transcriptome reads, where duplicates can start far apart.
    #[must_use]
    pub fn single_end_transcript() -> Self {
        Self { assignment_radius: 1_000, umi_hamming_distance: 1, ..Self::default() }
    }

    /// Sets the UMI Hamming threshold.
    #[must_use]
    pub fn with_umi_hamming_distance(mut self, distance: usize) -> Self {
        self.umi_hamming_distance = distance;
        self
    }

    /// Checks that the tags needed for clustering can be decoded.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::InvalidParameter`] when the UMI tag is defined as anything other
    /// than a sequence, or the sample tag as an integer.
    pub fn validate(&self) -> Result<()> {
        if let Some(def) = self.tag_definitions.get(tags::UMI) {
            if def.kind != TagKind::Sequence {
                return Err(ScmoError::invalid_parameter(
                    "tag_definitions",
                    "the UMI tag (RX) must be decoded as a sequence",
                ));
            }
        }
        if self.tag_definitions.get(tags::SAMPLE).is_some_and(|d| d.kind == TagKind::Integer) {
            return Err(ScmoError::invalid_parameter(
                "tag_definitions",
                "the sample tag (SM) cannot be decoded as an integer",
            ));
        }
        Ok(())
    }
}

/// Strand a fragment maps to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Strand {
    /// Read 1 maps to the forward strand
    Forward,
    /// Read 1 maps to the reverse strand
    Reverse,
    /// No mapped read to derive the strand from
    #[default]
    Unknown,
}

impl Strand {
    /// Strand from a reverse-complemented flag.
    #[must_use]
    pub fn from_reverse(is_reverse: bool) -> Self {
        if is_reverse { Self::Reverse } else { Self::Forward }
    }

    /// Single character representation: `+`, `-` or `?`.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
            Self::Unknown => '?',
        }
    }
}

/// Genomic span of a fragment or molecule: contig, 0-based start and exclusive end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// Contig name
    pub contig: Option<String>,
    /// 0-based start
    pub start: Option<usize>,
    /// 0-based exclusive end
    pub end: Option<usize>,
}

impl Span {
    /// Whether contig, start and end are all known.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.contig.is_some() && self.start.is_some() && self.end.is_some()
    }

    /// Boundary distance between two spans: the smaller of the start and end differences.
    /// `None` when either span is incomplete or they lie on different contigs.
    #[must_use]
    pub fn boundary_distance(&self, other: &Span) -> Option<usize> {
        if !self.is_valid() || !other.is_valid() || self.contig != other.contig {
            return None;
        }
        let start = self.start?.abs_diff(other.start?);
        let end = self.end?.abs_diff(other.end?);
        Some(start.min(end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<usize>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "{} {}-{}",
            self.contig.as_deref().unwrap_or("?"),
            show(self.start),
            show(self.end)
        )
    }
}

/// One or two reads derived from a single physical fragment.
#[derive(Debug, Clone)]
pub struct Fragment<R: AlignmentRecord = SamRecord> {
    read1: Option<R>,
    read2: Option<R>,
    options: FragmentOptions,
    meta: BTreeMap<TagKey, TagValue>,
    sample: Option<String>,
    strand: Strand,
    is_mapped: bool,
    is_multimapped: bool,
}

impl<R: AlignmentRecord> Fragment<R> {
    /// Builds a fragment from its read 1 and read 2 records.
    ///
    /// The read 1 / read 2 flags of the records are normalised to their slot.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::Order`] when both reads are present and the record in the read 2
    /// slot is flagged as read 1, and [`ScmoError::InvalidParameter`] when no record is given.
    pub fn new(read1: Option<R>, read2: Option<R>, options: FragmentOptions) -> Result<Self> {
        if read1.is_none() && read2.is_none() {
            return Err(ScmoError::invalid_parameter(
                "records",
                "a fragment needs at least one read",
            ));
        }
        if let (Some(_), Some(second)) = (&read1, &read2) {
            if second.is_read1() {
                let read_name = String::from_utf8_lossy(second.query_name().unwrap_or_default());
                return Err(ScmoError::Order { read_name: read_name.into_owned() });
            }
        }

        let mut fragment = Self {
            read1,
            read2,
            options,
            meta: BTreeMap::new(),
            sample: None,
            strand: Strand::Unknown,
            is_mapped: false,
            is_multimapped: false,
        };

        if let Some(r1) = fragment.read1.as_mut() {
            r1.set_read1(true);
            r1.set_read2(false);
        }
        if let Some(r2) = fragment.read2.as_mut() {
            r2.set_read1(false);
            r2.set_read2(true);
        }

        let is_mapped = fragment.reads().any(|r| !r.is_unmapped());
        let is_multimapped = fragment.reads().all(|r| r.mapping_quality() == Some(0));
        fragment.is_mapped = is_mapped;
        fragment.is_multimapped = is_multimapped;
        fragment.strand = fragment.identify_strand();
        fragment.sample = fragment.sample_from_reads();
        Ok(fragment)
    }

    /// Builds a fragment from one or two records in read 1, read 2 order.
    ///
    /// A single record goes to the read 2 slot when it is flagged as the last segment and to
    /// the read 1 slot otherwise.
    ///
    /// # Errors
    ///
    /// See [`Fragment::new`]. Also fails when more than two records are given.
    pub fn from_records(records: Vec<R>, options: FragmentOptions) -> Result<Self> {
        let count = records.len();
        let mut records = records.into_iter();
        match (records.next(), records.next()) {
            _ if count > 2 => Err(ScmoError::invalid_parameter(
                "records",
                format!("a fragment holds at most two reads, got {count}"),
            )),
            (Some(only), None) if only.is_read2() && !only.is_read1() => {
                Self::new(None, Some(only), options)
            }
            (first, second) => Self::new(first, second, options),
        }
    }

    fn identify_strand(&self) -> Strand {
        if let Some(r1) = self.read1.as_ref().filter(|r| !r.is_unmapped()) {
            return Strand::from_reverse(r1.is_reverse());
        }
        if let Some(r2) = self.read2.as_ref().filter(|r| !r.is_unmapped()) {
            return Strand::from_reverse(!r2.is_reverse());
        }
        Strand::Unknown
    }

    fn sample_from_reads(&self) -> Option<String> {
        self.reads().find_map(|read| {
            let value = read.tag(tags::SAMPLE)?;
            self.options.tag_definitions.decode_text(tags::SAMPLE, &value)
        })
    }

    /// Read 1, if present.
    #[must_use]
    pub fn read1(&self) -> Option<&R> {
        self.read1.as_ref()
    }

    /// Read 2, if present.
    #[must_use]
    pub fn read2(&self) -> Option<&R> {
        self.read2.as_ref()
    }

    /// Present reads, read 1 first.
    pub fn reads(&self) -> impl Iterator<Item = &R> {
        self.read1.iter().chain(self.read2.iter())
    }

    /// Present reads, mutably.
    pub fn reads_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.read1.iter_mut().chain(self.read2.iter_mut())
    }

    /// Consumes the fragment, returning its present reads in read 1, read 2 order.
    #[must_use]
    pub fn into_reads(self) -> Vec<R> {
        self.read1.into_iter().chain(self.read2).collect()
    }

    /// Number of present reads.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads().count()
    }

    /// The options this fragment was created with.
    #[must_use]
    pub fn options(&self) -> &FragmentOptions {
        &self.options
    }

    /// Contig, minimum start and maximum end over the present reads.
    #[must_use]
    pub fn span(&self) -> Span {
        let mut span = Span::default();
        for read in self.reads() {
            if span.contig.is_none() {
                span.contig = read.reference_name().map(str::to_string);
            }
            if let Some(start) = read.reference_start() {
                span.start = Some(span.start.map_or(start, |s| s.min(start)));
            }
            if let Some(end) = read.reference_end() {
                span.end = Some(span.end.map_or(end, |e| e.max(end)));
            }
        }
        span
    }

    /// Whether the span is fully defined.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.span().is_valid()
    }

    /// Position and sequence of the random primer used to prime read 2.
    ///
    /// For a reverse read 2 the primer sits at the alignment end and its sequence is the
    /// reverse complement of the last `r2_primer_length` bases.
    #[must_use]
    pub fn random_primer_signature(&self) -> (Option<usize>, Option<Vec<u8>>) {
        let Some(r2) = self.read2.as_ref() else {
            return (None, None);
        };
        let sequence = r2.sequence();
        if sequence.is_empty() {
            return (None, None);
        }
        let length = self.options.r2_primer_length.min(sequence.len());
        let prefix = sequence[..length].to_vec();

        if r2.is_unmapped() {
            (None, Some(prefix))
        } else if r2.is_reverse() {
            (r2.reference_end(), Some(reverse_complement(&sequence[sequence.len() - length..])))
        } else {
            (r2.reference_start(), Some(prefix))
        }
    }

    /// UMI of the first present read carrying one.
    #[must_use]
    pub fn umi(&self) -> Option<String> {
        self.reads().find_map(|read| {
            let value = read.tag(tags::UMI)?;
            self.options.tag_definitions.decode_text(tags::UMI, &value)
        })
    }

    /// Sample identifier.
    #[must_use]
    pub fn sample(&self) -> Option<&str> {
        self.sample.as_deref()
    }

    /// Overrides the sample identifier.
    pub fn set_sample(&mut self, sample: Option<String>) {
        self.sample = sample;
    }

    /// Strand the fragment maps to.
    #[must_use]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Overrides the strand.
    pub fn set_strand(&mut self, strand: Strand) {
        self.strand = strand;
    }

    /// `+`, `-` or `?`.
    #[must_use]
    pub fn strand_repr(&self) -> char {
        self.strand.symbol()
    }

    /// Whether at least one read is mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.is_mapped
    }

    /// Whether every present read has mapping quality 0.
    #[must_use]
    pub fn is_multimapped(&self) -> bool {
        self.is_multimapped
    }

    /// Fragment-level metadata, written onto the reads when the molecule writes its tags.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<TagKey, TagValue> {
        &self.meta
    }

    /// Sets a metadata entry.
    pub fn set_meta(&mut self, key: TagKey, value: impl Into<TagValue>) {
        self.meta.insert(key, value.into());
    }

    /// Metadata entry for `key`.
    #[must_use]
    pub fn get_meta(&self, key: TagKey) -> Option<&TagValue> {
        self.meta.get(&key)
    }

    /// Records why this fragment was rejected.
    pub fn set_rejection_reason(&mut self, reason: &str) {
        self.set_meta(tags::REJECTION_REASON, reason);
    }

    /// Records the recognized (restriction site) sequence.
    pub fn set_recognized_sequence(&mut self, sequence: &str) {
        self.set_meta(tags::RECOGNIZED_SEQUENCE, sequence);
    }

    /// The clustering predicate.
    ///
    /// Two fragments match when they share sample and strand, both have a fully defined span,
    /// the smaller of their start and end differences is within the assignment radius, and
    /// their UMIs match under the Hamming threshold. A fragment without a UMI only matches
    /// another fragment without a UMI.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::LengthMismatch`] when the UMIs are compared by Hamming distance
    /// and differ in length.
    pub fn matches<O: AlignmentRecord>(&self, other: &Fragment<O>) -> Result<bool> {
        if self.sample != other.sample || self.strand != other.strand {
            return Ok(false);
        }
        match self.span().boundary_distance(&other.span()) {
            Some(distance) if distance <= self.options.assignment_radius => {}
            _ => return Ok(false),
        }
        match (self.umi(), other.umi()) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => umi_matches(&a, &b, self.options.umi_hamming_distance),
            _ => {
                debug!("Fragment with a UMI compared to one without: {self}");
                Ok(false)
            }
        }
    }
}

impl<R: AlignmentRecord> fmt::Display for Fragment<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fragment(sample: {}, umi: {}, span: {}, strand: {})",
            self.sample().unwrap_or("?"),
            self.umi().as_deref().unwrap_or("?"),
            self.span(),
            self.strand_repr()
        )
    }
}
