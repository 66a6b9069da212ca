//! Builders for creating test records.
//!
//! Records are built directly as [`SamRecord`]s with a reference name so tests do not need
//! a SAM header.
//!
//! ```rust
//! use scmo_lib::record::AlignmentRecord;
//! use scmo_lib::testutil::RecordBuilder;
//!
//! let record = RecordBuilder::mapped("chr1", 101, "ACGT").read1().reverse().build();
//! assert_eq!(record.reference_start(), Some(100));
//! assert!(record.is_reverse());
//! ```

use noodles::core::Position;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record_buf::{QualityScores, Sequence};

use crate::record::{AlignmentRecord, SamRecord};
use crate::tags::{TagKey, TagValue};

/// Default base quality for generated records.
pub const DEFAULT_BASE_QUALITY: u8 = 30;
/// Default mapping quality for mapped records.
pub const DEFAULT_MAPQ: u8 = 60;

/// Fluent builder for a single [`SamRecord`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: String,
    flags: Flags,
    reference_name: Option<String>,
    alignment_start: Option<usize>,
    mapping_quality: u8,
    cigar: Option<String>,
    sequence: String,
    tags: Vec<(TagKey, TagValue)>,
}

impl RecordBuilder {
    /// A mapped read on `contig` starting at the 1-based position `start`.
    #[must_use]
    pub fn mapped(contig: &str, start: usize, sequence: &str) -> Self {
        Self {
            name: "read".to_string(),
            flags: Flags::empty(),
            reference_name: Some(contig.to_string()),
            alignment_start: Some(start),
            mapping_quality: DEFAULT_MAPQ,
            cigar: None,
            sequence: sequence.to_string(),
            tags: Vec::new(),
        }
    }

    /// An unmapped read.
    #[must_use]
    pub fn unmapped(sequence: &str) -> Self {
        Self {
            name: "read".to_string(),
            flags: Flags::UNMAPPED,
            reference_name: None,
            alignment_start: None,
            mapping_quality: 0,
            cigar: None,
            sequence: sequence.to_string(),
            tags: Vec::new(),
        }
    }

    /// Sets the read name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Flags the read as the first segment of a pair.
    #[must_use]
    pub fn read1(mut self) -> Self {
        self.flags.set(Flags::SEGMENTED, true);
        self.flags.set(Flags::FIRST_SEGMENT, true);
        self.flags.set(Flags::LAST_SEGMENT, false);
        self
    }

    /// Flags the read as the last segment of a pair.
    #[must_use]
    pub fn read2(mut self) -> Self {
        self.flags.set(Flags::SEGMENTED, true);
        self.flags.set(Flags::FIRST_SEGMENT, false);
        self.flags.set(Flags::LAST_SEGMENT, true);
        self
    }

    /// Flags the read as reverse complemented.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.flags.set(Flags::REVERSE_COMPLEMENTED, true);
        self
    }

    /// Flags the read as a secondary alignment.
    #[must_use]
    pub fn secondary(mut self) -> Self {
        self.flags.set(Flags::SECONDARY, true);
        self
    }

    /// Sets the CIGAR string; defaults to `{len}M`.
    #[must_use]
    pub fn cigar(mut self, cigar: &str) -> Self {
        self.cigar = Some(cigar.to_string());
        self
    }

    /// Sets the mapping quality.
    #[must_use]
    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapping_quality = mapq;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag<V: Into<TagValue>>(mut self, tag: TagKey, value: V) -> Self {
        self.tags.push((tag, value.into()));
        self
    }

    /// Builds the record.
    ///
    /// # Panics
    ///
    /// Panics on a malformed CIGAR or a zero alignment start.
    #[must_use]
    pub fn build(self) -> SamRecord {
        let mut record = RecordBuf::default();
        *record.name_mut() = Some(self.name.into_bytes().into());
        *record.flags_mut() = self.flags;

        if let Some(start) = self.alignment_start {
            *record.alignment_start_mut() =
                Some(Position::try_from(start).expect("alignment start must be >= 1"));
            *record.reference_sequence_id_mut() = Some(0);
            *record.mapping_quality_mut() = MappingQuality::new(self.mapping_quality);

            let cigar = self.cigar.unwrap_or_else(|| format!("{}M", self.sequence.len()));
            *record.cigar_mut() = parse_cigar(&cigar).into_iter().collect();
        }

        let length = self.sequence.len();
        *record.sequence_mut() = Sequence::from(self.sequence.into_bytes());
        *record.quality_scores_mut() = QualityScores::from(vec![DEFAULT_BASE_QUALITY; length]);

        let mut record = SamRecord::with_reference_name(record, self.reference_name.as_deref());
        for (tag, value) in self.tags {
            record.set_tag(tag, Some(value));
        }
        record
    }
}

/// Parses a CIGAR string into operations.
///
/// # Panics
///
/// Panics if the CIGAR string contains invalid characters or formatting.
#[must_use]
pub fn parse_cigar(cigar: &str) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut len = String::new();

    for c in cigar.chars() {
        if c.is_ascii_digit() {
            len.push(c);
            continue;
        }
        let kind = match c {
            'M' => Kind::Match,
            'I' => Kind::Insertion,
            'D' => Kind::Deletion,
            'N' => Kind::Skip,
            'S' => Kind::SoftClip,
            'H' => Kind::HardClip,
            'P' => Kind::Pad,
            '=' => Kind::SequenceMatch,
            'X' => Kind::SequenceMismatch,
            _ => panic!("Unknown CIGAR operation: {c}"),
        };
        ops.push(Op::new(kind, len.parse().expect("Invalid CIGAR: expected number")));
        len.clear();
    }
    ops
}
