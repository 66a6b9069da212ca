//! Alignment record access.
//!
//! Fragment and molecule logic is written against the [`AlignmentRecord`] trait so that it
//! only depends on the handful of facts it needs from a read: pairing and mapping flags,
//! the reference span, the query sequence, matches-only aligned pairs and a small tag store.
//! [`SamRecord`] implements the trait on top of a `noodles` [`RecordBuf`] whose reference
//! name has been resolved against the SAM header.
//!
//! Coordinates exposed by the trait are 0-based with exclusive ends.

use bstr::BString;
use noodles::sam::Header;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Cigar as CigarTrait;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::data::field::value::Array;

use crate::tags::{TagKey, TagValue};

/// MD tag key, used to recover reference bases of aligned positions.
const MD: TagKey = *b"MD";

/// One aligned (match or mismatch) position of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedPair {
    /// 0-based offset in the query sequence (soft clips included)
    pub query_pos: usize,
    /// 0-based reference position
    pub ref_pos: usize,
    /// Reference base at `ref_pos` (uppercase) when it can be derived from the record
    pub ref_base: Option<u8>,
}

/// The read-level facts consumed by fragments and molecules.
pub trait AlignmentRecord {
    /// Query name.
    fn query_name(&self) -> Option<&[u8]>;
    /// Whether the read has a mate (SAM flag 0x1).
    fn is_paired(&self) -> bool;
    /// Whether the read is the first segment of the template.
    fn is_read1(&self) -> bool;
    /// Whether the read is the last segment of the template.
    fn is_read2(&self) -> bool;
    /// Sets the first-segment flag.
    fn set_read1(&mut self, value: bool);
    /// Sets the last-segment flag.
    fn set_read2(&mut self, value: bool);
    /// Whether the read is unmapped.
    fn is_unmapped(&self) -> bool;
    /// Whether the read is aligned to the reverse strand.
    fn is_reverse(&self) -> bool;
    /// Whether this is a secondary alignment.
    fn is_secondary(&self) -> bool;
    /// Whether this is a supplementary alignment.
    fn is_supplementary(&self) -> bool;
    /// Mapping quality, `None` when unavailable (255).
    fn mapping_quality(&self) -> Option<u8>;
    /// Name of the reference sequence the read is placed on.
    fn reference_name(&self) -> Option<&str>;
    /// 0-based alignment start; `None` for unmapped reads.
    fn reference_start(&self) -> Option<usize>;
    /// 0-based exclusive alignment end; `None` for unmapped reads.
    fn reference_end(&self) -> Option<usize>;
    /// Query bases as stored (reference orientation).
    fn sequence(&self) -> &[u8];
    /// Matches-only aligned pairs, in query order.
    fn aligned_pairs(&self) -> Vec<AlignedPair>;
    /// Reads a tag.
    fn tag(&self, tag: TagKey) -> Option<TagValue>;
    /// Writes a tag; `None` removes it.
    fn set_tag(&mut self, tag: TagKey, value: Option<TagValue>);

    /// Whether the tag is present.
    fn has_tag(&self, tag: TagKey) -> bool {
        self.tag(tag).is_some()
    }
}

/// A `noodles` record together with its resolved reference sequence name.
#[derive(Debug, Clone, PartialEq)]
pub struct SamRecord {
    record: RecordBuf,
    reference_name: Option<String>,
}

impl SamRecord {
    /// Wraps `record`, resolving its reference sequence id against `header`.
    #[must_use]
    pub fn new(record: RecordBuf, header: &Header) -> Self {
        let reference_name = record
            .reference_sequence_id()
            .and_then(|id| header.reference_sequences().get_index(id))
            .map(|(name, _)| name.to_string());
        Self { record, reference_name }
    }

    /// Wraps `record` with an explicitly supplied reference name.
    #[must_use]
    pub fn with_reference_name(record: RecordBuf, reference_name: Option<&str>) -> Self {
        Self { record, reference_name: reference_name.map(str::to_string) }
    }

    /// The wrapped record.
    #[must_use]
    pub fn record(&self) -> &RecordBuf {
        &self.record
    }

    /// Unwraps into the `noodles` record, including any tags written back.
    #[must_use]
    pub fn into_inner(self) -> RecordBuf {
        self.record
    }

    fn set_flag(&mut self, flag: Flags, value: bool) {
        self.record.flags_mut().set(flag, value);
    }

    /// Walks the CIGAR and returns (query, reference) offsets of M/=/X positions together
    /// with whether each came from an `=` operation.
    fn cigar_pairs(&self) -> Vec<(usize, usize, bool)> {
        let Some(start) = self.reference_start() else {
            return Vec::new();
        };
        let mut pairs = Vec::new();
        let mut query_pos = 0;
        let mut ref_pos = start;

        for op_result in self.record.cigar().iter() {
            let Ok(op) = op_result else {
                continue;
            };
            let len = op.len();
            match op.kind() {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                    let is_seq_match = op.kind() == Kind::SequenceMatch;
                    pairs.extend((0..len).map(|i| (query_pos + i, ref_pos + i, is_seq_match)));
                    query_pos += len;
                    ref_pos += len;
                }
                Kind::Insertion | Kind::SoftClip => query_pos += len,
                Kind::Deletion | Kind::Skip => ref_pos += len,
                Kind::HardClip | Kind::Pad => {}
            }
        }
        pairs
    }
}

impl AlignmentRecord for SamRecord {
    fn query_name(&self) -> Option<&[u8]> {
        self.record.name().map(<_ as AsRef<[u8]>>::as_ref)
    }

    fn is_paired(&self) -> bool {
        self.record.flags().is_segmented()
    }

    fn is_read1(&self) -> bool {
        self.record.flags().is_first_segment()
    }

    fn is_read2(&self) -> bool {
        self.record.flags().is_last_segment()
    }

    fn set_read1(&mut self, value: bool) {
        self.set_flag(Flags::FIRST_SEGMENT, value);
    }

    fn set_read2(&mut self, value: bool) {
        self.set_flag(Flags::LAST_SEGMENT, value);
    }

    fn is_unmapped(&self) -> bool {
        self.record.flags().is_unmapped()
    }

    fn is_reverse(&self) -> bool {
        self.record.flags().is_reverse_complemented()
    }

    fn is_secondary(&self) -> bool {
        self.record.flags().is_secondary()
    }

    fn is_supplementary(&self) -> bool {
        self.record.flags().is_supplementary()
    }

    fn mapping_quality(&self) -> Option<u8> {
        self.record.mapping_quality().map(|mapq| mapq.get())
    }

    fn reference_name(&self) -> Option<&str> {
        self.reference_name.as_deref()
    }

    fn reference_start(&self) -> Option<usize> {
        if self.is_unmapped() {
            return None;
        }
        self.record.alignment_start().map(|pos| usize::from(pos) - 1)
    }

    fn reference_end(&self) -> Option<usize> {
        if self.is_unmapped() {
            return None;
        }
        // 1-based inclusive end equals the 0-based exclusive end
        self.record.alignment_end().map(usize::from)
    }

    fn sequence(&self) -> &[u8] {
        self.record.sequence().as_ref()
    }

    fn aligned_pairs(&self) -> Vec<AlignedPair> {
        let pairs = self.cigar_pairs();
        let sequence = self.sequence();
        let md = match self.tag(MD) {
            Some(TagValue::String(md)) => {
                parse_md(md.as_bytes()).filter(|md| md.len() == pairs.len())
            }
            _ => None,
        };

        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (query_pos, ref_pos, is_seq_match))| {
                let query_base = sequence.get(query_pos).map(u8::to_ascii_uppercase);
                let ref_base = match &md {
                    Some(md) => md[i].or(query_base),
                    None if is_seq_match => query_base,
                    None => None,
                };
                AlignedPair { query_pos, ref_pos, ref_base }
            })
            .collect()
    }

    fn tag(&self, tag: TagKey) -> Option<TagValue> {
        self.record.data().get(&Tag::from(tag)).and_then(from_buf_value)
    }

    fn set_tag(&mut self, tag: TagKey, value: Option<TagValue>) {
        let tag = Tag::from(tag);
        match value {
            Some(value) => {
                self.record.data_mut().insert(tag, to_buf_value(value));
            }
            None => {
                self.record.data_mut().remove(&tag);
            }
        }
    }
}

/// Expands an MD string into one entry per aligned base: `None` where the read matches the
/// reference, `Some(base)` holding the reference base at a mismatch. Deleted reference bases
/// are skipped. Returns `None` for malformed MD strings.
fn parse_md(md: &[u8]) -> Option<Vec<Option<u8>>> {
    let mut expanded = Vec::new();
    let mut matches = 0usize;
    let mut in_deletion = false;

    for &c in md {
        if c.is_ascii_digit() {
            in_deletion = false;
            matches = matches * 10 + usize::from(c - b'0');
        } else if c == b'^' {
            expanded.extend(std::iter::repeat_n(None, matches));
            matches = 0;
            in_deletion = true;
        } else if c.is_ascii_alphabetic() {
            if in_deletion {
                continue;
            }
            expanded.extend(std::iter::repeat_n(None, matches));
            matches = 0;
            expanded.push(Some(c.to_ascii_uppercase()));
        } else {
            return None;
        }
    }
    expanded.extend(std::iter::repeat_n(None, matches));
    Some(expanded)
}

fn from_buf_value(value: &Value) -> Option<TagValue> {
    let converted = match value {
        Value::Character(c) => TagValue::String(char::from(*c).to_string()),
        Value::Int8(v) => TagValue::Int(i64::from(*v)),
        Value::UInt8(v) => TagValue::Int(i64::from(*v)),
        Value::Int16(v) => TagValue::Int(i64::from(*v)),
        Value::UInt16(v) => TagValue::Int(i64::from(*v)),
        Value::Int32(v) => TagValue::Int(i64::from(*v)),
        Value::UInt32(v) => TagValue::Int(i64::from(*v)),
        Value::Float(v) => TagValue::Float(*v),
        Value::String(s) | Value::Hex(s) => TagValue::String(s.to_string()),
        Value::Array(array) => TagValue::IntArray(int_array(array)?),
    };
    Some(converted)
}

fn int_array(array: &Array) -> Option<Vec<i64>> {
    let values = match array {
        Array::Int8(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::UInt8(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::Int16(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::UInt16(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::Int32(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::UInt32(values) => values.iter().map(|&v| i64::from(v)).collect(),
        Array::Float(_) => return None,
    };
    Some(values)
}

/// Converts an integer to the smallest signed SAM integer type that holds it.
fn to_smallest_signed_int(value: i32) -> Value {
    if let Ok(v) = i8::try_from(value) {
        Value::Int8(v)
    } else if let Ok(v) = i16::try_from(value) {
        Value::Int16(v)
    } else {
        Value::Int32(value)
    }
}

fn to_buf_value(value: TagValue) -> Value {
    match value {
        TagValue::Int(i) => match i32::try_from(i) {
            Ok(v) => to_smallest_signed_int(v),
            Err(_) => Value::String(BString::from(i.to_string())),
        },
        TagValue::Float(x) => Value::Float(x),
        TagValue::String(s) => Value::String(BString::from(s)),
        TagValue::IntArray(values) => Value::Array(Array::Int32(
            values
                .into_iter()
                .map(|v| i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX }))
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordBuilder;

    #[test]
    fn test_parse_md_matches_and_mismatches() {
        assert_eq!(parse_md(b"4"), Some(vec![None; 4]));
        assert_eq!(parse_md(b"2C1"), Some(vec![None, None, Some(b'C'), None]));
        assert_eq!(parse_md(b"0A0c"), Some(vec![Some(b'A'), Some(b'C')]));
    }

    #[test]
    fn test_parse_md_skips_deletions() {
        assert_eq!(parse_md(b"2^AC2"), Some(vec![None; 4]));
        assert_eq!(parse_md(b"1^G0T1"), Some(vec![None, Some(b'T'), None]));
        assert_eq!(parse_md(b"1-1"), None);
    }

    #[test]
    fn test_span_is_zero_based_half_open() {
        let record = RecordBuilder::mapped("chr1", 101, "ACGTACGT").build();
        assert_eq!(record.reference_start(), Some(100));
        assert_eq!(record.reference_end(), Some(108));
        assert_eq!(record.reference_name(), Some("chr1"));
    }

    #[test]
    fn test_unmapped_record_has_no_span() {
        let record = RecordBuilder::unmapped("ACGT").build();
        assert_eq!(record.reference_start(), None);
        assert_eq!(record.reference_end(), None);
        assert!(record.aligned_pairs().is_empty());
    }

    #[test]
    fn test_aligned_pairs_with_md() {
        let record = RecordBuilder::mapped("chr1", 11, "AATTG")
            .cigar("1S2M1I1M")
            .tag(*b"MD", "1C1")
            .build();
        let pairs = record.aligned_pairs();
        assert_eq!(
            pairs,
            vec![
                AlignedPair { query_pos: 1, ref_pos: 10, ref_base: Some(b'A') },
                AlignedPair { query_pos: 2, ref_pos: 11, ref_base: Some(b'C') },
                AlignedPair { query_pos: 4, ref_pos: 12, ref_base: Some(b'G') },
            ]
        );
    }

    #[test]
    fn test_aligned_pairs_without_md_have_no_reference_bases() {
        let record = RecordBuilder::mapped("chr1", 1, "ACG").cigar("1M2D2M").build();
        let pairs = record.aligned_pairs();
        assert_eq!(pairs.iter().map(|p| p.ref_pos).collect::<Vec<_>>(), vec![0, 3, 4]);
        assert!(pairs.iter().all(|p| p.ref_base.is_none()));
    }

    #[test]
    fn test_tag_round_trip_and_removal() {
        let mut record = RecordBuilder::mapped("chr1", 1, "ACGT").build();
        record.set_tag(*b"pP", Some(TagValue::Int(300)));
        record.set_tag(*b"pE", Some(TagValue::from("chr1:2 C>T")));
        record.set_tag(*b"jM", Some(TagValue::IntArray(vec![-1])));
        assert_eq!(record.tag(*b"pP"), Some(TagValue::Int(300)));
        assert_eq!(record.tag(*b"pE"), Some(TagValue::from("chr1:2 C>T")));
        assert_eq!(record.tag(*b"jM"), Some(TagValue::IntArray(vec![-1])));

        record.set_tag(*b"jM", None);
        assert!(!record.has_tag(*b"jM"));
    }

    #[test]
    fn test_read_flags_can_be_normalized() {
        let mut record = RecordBuilder::mapped("chr1", 1, "ACGT").read2().build();
        assert!(record.is_read2());
        record.set_read1(true);
        record.set_read2(false);
        assert!(record.is_read1());
        assert!(!record.is_read2());
    }
}
