//! Two-character tag vocabulary and tag decoding rules.
//!
//! Tags read from the input (sample, UMI, splice junctions) and tags written back onto the
//! reads by molecule assignment, protocol capabilities and conversion calling all live here
//! so that every module refers to the same codes.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A two-character SAM tag key.
pub type TagKey = [u8; 2];

/// Sample name.
pub const SAMPLE: TagKey = *b"SM";
/// Raw UMI sequence.
pub const UMI: TagKey = *b"RX";
/// Molecule identifier assigned by the clusterer.
pub const MOLECULE_ID: TagKey = *b"MI";
/// Rejection reason code.
pub const REJECTION_REASON: TagKey = *b"RR";
/// Recognized (restriction site) sequence.
pub const RECOGNIZED_SEQUENCE: TagKey = *b"RZ";
/// Protocol cut site location.
pub const CUT_SITE: TagKey = *b"DS";
/// Number of reads (over all fragments) assigned to the molecule.
pub const MOLECULE_READ_COUNT: TagKey = *b"af";
/// Number of fragments assigned to the molecule.
pub const MOLECULE_FRAGMENT_COUNT: TagKey = *b"TF";
/// Consensus-supporting read bases that differ from the reference.
pub const MISMATCH_COUNT: TagKey = *b"mM";
/// Transitions seen in consensus-supporting read bases.
pub const CONVERSION_COUNT: TagKey = *b"pP";
/// `C>T` and `T>C` transitions, in sequencing orientation.
pub const REVERSE_CONVERSION_COUNT: TagKey = *b"pR";
/// `A>G` and `G>A` transitions, in sequencing orientation.
pub const FORWARD_CONVERSION_COUNT: TagKey = *b"pF";
/// Comma separated list of transition sites.
pub const CONVERSION_SITES: TagKey = *b"pE";
/// Per-read bismark style conversion call string.
pub const CONVERSION_CALL_STRING: TagKey = *b"XM";
/// Names of overlapping transcriptome features.
pub const FEATURE_NAMES: TagKey = *b"XT";
/// Kinds of overlapping transcriptome features.
pub const FEATURE_KINDS: TagKey = *b"XF";
/// Splice junction motif array written by STAR.
pub const JUNCTION_MOTIFS: TagKey = *b"jM";
/// Splice junction intron coordinate array written by STAR.
pub const JUNCTION_INTRONS: TagKey = *b"jI";

/// Returns the histogram tag used for a context call code.
///
/// The tag is `s` followed by the code; the unclassified sentinel `.` is not a valid tag
/// character and uses `sU`.
#[must_use]
pub const fn context_count_tag(code: u8) -> TagKey {
    match code {
        b'.' => *b"sU",
        other => [b's', other],
    }
}

/// A tag value stored on a record or in molecule metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    /// Integer value (`i` type)
    Int(i64),
    /// Floating point value (`f` type)
    Float(f32),
    /// String value (`Z` type)
    String(String),
    /// Integer array (`B` type)
    IntArray(Vec<i64>),
}

impl TagValue {
    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::IntArray(values) => {
                let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for TagValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// How the value of a tag should be interpreted when it is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagKind {
    /// Nucleotide sequence, compared case-insensitively
    Sequence,
    /// Free text
    Text,
    /// Integer count or coordinate
    Integer,
}

/// Description and decoding rule for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    /// Human readable description
    pub description: String,
    /// Decoding rule
    pub kind: TagKind,
}

/// Mapping of tag key to its decoding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinitions {
    definitions: AHashMap<TagKey, TagDefinition>,
}

impl TagDefinitions {
    /// Creates an empty set of definitions.
    #[must_use]
    pub fn empty() -> Self {
        Self { definitions: AHashMap::new() }
    }

    /// Adds or replaces the definition of `tag`.
    #[must_use]
    pub fn with(mut self, tag: TagKey, kind: TagKind, description: &str) -> Self {
        self.definitions.insert(tag, TagDefinition { description: description.to_string(), kind });
        self
    }

    /// Returns the definition for `tag`, if any.
    #[must_use]
    pub fn get(&self, tag: TagKey) -> Option<&TagDefinition> {
        self.definitions.get(&tag)
    }

    /// Decodes a raw tag value into text according to the tag's rule.
    ///
    /// Sequence tags are uppercased. Integer values are rendered in decimal. Tags without a
    /// definition are decoded as text.
    #[must_use]
    pub fn decode_text(&self, tag: TagKey, value: &TagValue) -> Option<String> {
        let kind = self.get(tag).map_or(TagKind::Text, |d| d.kind);
        match (kind, value) {
            (TagKind::Sequence, TagValue::String(s)) => Some(s.to_ascii_uppercase()),
            (_, TagValue::String(s)) => Some(s.clone()),
            (_, TagValue::Int(i)) => Some(i.to_string()),
            (_, TagValue::Float(_) | TagValue::IntArray(_)) => None,
        }
    }

    /// Number of defined tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no tags are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for TagDefinitions {
    fn default() -> Self {
        Self::empty()
            .with(SAMPLE, TagKind::Text, "sample")
            .with(UMI, TagKind::Sequence, "umi")
            .with(MOLECULE_ID, TagKind::Text, "molecule identifier")
            .with(REJECTION_REASON, TagKind::Text, "rejection reason")
            .with(RECOGNIZED_SEQUENCE, TagKind::Sequence, "recognized sequence")
            .with(CUT_SITE, TagKind::Integer, "cut site")
            .with(MOLECULE_READ_COUNT, TagKind::Integer, "reads in molecule")
            .with(MOLECULE_FRAGMENT_COUNT, TagKind::Integer, "fragments in molecule")
            .with(MISMATCH_COUNT, TagKind::Integer, "consensus mismatches")
            .with(CONVERSION_COUNT, TagKind::Integer, "conversions")
            .with(REVERSE_CONVERSION_COUNT, TagKind::Integer, "reverse strand conversions")
            .with(FORWARD_CONVERSION_COUNT, TagKind::Integer, "forward strand conversions")
            .with(CONVERSION_SITES, TagKind::Text, "converted sites")
            .with(CONVERSION_CALL_STRING, TagKind::Text, "conversion call string")
            .with(FEATURE_NAMES, TagKind::Text, "overlapping features")
            .with(FEATURE_KINDS, TagKind::Text, "overlapping feature kinds")
    }
}
