//! Rejection reason tracking for molecules.
//!
//! Every molecule that fails validation carries exactly one [`RejectionReason`]. The reason's
//! short code is written to the reads in the `RR` tag so rejected molecules stay auditable
//! downstream instead of silently disappearing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons why a molecule was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The molecule span is missing a contig, start or end
    InvalidSpan,
    /// No read in the molecule had an aligned base
    NoConsensus,
    /// The aligned positions of the reads could not be resolved against the reference
    GenomicLocationsFailed,
    /// Conversion calling did not produce calls for this molecule
    ConversionCallsFailed,
    /// The protocol-specific restriction site could not be recognized
    InvalidRestrictionSite,
    /// No protocol-specific cut site could be derived
    NoCutSite,
    /// Every read in the molecule is multimapping
    Multimapped,
}

impl RejectionReason {
    /// Returns the stable short code written to the `RR` tag.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSpan => "invalid_span",
            Self::NoConsensus => "no_consensus",
            Self::GenomicLocationsFailed => "getPairGenomicLocations_failed",
            Self::ConversionCallsFailed => "methylation_calls_failed",
            Self::InvalidRestrictionSite => "invalid_restriction_site",
            Self::NoCutSite => "no_cut_site",
            Self::Multimapped => "multimapped",
        }
    }

    /// Returns a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidSpan => "Molecule span is not fully defined",
            Self::NoConsensus => "No consensus could be obtained",
            Self::GenomicLocationsFailed => "Aligned positions could not be resolved",
            Self::ConversionCallsFailed => "Conversion calls could not be obtained",
            Self::InvalidRestrictionSite => "Restriction site was not recognized",
            Self::NoCutSite => "No cut site could be derived",
            Self::Multimapped => "All reads are multimapping",
        }
    }

    /// All reasons, in declaration order.
    #[must_use]
    pub fn all() -> &'static [RejectionReason] {
        &[
            Self::InvalidSpan,
            Self::NoConsensus,
            Self::GenomicLocationsFailed,
            Self::ConversionCallsFailed,
            Self::InvalidRestrictionSite,
            Self::NoCutSite,
            Self::Multimapped,
        ]
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use scmo_lib::rejection::format_count;
///
/// assert_eq!(format_count(1234567), "1,234,567");
/// assert_eq!(format_count(123), "123");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<_> = RejectionReason::all().iter().map(RejectionReason::code).collect();
        assert_eq!(codes.len(), RejectionReason::all().len());
    }

    #[test]
    fn test_display_uses_description() {
        assert_eq!(RejectionReason::NoConsensus.to_string(), "No consensus could be obtained");
        assert_eq!(RejectionReason::NoConsensus.code(), "no_consensus");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(123), "123");
        assert_eq!(format_count(1234), "1,234");
        assert_eq!(format_count(123_456), "123,456");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_count(1_000_000_000), "1,000,000,000");
    }
}
