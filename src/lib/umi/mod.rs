//! UMI comparison.
//!
//! UMIs are compared by Hamming distance, which is only defined for equal-length sequences.
//! Unlike a plain mismatch count, the functions here refuse to compare sequences of different
//! lengths and report a [`ScmoError::LengthMismatch`] instead of truncating or treating the
//! pair as maximally distant, so callers decide how to handle badly formed UMIs.

use scmo_dna::hamming_distance;

use crate::errors::{Result, ScmoError};

/// Counts the positions at which two equal-length UMIs differ.
///
/// # Errors
///
/// Returns [`ScmoError::LengthMismatch`] when the UMIs differ in length.
///
/// # Examples
///
/// ```
/// use scmo_lib::umi::umi_distance;
///
/// assert_eq!(umi_distance("ACGT", "ACTT").unwrap(), 1);
/// assert!(umi_distance("ACG", "ACGT").is_err());
/// ```
pub fn umi_distance(a: &str, b: &str) -> Result<usize> {
    hamming_distance(a.as_bytes(), b.as_bytes())
        .ok_or_else(|| ScmoError::LengthMismatch { left: a.to_string(), right: b.to_string() })
}

/// Checks whether two UMIs are the same molecule under a mismatch threshold.
///
/// A threshold of zero requires exact equality, in which case sequences of different lengths
/// are simply unequal. Any other threshold compares by Hamming distance and errors on a
/// length mismatch.
///
/// # Errors
///
/// Returns [`ScmoError::LengthMismatch`] when `max_mismatches > 0` and the UMIs differ in
/// length.
pub fn umi_matches(a: &str, b: &str, max_mismatches: usize) -> Result<bool> {
    if max_mismatches == 0 {
        return Ok(a == b);
    }
    Ok(umi_distance(a, b)? <= max_mismatches)
}
