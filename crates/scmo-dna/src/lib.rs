#![deny(unsafe_code)]

//! DNA sequence utilities and constants.
//!
//! This crate provides the small set of base-level operations shared by the `scmo` crates:
//! - Complement and reverse-complement of DNA sequences
//! - Hamming distance between equal-length sequences (UMI comparison)
//! - Constants for no-call handling

/// No-call base character.
pub const NO_CALL_BASE: u8 = b'N';

/// The four canonical bases in alphabetical order.
pub const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Complements a single DNA base, normalizing A/C/G/T to uppercase.
///
/// Bases outside `ACGTacgt` (including `N`) are returned unchanged.
///
/// # Examples
///
/// ```
/// use scmo_dna::complement_base;
///
/// assert_eq!(complement_base(b'A'), b'T');
/// assert_eq!(complement_base(b'g'), b'C');
/// assert_eq!(complement_base(b'N'), b'N');
/// ```
#[inline]
#[must_use]
pub const fn complement_base(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'T' | b't' => b'A',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        _ => base,
    }
}

/// Reverse complements a DNA sequence.
///
/// # Examples
///
/// ```
/// use scmo_dna::reverse_complement;
///
/// assert_eq!(reverse_complement(b"ACGT"), b"ACGT".to_vec());
/// assert_eq!(reverse_complement(b"CAAG"), b"CTTG".to_vec());
/// assert_eq!(reverse_complement(b"acgN"), b"NCGT".to_vec());
/// ```
#[must_use]
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&base| complement_base(base)).collect()
}

/// Reverse complements a DNA string.
#[must_use]
pub fn reverse_complement_str(seq: &str) -> String {
    String::from_utf8(reverse_complement(seq.as_bytes()))
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Counts the positions at which two sequences differ.
///
/// Hamming distance is only defined for sequences of equal length; `None` is returned
/// when the lengths differ so that callers can decide how to treat the comparison.
///
/// # Examples
///
/// ```
/// use scmo_dna::hamming_distance;
///
/// assert_eq!(hamming_distance(b"ACGT", b"ACGT"), Some(0));
/// assert_eq!(hamming_distance(b"ACGT", b"ACTT"), Some(1));
/// assert_eq!(hamming_distance(b"ACG", b"ACGT"), None);
/// ```
#[must_use]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<usize> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).filter(|(x, y)| x != y).count())
}

/// Returns the index of `base` in [`BASES`], or `None` for anything but `ACGTacgt`.
#[inline]
#[must_use]
pub const fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}
