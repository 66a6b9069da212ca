//! Reference genome access.
//!
//! Molecules only ever need read-only `fetch` calls against the reference, so the
//! collaborator is the small [`ReferenceSequence`] trait. [`ReferenceReader`] implements it
//! with every contig of a FASTA file held in memory behind an `Arc`, which makes clones cheap
//! and lets parallel clustering windows share one copy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use log::debug;
use noodles::fasta;

use crate::errors::{Result, ScmoError};

/// Random access to reference bases.
pub trait ReferenceSequence: Send + Sync {
    /// Returns the uppercase bases of `contig` over the 0-based half-open interval
    /// `[start, end)`.
    ///
    /// An `end` past the contig end is clamped. A `start` past the contig end, or a `start`
    /// greater than `end`, is an error.
    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>>;

    /// Returns the uppercase base at a single 0-based position.
    fn base_at(&self, contig: &str, position: usize) -> Result<u8> {
        let bases = self.fetch(contig, position, position + 1)?;
        bases.first().copied().ok_or_else(|| ScmoError::RegionOutOfBounds {
            contig: contig.to_string(),
            start: position,
            end: position + 1,
            length: position,
        })
    }
}

/// A thread-safe reference genome reader with all sequences preloaded into memory.
#[derive(Debug, Clone, Default)]
pub struct ReferenceReader {
    sequences: Arc<HashMap<String, Vec<u8>>>,
}

impl ReferenceReader {
    /// Loads every record of a FASTA file.
    ///
    /// # Errors
    /// Returns an error if the file does not exist or cannot be parsed as FASTA.
    pub fn new<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        debug!("Reading reference FASTA into memory: {}", path.display());

        let mut reader = fasta::io::reader::Builder
            .build_from_path(path)
            .with_context(|| format!("Failed to open reference FASTA: {}", path.display()))?;

        let mut sequences = HashMap::new();
        for result in reader.records() {
            let record = result
                .with_context(|| format!("Failed to parse reference FASTA: {}", path.display()))?;
            let name = std::str::from_utf8(record.name())?.to_string();
            let bases: &[u8] = record.sequence().as_ref();
            sequences.insert(name, bases.to_ascii_uppercase());
        }

        debug!("Loaded {} contigs into memory", sequences.len());
        Ok(Self { sequences: Arc::new(sequences) })
    }

    /// Builds a reader from in-memory `(name, bases)` pairs.
    #[must_use]
    pub fn from_sequences<I, N, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: AsRef<[u8]>,
    {
        let sequences = sequences
            .into_iter()
            .map(|(name, bases)| (name.into(), bases.as_ref().to_ascii_uppercase()))
            .collect();
        Self { sequences: Arc::new(sequences) }
    }

    /// Length of `contig`, if present.
    #[must_use]
    pub fn contig_length(&self, contig: &str) -> Option<usize> {
        self.sequences.get(contig).map(Vec::len)
    }

    /// Names of all loaded contigs, sorted.
    #[must_use]
    pub fn contig_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ReferenceSequence for ReferenceReader {
    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>> {
        let sequence = self
            .sequences
            .get(contig)
            .ok_or_else(|| ScmoError::ReferenceNotFound { ref_name: contig.to_string() })?;

        if start > end || start > sequence.len() {
            return Err(ScmoError::RegionOutOfBounds {
                contig: contig.to_string(),
                start,
                end,
                length: sequence.len(),
            });
        }
        Ok(sequence[start..end.min(sequence.len())].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reader() -> ReferenceReader {
        ReferenceReader::from_sequences([("chr1", "acgtACGTNN"), ("chr2", "CCCC")])
    }

    #[test]
    fn test_fetch_is_uppercase_and_half_open() {
        let reference = reader();
        assert_eq!(reference.fetch("chr1", 0, 4).unwrap(), b"ACGT".to_vec());
        assert_eq!(reference.fetch("chr1", 3, 3).unwrap(), Vec::<u8>::new());
        assert_eq!(reference.base_at("chr1", 4).unwrap(), b'A');
    }

    #[test]
    fn test_fetch_clamps_end() {
        let reference = reader();
        assert_eq!(reference.fetch("chr2", 2, 10).unwrap(), b"CC".to_vec());
    }

    #[test]
    fn test_fetch_errors() {
        let reference = reader();
        assert!(matches!(
            reference.fetch("chrX", 0, 1),
            Err(ScmoError::ReferenceNotFound { .. })
        ));
        assert!(matches!(
            reference.fetch("chr2", 5, 6),
            Err(ScmoError::RegionOutOfBounds { length: 4, .. })
        ));
        assert!(reference.base_at("chr2", 4).is_err());
    }

    #[test]
    fn test_contig_metadata() {
        let reference = reader();
        assert_eq!(reference.contig_length("chr1"), Some(10));
        assert_eq!(reference.contig_names(), vec!["chr1", "chr2"]);
    }

    #[test]
    fn test_load_from_fasta() -> AnyResult<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, ">chr1 test contig")?;
        writeln!(file, "ACGTAC")?;
        writeln!(file, "gtac")?;
        writeln!(file, ">chr2")?;
        writeln!(file, "TTTT")?;
        file.flush()?;

        let reference = ReferenceReader::new(file.path())?;
        assert_eq!(reference.fetch("chr1", 4, 8)?, b"ACGT".to_vec());
        assert_eq!(reference.contig_length("chr2"), Some(4));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(ReferenceReader::new("/nonexistent/reference.fa").is_err());
    }
}
