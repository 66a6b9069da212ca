//! Conversion calling against a reference loaded from a FASTA file.

use std::io::Write;
use std::sync::Arc;

use scmo_lib::clustering::ClusteringOptions;
use scmo_lib::fragment::FragmentOptions;
use scmo_lib::molecule::{Flavor, MoleculeFactory};
use scmo_lib::reference::{ReferenceReader, ReferenceSequence};
use scmo_lib::tags;
use tempfile::NamedTempFile;

use crate::helpers::{run_pipeline, single_read, tag_str};

fn write_fasta() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, ">chr1 test contig").unwrap();
    // wrapped at 60 columns; lowercase soft-masking must not affect calls
    let sequence = format!("{}catgcgat{}", "A".repeat(100), "A".repeat(100));
    for line in sequence.as_bytes().chunks(60) {
        file.write_all(line).unwrap();
        writeln!(file).unwrap();
    }
    writeln!(file, ">chr2").unwrap();
    writeln!(file, "ACGT").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_fasta_reference_drives_conversion_calls() {
    let fasta = write_fasta();
    let reader = ReferenceReader::new(fasta.path()).unwrap();
    assert_eq!(reader.contig_names(), vec!["chr1", "chr2"]);
    assert_eq!(reader.contig_length("chr1"), Some(208));
    assert_eq!(reader.fetch("chr1", 100, 104).unwrap(), b"CATG".to_vec());

    let reference: Arc<dyn ReferenceSequence> = Arc::new(reader);
    let factory = MoleculeFactory::new(Flavor::TapsNlaIii, reference, None).unwrap();
    let records = vec![
        single_read("q1", 101, "CATGTGAT", "AAAA"),
        single_read("q2", 101, "CATGTGAT", "AAAA"),
    ];
    let output =
        run_pipeline(records, factory, FragmentOptions::default(), ClusteringOptions::default());

    for record in &output {
        assert_eq!(tag_str(record, tags::CONVERSION_CALL_STRING).as_deref(), Some("h...Z..."));
        assert_eq!(tag_str(record, tags::CONVERSION_SITES).as_deref(), Some("chr1:105 C>T"));
    }
}

#[test]
fn test_missing_fasta_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ReferenceReader::new(dir.path().join("missing.fa"));
    assert!(result.is_err());
}
