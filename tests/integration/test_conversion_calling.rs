//! TAPS conversion calling on whole molecules.

use scmo_lib::clustering::ClusteringOptions;
use scmo_lib::fragment::FragmentOptions;
use scmo_lib::molecule::{Flavor, MoleculeFactory};
use scmo_lib::record::SamRecord;
use scmo_lib::tags::{self, context_count_tag};
use scmo_lib::testutil::RecordBuilder;

use crate::helpers::{CELL, name_of, reference, run_pipeline, single_read, tag_int, tag_str};

/// `CATG` site at 100 followed by a CpG whose C sits at 104.
fn site_reference() -> String {
    format!("{}CATGCGAT{}", "A".repeat(100), "A".repeat(100))
}

fn taps_records(sequence: &str, copies: usize) -> Vec<SamRecord> {
    (0..copies).map(|i| single_read(&format!("q{i}"), 101, sequence, "ACGT")).collect()
}

fn run(flavor: Flavor, records: Vec<SamRecord>) -> Vec<SamRecord> {
    let factory = MoleculeFactory::new(flavor, reference("chr1", &site_reference()), None).unwrap();
    run_pipeline(records, factory, FragmentOptions::default(), ClusteringOptions::default())
}

#[test]
fn test_converted_cpg_is_called_and_summarised() {
    let output = run(Flavor::TapsNlaIii, taps_records("CATGTGAT", 3));
    assert_eq!(output.len(), 3);

    for record in &output {
        assert_eq!(tag_str(record, tags::REJECTION_REASON), None);
        assert_eq!(tag_str(record, tags::CONVERSION_CALL_STRING).as_deref(), Some("h...Z..."));
        assert_eq!(tag_str(record, tags::CONVERSION_SITES).as_deref(), Some("chr1:105 C>T"));
        // one C>T per supporting read
        assert_eq!(tag_int(record, tags::CONVERSION_COUNT), Some(3));
        assert_eq!(tag_int(record, tags::FORWARD_CONVERSION_COUNT), Some(0));
        assert_eq!(tag_int(record, tags::REVERSE_CONVERSION_COUNT), Some(3));
        assert_eq!(tag_int(record, tags::MISMATCH_COUNT), Some(3));
        assert_eq!(tag_int(record, context_count_tag(b'Z')), Some(1));
        assert_eq!(tag_int(record, context_count_tag(b'h')), Some(1));
        assert_eq!(tag_int(record, tags::CUT_SITE), Some(100));
    }
}

#[test]
fn test_unconverted_molecule_reports_lowercase_contexts() {
    let output = run(Flavor::TapsNlaIii, taps_records("CATGCGAT", 2));

    for record in &output {
        assert_eq!(tag_str(record, tags::CONVERSION_CALL_STRING).as_deref(), Some("h...z..."));
        assert_eq!(tag_int(record, tags::CONVERSION_COUNT), Some(0));
        assert_eq!(tag_str(record, tags::CONVERSION_SITES).as_deref(), Some(""));
        assert_eq!(tag_int(record, context_count_tag(b'z')), Some(1));
        assert_eq!(tag_int(record, tags::MISMATCH_COUNT), Some(0));
    }
}

#[test]
fn test_majority_decides_the_consensus_call() {
    // two converted reads outvote one unconverted read
    let mut records = taps_records("CATGTGAT", 2);
    records.push(single_read("q_ref", 101, "CATGCGAT", "ACGT"));
    let output = run(Flavor::TapsChic, records);

    assert_eq!(output.len(), 3);
    for record in &output {
        assert_eq!(tag_str(record, tags::RECOGNIZED_SEQUENCE).as_deref(), Some("C"));
        // the outvoted read does not contribute to the counts
        assert_eq!(tag_int(record, tags::CONVERSION_COUNT), Some(2));
        assert_eq!(tag_int(record, tags::MISMATCH_COUNT), Some(2));
    }
    let reference_read = output
        .iter()
        .find(|r| name_of(r) == "q_ref")
        .expect("reference read is emitted");
    // the call string is projected from the consensus, not from the read's own base
    assert_eq!(
        tag_str(reference_read, tags::CONVERSION_CALL_STRING).as_deref(),
        Some("h...Z...")
    );
}

#[test]
fn test_reverse_molecule_reports_complemented_sites() {
    // reverse reads ending on the CpG: the G at 105 reads as A on the reference strand
    let records: Vec<SamRecord> = (0..2)
        .map(|i| {
            RecordBuilder::mapped("chr1", 99, "AACATGCAAT")
                .name(&format!("r{i}"))
                .reverse()
                .tag(tags::SAMPLE, CELL)
                .tag(tags::UMI, "ACGT")
                .build()
        })
        .collect();
    let output = run(Flavor::TapsChic, records);

    assert_eq!(output.len(), 2);
    for record in &output {
        assert_eq!(tag_str(record, tags::REJECTION_REASON), None);
        assert_eq!(tag_str(record, tags::CONVERSION_SITES).as_deref(), Some("chr1:106 C>T"));
        assert_eq!(tag_int(record, tags::CONVERSION_COUNT), Some(2));
        assert_eq!(tag_int(record, tags::FORWARD_CONVERSION_COUNT), Some(0));
        assert_eq!(tag_int(record, tags::REVERSE_CONVERSION_COUNT), Some(2));
        assert_eq!(tag_int(record, context_count_tag(b'Z')), Some(1));
        assert_eq!(tag_int(record, context_count_tag(b'h')), Some(1));
        assert_eq!(tag_str(record, tags::CONVERSION_CALL_STRING).as_deref(), Some(".....h.Z.."));
    }
}

#[test]
fn test_base_flavor_writes_no_conversion_tags() {
    let output = run(Flavor::Base, taps_records("CATGTGAT", 2));
    for record in &output {
        assert_eq!(tag_str(record, tags::CONVERSION_CALL_STRING), None);
        assert_eq!(tag_int(record, tags::CONVERSION_COUNT), None);
        assert_eq!(tag_int(record, tags::CUT_SITE), None);
    }
}
