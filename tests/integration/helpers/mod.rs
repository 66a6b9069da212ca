//! Helper utilities for integration tests.

use std::sync::Arc;

use scmo_lib::clustering::{ClusteringOptions, MoleculeClusterer};
use scmo_lib::fragment::{FragmentAssembler, FragmentOptions};
use scmo_lib::molecule::MoleculeFactory;
use scmo_lib::record::{AlignmentRecord, SamRecord};
use scmo_lib::reference::{ReferenceReader, ReferenceSequence};
use scmo_lib::tags::{self, TagKey, TagValue};
use scmo_lib::testutil::RecordBuilder;

/// Sample used by every generated read.
pub const CELL: &str = "cell_1";

/// A single-contig in-memory reference.
pub fn reference(contig: &str, bases: &str) -> Arc<dyn ReferenceSequence> {
    Arc::new(ReferenceReader::from_sequences([(contig, bases)]))
}

/// An unpaired forward read on `chr1` at the 1-based `start`, tagged with sample and UMI.
pub fn single_read(name: &str, start: usize, sequence: &str, umi: &str) -> SamRecord {
    RecordBuilder::mapped("chr1", start, sequence)
        .name(name)
        .tag(tags::SAMPLE, CELL)
        .tag(tags::UMI, umi)
        .build()
}

/// A forward read 1 / reverse read 2 pair on `chr1`, in coordinate order.
///
/// # Arguments
///
/// * `name` - Template name shared by both mates
/// * `r1_start` - 1-based start of read 1
/// * `r2_start` - 1-based start of read 2
/// * `length` - Length of both reads; every base is `A`
/// * `umi` - UMI placed on both mates
pub fn read_pair(
    name: &str,
    r1_start: usize,
    r2_start: usize,
    length: usize,
    umi: &str,
) -> [SamRecord; 2] {
    let sequence = "A".repeat(length);
    let r1 = RecordBuilder::mapped("chr1", r1_start, &sequence)
        .name(name)
        .read1()
        .tag(tags::SAMPLE, CELL)
        .tag(tags::UMI, umi)
        .build();
    let r2 = RecordBuilder::mapped("chr1", r2_start, &sequence)
        .name(name)
        .read2()
        .reverse()
        .tag(tags::SAMPLE, CELL)
        .tag(tags::UMI, umi)
        .build();
    [r1, r2]
}

/// Runs records through mate pairing and molecule assignment and returns the tagged records.
pub fn run_pipeline(
    records: Vec<SamRecord>,
    factory: MoleculeFactory,
    fragment_options: FragmentOptions,
    options: ClusteringOptions,
) -> Vec<SamRecord> {
    let fragments = FragmentAssembler::new(records.into_iter(), fragment_options);
    let clusterer = MoleculeClusterer::new(fragments, factory, options).unwrap();
    let mut output = Vec::new();
    for molecule in clusterer {
        output.extend(molecule.unwrap().into_records());
    }
    output
}

/// String value of `tag` on `record`, if present.
pub fn tag_str(record: &SamRecord, tag: TagKey) -> Option<String> {
    record.tag(tag).and_then(|value| value.as_str().map(str::to_string))
}

/// Integer value of `tag` on `record`, if present.
pub fn tag_int(record: &SamRecord, tag: TagKey) -> Option<i64> {
    record.tag(tag).as_ref().and_then(TagValue::as_int)
}

/// Query name of `record` as a string.
pub fn name_of(record: &SamRecord) -> String {
    String::from_utf8_lossy(record.query_name().unwrap_or_default()).into_owned()
}
