//! Protocol and annotation flavors run through the full pipeline.

use std::sync::Arc;

use scmo_lib::clustering::ClusteringOptions;
use scmo_lib::fragment::FragmentOptions;
use scmo_lib::molecule::transcriptome::{Feature, FeatureLookup, IntervalFeatures};
use scmo_lib::molecule::{Flavor, MoleculeFactory};
use scmo_lib::record::SamRecord;
use scmo_lib::tags;

use crate::helpers::{name_of, reference, run_pipeline, single_read, tag_int, tag_str};

fn site_reference() -> String {
    format!("{}CATGAAAAGATGAAAA{}", "A".repeat(100), "A".repeat(100))
}

fn features() -> Arc<dyn FeatureLookup> {
    let features: IntervalFeatures = [
        Feature::new("GENE_A", "exon", "chr1", 90, 110),
        Feature::new("GENE_B", "intron", "chr1", 105, 200),
        Feature::new("GENE_C", "exon", "chr2", 0, 500),
    ]
    .into_iter()
    .collect();
    Arc::new(features)
}

fn run(flavor: Flavor, records: Vec<SamRecord>) -> Vec<SamRecord> {
    let factory =
        MoleculeFactory::new(flavor, reference("chr1", &site_reference()), Some(features()))
            .unwrap();
    run_pipeline(records, factory, FragmentOptions::default(), ClusteringOptions::default())
}

#[test]
fn test_annotated_nla_iii_tags_cut_site_and_features() {
    let records = vec![
        single_read("q1", 101, "CATGAAAA", "AAAA"),
        single_read("q2", 101, "CATGAAAA", "AAAA"),
    ];
    let output = run(Flavor::AnnotatedNlaIii, records);

    assert_eq!(output.len(), 2);
    for record in &output {
        assert_eq!(tag_str(record, tags::REJECTION_REASON), None);
        assert_eq!(tag_int(record, tags::CUT_SITE), Some(100));
        assert_eq!(tag_str(record, tags::RECOGNIZED_SEQUENCE).as_deref(), Some("CATG"));
        assert_eq!(tag_str(record, tags::FEATURE_NAMES).as_deref(), Some("GENE_A,GENE_B"));
        assert_eq!(tag_str(record, tags::FEATURE_KINDS).as_deref(), Some("exon,intron"));
    }
}

#[test]
fn test_unrecognized_site_is_rejected_but_emitted() {
    let records = vec![
        single_read("good", 101, "CATGAAAA", "AAAA"),
        single_read("bad", 109, "GATGAAAA", "CCCC"),
    ];
    let output = run(Flavor::NlaIii, records);

    assert_eq!(output.len(), 2);
    let good = output.iter().find(|r| name_of(r) == "good").unwrap();
    let bad = output.iter().find(|r| name_of(r) == "bad").unwrap();
    assert_eq!(tag_str(good, tags::REJECTION_REASON), None);
    assert_eq!(
        tag_str(bad, tags::REJECTION_REASON).as_deref(),
        Some("invalid_restriction_site")
    );
    assert_eq!(tag_str(bad, tags::RECOGNIZED_SEQUENCE).as_deref(), Some("GATG"));
}

#[test]
fn test_nla_iii_separates_different_cut_sites() {
    // one base apart is within the assignment radius, but the cut sites differ
    let records = vec![
        single_read("q1", 101, "CATGAAAA", "AAAA"),
        single_read("q2", 102, "ATGAAAAG", "AAAA"),
    ];

    let base = run(Flavor::Base, records.clone());
    assert_eq!(tag_str(&base[0], tags::MOLECULE_ID), tag_str(&base[1], tags::MOLECULE_ID));

    let nla = run(Flavor::NlaIii, records);
    assert_ne!(tag_str(&nla[0], tags::MOLECULE_ID), tag_str(&nla[1], tags::MOLECULE_ID));
}

#[test]
fn test_chic_uses_read_start_as_cut_site() {
    let records = vec![
        single_read("q1", 111, "TGAAAAAA", "AAAA"),
        single_read("q2", 111, "TGAAAAAA", "AAAA"),
    ];
    let output = run(Flavor::AnnotatedChic, records);

    for record in &output {
        assert_eq!(tag_str(record, tags::REJECTION_REASON), None);
        assert_eq!(tag_int(record, tags::CUT_SITE), Some(110));
        assert_eq!(tag_str(record, tags::RECOGNIZED_SEQUENCE).as_deref(), Some("T"));
        assert_eq!(tag_str(record, tags::FEATURE_NAMES).as_deref(), Some("GENE_B"));
    }
}

#[test]
fn test_annotated_flavor_requires_features() {
    let result = MoleculeFactory::new(
        Flavor::AnnotatedTapsChic,
        reference("chr1", &site_reference()),
        None,
    );
    assert!(result.is_err());
}
