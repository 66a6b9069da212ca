//! End-to-end molecule assignment: mate pairing, clustering and tag output.

use std::collections::{BTreeMap, BTreeSet};

use scmo_lib::clustering::{ClusteringOptions, MoleculeClusterer, cluster_windows};
use scmo_lib::fragment::{Fragment, FragmentAssembler, FragmentOptions};
use scmo_lib::molecule::{ClusterAnchor, Flavor, MoleculeFactory};
use scmo_lib::record::SamRecord;
use scmo_lib::tags;
use scmo_lib::testutil::RecordBuilder;

use crate::helpers::{name_of, read_pair, reference, run_pipeline, single_read, tag_int, tag_str};

fn base_factory() -> MoleculeFactory {
    MoleculeFactory::new(Flavor::Base, reference("chr1", &"A".repeat(1_000)), None).unwrap()
}

/// Coordinate sorted pairs: `a` and `b` are duplicates one UMI mismatch apart, `d` overlaps
/// them with an unrelated UMI and `c` lies further downstream.
fn sorted_pairs() -> Vec<SamRecord> {
    let [a1, a2] = read_pair("a", 101, 151, 20, "AAAA");
    let [b1, b2] = read_pair("b", 101, 151, 20, "AAAT");
    let [d1, d2] = read_pair("d", 102, 152, 20, "TTTT");
    let [c1, c2] = read_pair("c", 301, 351, 20, "AAAA");
    vec![a1, b1, d1, a2, b2, d2, c1, c2]
}

fn molecule_ids_by_name(records: &[SamRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .map(|r| (name_of(r), tag_str(r, tags::MOLECULE_ID).expect("every read gets an MI")))
        .collect()
}

#[test]
fn test_pairs_are_grouped_into_molecules() {
    let output = run_pipeline(
        sorted_pairs(),
        base_factory(),
        FragmentOptions::default(),
        ClusteringOptions::default(),
    );
    assert_eq!(output.len(), 8);

    let ids = molecule_ids_by_name(&output);
    assert_eq!(ids["a"], "0");
    assert_eq!(ids["b"], "0");
    assert_eq!(ids["d"], "1");
    assert_eq!(ids["c"], "2");

    for record in output.iter().filter(|r| ["a", "b"].contains(&name_of(r).as_str())) {
        assert_eq!(tag_int(record, tags::MOLECULE_FRAGMENT_COUNT), Some(2));
        assert_eq!(tag_int(record, tags::MOLECULE_READ_COUNT), Some(4));
        assert_eq!(tag_str(record, tags::SAMPLE).as_deref(), Some("cell_1"));
        assert_eq!(tag_str(record, tags::REJECTION_REASON), None);
    }
}

#[test]
fn test_shared_start_joins_molecule_despite_later_second_mate() {
    // a and b start together; b's read 2 only arrives after all of x has been read
    let [a1, a2] = read_pair("a", 101, 401, 20, "AAAA");
    let [b1, b2] = read_pair("b", 101, 801, 20, "AAAA");
    let [x1, x2] = read_pair("x", 451, 461, 20, "AAAA");
    let records = vec![a1, b1, a2, x1, x2, b2];

    let output = run_pipeline(
        records,
        base_factory(),
        FragmentOptions::default(),
        ClusteringOptions::default(),
    );
    assert_eq!(output.len(), 6);

    let ids = molecule_ids_by_name(&output);
    assert_eq!(ids["a"], ids["b"]);
    assert_ne!(ids["a"], ids["x"]);
    let a = output.iter().find(|r| name_of(r) == "a").unwrap();
    assert_eq!(tag_int(a, tags::MOLECULE_FRAGMENT_COUNT), Some(2));
}

#[test]
fn test_exact_umi_matching_splits_duplicates() {
    let options = FragmentOptions::default().with_umi_hamming_distance(0);
    let output =
        run_pipeline(sorted_pairs(), base_factory(), options, ClusteringOptions::default());

    let ids = molecule_ids_by_name(&output);
    assert_ne!(ids["a"], ids["b"]);
    assert_eq!(ids.values().collect::<BTreeSet<_>>().len(), 4);
}

#[test]
fn test_secondary_records_are_skipped_and_orphans_kept() {
    let mut records = sorted_pairs();
    let secondary = RecordBuilder::mapped("chr1", 101, &"A".repeat(20))
        .name("a")
        .secondary()
        .tag(tags::UMI, "AAAA")
        .build();
    let orphan = RecordBuilder::mapped("chr1", 105, &"A".repeat(20))
        .name("orphan")
        .read1()
        .tag(tags::SAMPLE, "cell_1")
        .tag(tags::UMI, "GGGG")
        .build();
    records.insert(1, secondary);
    records.insert(4, orphan);

    let fragments = FragmentAssembler::new(records.into_iter(), FragmentOptions::default());
    let mut clusterer =
        MoleculeClusterer::new(fragments, base_factory(), ClusteringOptions::default()).unwrap();
    let molecules: Vec<_> = clusterer.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(molecules.len(), 4);
    assert_eq!(clusterer.metrics().input_fragments, 5);
    assert_eq!(clusterer.metrics().input_reads, 9);

    let output: Vec<SamRecord> = molecules.into_iter().flat_map(|m| m.into_records()).collect();
    assert_eq!(output.len(), 9);
    let orphan = output.iter().find(|r| name_of(r) == "orphan").unwrap();
    assert_eq!(tag_int(orphan, tags::MOLECULE_FRAGMENT_COUNT), Some(1));
}

#[test]
fn test_latest_anchor_chains_staggered_fragments() {
    let records = vec![
        single_read("r1", 101, &"A".repeat(50), "AAAA"),
        single_read("r2", 104, &"A".repeat(50), "AAAA"),
        single_read("r3", 107, &"A".repeat(50), "AAAA"),
    ];

    let founder = run_pipeline(
        records.clone(),
        base_factory(),
        FragmentOptions::default(),
        ClusteringOptions::default(),
    );
    let founder_ids: BTreeSet<_> = molecule_ids_by_name(&founder).into_values().collect();
    assert_eq!(founder_ids.len(), 2);

    let options = ClusteringOptions { anchor: ClusterAnchor::Latest, ..Default::default() };
    let latest = run_pipeline(records, base_factory(), FragmentOptions::default(), options);
    let latest_ids: BTreeSet<_> = molecule_ids_by_name(&latest).into_values().collect();
    assert_eq!(latest_ids.len(), 1);
}

#[test]
fn test_multimapped_molecules_are_rejected_when_requested() {
    let records = vec![
        RecordBuilder::mapped("chr1", 101, &"A".repeat(20))
            .name("m1")
            .mapq(0)
            .tag(tags::UMI, "AAAA")
            .build(),
        RecordBuilder::mapped("chr1", 101, &"A".repeat(20))
            .name("m2")
            .mapq(0)
            .tag(tags::UMI, "AAAA")
            .build(),
    ];

    let kept = run_pipeline(
        records.clone(),
        base_factory(),
        FragmentOptions::default(),
        ClusteringOptions::default(),
    );
    assert!(kept.iter().all(|r| tag_str(r, tags::REJECTION_REASON).is_none()));

    let options = ClusteringOptions { reject_multimapped: true, ..Default::default() };
    let rejected = run_pipeline(records, base_factory(), FragmentOptions::default(), options);
    assert!(
        rejected
            .iter()
            .all(|r| tag_str(r, tags::REJECTION_REASON).as_deref() == Some("multimapped"))
    );
}

#[test]
fn test_windows_cluster_in_parallel_with_distinct_ids() {
    let window = |offset: usize| -> Vec<Fragment> {
        (0..3)
            .map(|i| {
                let read = single_read(&format!("w{offset}_{i}"), offset + 1, "AAAAAAAAAA", "AAAA");
                Fragment::new(Some(read), None, FragmentOptions::default()).unwrap()
            })
            .collect()
    };
    let windows = vec![window(100), window(500), window(900)];

    let (molecules, metrics) =
        cluster_windows(windows, &base_factory(), &ClusteringOptions::default()).unwrap();

    assert_eq!(molecules.len(), 3);
    assert_eq!(metrics.input_fragments, 9);
    assert_eq!(metrics.molecules, 3);
    assert_eq!(metrics.max_fragments_per_molecule, 3);

    let ids: Vec<u64> = molecules.iter().map(|m| m.molecule_id().unwrap()).collect();
    assert_eq!(ids, vec![0_u64, 1 << 32, 2 << 32]);
}

#[test]
fn test_molecule_limit_stops_early() {
    let options = ClusteringOptions { max_molecules: Some(2), ..Default::default() };
    let output = run_pipeline(sorted_pairs(), base_factory(), FragmentOptions::default(), options);
    let ids: BTreeSet<_> = molecule_ids_by_name(&output).into_values().collect();
    assert_eq!(ids.len(), 2);
}
