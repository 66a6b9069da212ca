//! TAPS conversion calling.
//!
//! TAPS converts modified cytosines so they read out as `T` (or `A` on the opposite strand).
//! After consensus, every reference `C` on a forward molecule whose consensus is `C` or `T`
//! is a call site, and likewise every reference `G` on a reverse molecule whose consensus is
//! `G` or `A`. Each site gets a single-letter context code:
//!
//! | context        | unconverted | converted |
//! |----------------|-------------|-----------|
//! | `CG[ACGT]`     | `z`         | `Z`       |
//! | `C[ACT]G`      | `x`         | `X`       |
//! | `C[ACT][ACT]`  | `h`         | `H`       |
//! | anything else  | `.`         | `.`       |
//!
//! The context is read on the molecule's strand: `reference[p..p+3]` forward, the reverse
//! complement of `reference[p-2..p+1]` reverse.
//!
//! The summary counts are tallied per read rather than per site. Every aligned base that
//! agrees with the consensus is compared with the reference in the orientation the read was
//! sequenced in, so bases of reverse reads are complemented first. Differences count towards
//! `mM`. Transitions count towards `pP`, with `A<->G` in `pF` and `C<->T` in `pR`, and each
//! transition site is listed once in `pE` as `contig:pos REF>OBS`. A converted CpG on a
//! forward read therefore shows up as `C>T` in `pR`, while the mate read covering it from
//! the other strand reports `G>A` in `pF`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use ahash::AHashMap;
use log::debug;
use scmo_dna::{complement_base, reverse_complement};

use crate::consensus::Consensus;
use crate::errors::Result;
use crate::fragment::Strand;
use crate::molecule::{MoleculeCapability, MoleculeCore};
use crate::record::AlignmentRecord;
use crate::reference::ReferenceSequence;
use crate::rejection::RejectionReason;
use crate::tags::{self, TagValue};

/// Code for positions with no recognizable context.
pub const NO_CONTEXT: u8 = b'.';

/// Unconverted context codes; converted calls use the uppercase letter.
static CONTEXT_CODES: LazyLock<AHashMap<[u8; 3], u8>> = LazyLock::new(|| {
    let mut codes = AHashMap::new();
    for third in *b"ACGT" {
        codes.insert([b'C', b'G', third], b'z');
    }
    for middle in *b"ACT" {
        codes.insert([b'C', middle, b'G'], b'x');
        for third in *b"ACT" {
            codes.insert([b'C', middle, third], b'h');
        }
    }
    codes
});

/// Context code for a trinucleotide read on the molecule's strand.
#[must_use]
pub fn context_code(context: &[u8], converted: bool) -> u8 {
    let Ok(key) = <[u8; 3]>::try_from(context) else {
        return NO_CONTEXT;
    };
    match CONTEXT_CODES.get(&key.map(|b| b.to_ascii_uppercase())) {
        Some(&code) if converted => code.to_ascii_uppercase(),
        Some(&code) => code,
        None => NO_CONTEXT,
    }
}

/// Trinucleotide context of `position` read on `strand`.
///
/// Returns `None` when fewer than three bases are available (contig edges) or the strand is
/// unknown.
///
/// # Errors
///
/// Propagates reference lookup errors.
pub fn position_context(
    reference: &dyn ReferenceSequence,
    contig: &str,
    position: usize,
    strand: Strand,
) -> Result<Option<Vec<u8>>> {
    let context = match strand {
        Strand::Forward => reference.fetch(contig, position, position + 3)?,
        Strand::Reverse if position >= 2 => {
            reverse_complement(&reference.fetch(contig, position - 2, position + 1)?)
        }
        _ => return Ok(None),
    };
    Ok((context.len() == 3).then_some(context))
}

/// A consensus position that is a conversion candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionCall {
    /// Reference base in forward orientation
    pub reference_base: u8,
    /// Consensus base in forward orientation
    pub consensus_base: u8,
    /// Context code, uppercase when converted
    pub context: u8,
}

/// Conversion calls keyed by `(contig, position)`.
pub type ConversionCalls = BTreeMap<(String, usize), ConversionCall>;

/// The bases TAPS flags on a strand: (reference, converted).
fn conversion_bases(strand: Strand) -> Option<(u8, u8)> {
    match strand {
        Strand::Forward => Some((b'C', b'T')),
        Strand::Reverse => Some((b'G', b'A')),
        Strand::Unknown => None,
    }
}

/// Calls TAPS conversions on the molecule consensus and writes a bismark-style call string.
#[derive(Debug, Clone, Default)]
pub struct TapsConversion {
    calls: Option<ConversionCalls>,
    failure: Option<RejectionReason>,
}

impl TapsConversion {
    /// A capability with no calls yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made during finalisation, `None` when calling failed.
    #[must_use]
    pub fn calls(&self) -> Option<&ConversionCalls> {
        self.calls.as_ref()
    }

    fn call<R: AlignmentRecord>(
        core: &MoleculeCore<R>,
    ) -> std::result::Result<ConversionCalls, RejectionReason> {
        let observations = core.observations();
        let consensus = core.consensus(true).map_err(|e| {
            debug!("Conversion calling skipped for {}: {e}", core.describe());
            RejectionReason::NoConsensus
        })?;

        let mut calls = ConversionCalls::new();
        let Some((unconverted, converted)) = conversion_bases(core.strand()) else {
            return Ok(calls);
        };

        for (key, obs) in &observations {
            let Some(reference_base) = obs.reference_base else {
                continue;
            };
            let Some(&consensus_base) = consensus.get(key) else {
                continue;
            };
            if reference_base != unconverted
                || (consensus_base != unconverted && consensus_base != converted)
            {
                continue;
            }
            let context = position_context(core.reference(), &key.0, key.1, core.strand())
                .map_err(|e| {
                    debug!("Context lookup failed for {}:{}: {e}", key.0, key.1);
                    RejectionReason::GenomicLocationsFailed
                })?;
            let is_converted = consensus_base == converted;
            let context = context.map_or(NO_CONTEXT, |c| context_code(&c, is_converted));
            calls.insert(key.clone(), ConversionCall { reference_base, consensus_base, context });
        }
        Ok(calls)
    }

    /// Writes the summary metadata for `calls` onto the molecule.
    fn summarise<R: AlignmentRecord>(core: &mut MoleculeCore<R>, calls: &ConversionCalls) {
        let tally = match core.consensus(true) {
            Ok(consensus) => TransitionTally::collect(core, consensus),
            Err(_) => TransitionTally::default(),
        };

        let sites = tally
            .sites
            .iter()
            .map(|((contig, position), reference, observed)| {
                format!(
                    "{contig}:{} {}>{}",
                    position + 1,
                    char::from(*reference),
                    char::from(*observed)
                )
            })
            .collect::<Vec<_>>()
            .join(",");

        let mut histogram: BTreeMap<u8, usize> = BTreeMap::new();
        for call in calls.values() {
            *histogram.entry(call.context).or_default() += 1;
        }

        core.set_meta(tags::MISMATCH_COUNT, tally.mismatches);
        core.set_meta(tags::CONVERSION_COUNT, tally.forward + tally.reverse);
        core.set_meta(tags::FORWARD_CONVERSION_COUNT, tally.forward);
        core.set_meta(tags::REVERSE_CONVERSION_COUNT, tally.reverse);
        core.set_meta(tags::CONVERSION_SITES, sites);
        for (code, count) in histogram {
            core.set_meta(tags::context_count_tag(code), count);
        }
    }
}

/// Read-level observations that agree with the consensus, compared with the reference in
/// sequencing orientation.
#[derive(Debug, Default)]
struct TransitionTally {
    mismatches: usize,
    /// `A>G` and `G>A` observations
    forward: usize,
    /// `C>T` and `T>C` observations
    reverse: usize,
    sites: BTreeSet<((String, usize), u8, u8)>,
}

impl TransitionTally {
    fn collect<R: AlignmentRecord>(core: &MoleculeCore<R>, consensus: &Consensus) -> Self {
        let observations = core.observations();
        let mut tally = Self::default();
        for read in core.iter_reads() {
            let Some(contig) = read.reference_name() else {
                continue;
            };
            let sequence = read.sequence();
            for pair in read.aligned_pairs() {
                let key = (contig.to_string(), pair.ref_pos);
                let Some(&consensus_base) = consensus.get(&key) else {
                    continue;
                };
                let Some(observed) = sequence.get(pair.query_pos).map(u8::to_ascii_uppercase)
                else {
                    continue;
                };
                if observed != consensus_base {
                    continue;
                }
                let reference = pair
                    .ref_base
                    .or_else(|| observations.get(&key).and_then(|obs| obs.reference_base));
                let Some(reference) = reference else {
                    continue;
                };
                let (reference, observed) = if read.is_reverse() {
                    (complement_base(reference), complement_base(observed))
                } else {
                    (reference, observed)
                };
                tally.record(key, reference, observed);
            }
        }
        tally
    }

    fn record(&mut self, key: (String, usize), reference: u8, observed: u8) {
        if reference != observed {
            self.mismatches += 1;
        }
        match (reference, observed) {
            (b'A', b'G') | (b'G', b'A') => self.forward += 1,
            (b'C', b'T') | (b'T', b'C') => self.reverse += 1,
            _ => return,
        }
        self.sites.insert((key, reference, observed));
    }
}

impl<R: AlignmentRecord> MoleculeCapability<R> for TapsConversion {
    fn name(&self) -> &'static str {
        "taps"
    }

    fn finalise(&mut self, core: &mut MoleculeCore<R>) {
        match Self::call(core) {
            Ok(calls) => {
                Self::summarise(core, &calls);
                self.calls = Some(calls);
            }
            Err(reason) => self.failure = Some(reason),
        }
        core.set_tag_on_reads(tags::JUNCTION_MOTIFS, None);
        core.set_tag_on_reads(tags::JUNCTION_INTRONS, None);
    }

    fn validate(&self, _core: &MoleculeCore<R>) -> std::result::Result<(), RejectionReason> {
        if let Some(reason) = self.failure {
            return Err(reason);
        }
        self.calls.as_ref().map(|_| ()).ok_or(RejectionReason::ConversionCallsFailed)
    }

    fn write_tags(&self, core: &mut MoleculeCore<R>) {
        let Some(calls) = &self.calls else {
            return;
        };
        for read in core.iter_reads_mut() {
            let Some(contig) = read.reference_name().map(str::to_string) else {
                continue;
            };
            let mut call_string = vec![NO_CONTEXT; read.sequence().len()];
            for pair in read.aligned_pairs() {
                if let Some(call) = calls.get(&(contig.clone(), pair.ref_pos)) {
                    if let Some(slot) = call_string.get_mut(pair.query_pos) {
                        *slot = call.context;
                    }
                }
            }
            let call_string = String::from_utf8_lossy(&call_string).into_owned();
            read.set_tag(tags::CONVERSION_CALL_STRING, Some(TagValue::String(call_string)));
        }
    }
}
