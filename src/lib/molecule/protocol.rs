//! Protocol capabilities: restriction-site aware molecules.
//!
//! Both protocols derive a cut site from read 1. Read sequences are stored in reference
//! orientation, so for reverse reads the bases "as sequenced" are the reverse complement of
//! the end of the stored sequence.

use scmo_dna::{complement_base, reverse_complement};

use crate::fragment::{Fragment, Strand};
use crate::molecule::{MoleculeCapability, MoleculeCore};
use crate::record::AlignmentRecord;
use crate::rejection::RejectionReason;
use crate::tags::{self, TagValue};

/// The NLA-III recognition sequence.
pub const NLA_III_SITE: &[u8] = b"CATG";

/// Location and recognized sequence of a protocol cut site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutSite {
    /// Contig of read 1
    pub contig: String,
    /// 0-based cut site position
    pub position: usize,
    /// Strand of read 1
    pub strand: Strand,
    /// Recognized sequence as sequenced
    pub recognized: String,
}

impl CutSite {
    fn same_location(&self, other: &CutSite) -> bool {
        self.contig == other.contig
            && self.position == other.position
            && self.strand == other.strand
    }
}

/// First `length` bases of `read` in sequencing orientation.
fn sequenced_prefix<R: AlignmentRecord>(read: &R, length: usize) -> Option<Vec<u8>> {
    let sequence = read.sequence();
    if sequence.len() < length {
        return None;
    }
    let prefix = if read.is_reverse() {
        reverse_complement(&sequence[sequence.len() - length..])
    } else {
        sequence[..length].to_ascii_uppercase()
    };
    Some(prefix)
}

fn mapped_read1<R: AlignmentRecord>(fragment: &Fragment<R>) -> Option<&R> {
    fragment.read1().filter(|read| !read.is_unmapped())
}

/// NLA-III cut site of a fragment: the `CATG` at the start of read 1 as sequenced.
///
/// Forward reads cut at their alignment start. Reverse reads cut at the first base of the
/// four-base site, four bases before their alignment end.
#[must_use]
pub fn nla_iii_cut_site<R: AlignmentRecord>(fragment: &Fragment<R>) -> Option<CutSite> {
    let read = mapped_read1(fragment)?;
    let recognized = sequenced_prefix(read, NLA_III_SITE.len())?;
    let position = if read.is_reverse() {
        read.reference_end()?.checked_sub(NLA_III_SITE.len())?
    } else {
        read.reference_start()?
    };
    Some(CutSite {
        contig: read.reference_name()?.to_string(),
        position,
        strand: Strand::from_reverse(read.is_reverse()),
        recognized: String::from_utf8_lossy(&recognized).into_owned(),
    })
}

/// CHiC cut site of a fragment: where read 1 starts as sequenced.
#[must_use]
pub fn chic_cut_site<R: AlignmentRecord>(fragment: &Fragment<R>) -> Option<CutSite> {
    let read = mapped_read1(fragment)?;
    let sequence = read.sequence();
    let (position, base) = if read.is_reverse() {
        (read.reference_end()?, complement_base(*sequence.last()?))
    } else {
        (read.reference_start()?, sequence.first()?.to_ascii_uppercase())
    };
    Some(CutSite {
        contig: read.reference_name()?.to_string(),
        position,
        strand: Strand::from_reverse(read.is_reverse()),
        recognized: char::from(base).to_string(),
    })
}

/// Marks every fragment with its recognized sequence.
fn annotate_fragments<R, F>(core: &mut MoleculeCore<R>, cut_site: F)
where
    R: AlignmentRecord,
    F: Fn(&Fragment<R>) -> Option<CutSite>,
{
    for fragment in core.fragments_mut() {
        if let Some(site) = cut_site(fragment) {
            fragment.set_recognized_sequence(&site.recognized);
        }
    }
}

fn write_cut_site<R: AlignmentRecord>(core: &mut MoleculeCore<R>, site: Option<CutSite>) {
    if let Some(site) = site {
        core.set_tag_on_reads(tags::CUT_SITE, Some(TagValue::from(site.position)));
    }
}

/// NLA-III digest: fragments must share the founder's cut site, and the molecule is only
/// valid when the recognized sequence is `CATG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NlaIii;

impl<R: AlignmentRecord> MoleculeCapability<R> for NlaIii {
    fn name(&self) -> &'static str {
        "nla_iii"
    }

    fn admits(&self, core: &MoleculeCore<R>, fragment: &Fragment<R>) -> bool {
        let founder = core.fragments().first().and_then(nla_iii_cut_site);
        match (founder, nla_iii_cut_site(fragment)) {
            (Some(a), Some(b)) => a.same_location(&b),
            (None, None) => true,
            _ => false,
        }
    }

    fn finalise(&mut self, core: &mut MoleculeCore<R>) {
        annotate_fragments(core, nla_iii_cut_site);
    }

    fn validate(&self, core: &MoleculeCore<R>) -> Result<(), RejectionReason> {
        match core.fragments().first().and_then(nla_iii_cut_site) {
            None => Err(RejectionReason::NoCutSite),
            Some(site) if site.recognized.as_bytes() != NLA_III_SITE => {
                Err(RejectionReason::InvalidRestrictionSite)
            }
            Some(_) => Ok(()),
        }
    }

    fn write_tags(&self, core: &mut MoleculeCore<R>) {
        let site = core.fragments().first().and_then(nla_iii_cut_site);
        write_cut_site(core, site);
    }
}

/// CHiC: the cut site is wherever read 1 starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chic;

impl<R: AlignmentRecord> MoleculeCapability<R> for Chic {
    fn name(&self) -> &'static str {
        "chic"
    }

    fn finalise(&mut self, core: &mut MoleculeCore<R>) {
        annotate_fragments(core, chic_cut_site);
    }

    fn validate(&self, core: &MoleculeCore<R>) -> Result<(), RejectionReason> {
        match core.fragments().first().and_then(chic_cut_site) {
            Some(_) => Ok(()),
            None => Err(RejectionReason::NoCutSite),
        }
    }

    fn write_tags(&self, core: &mut MoleculeCore<R>) {
        let site = core.fragments().first().and_then(chic_cut_site);
        write_cut_site(core, site);
    }
}
