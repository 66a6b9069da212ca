//! Pluggable molecule behaviour.
//!
//! A concrete molecule type is the base [`Molecule`](super::Molecule) plus an ordered list of
//! capabilities. The molecule invokes every capability's hooks in list order, so a capability
//! can rely on the tags and metadata of the ones before it.

use crate::fragment::Fragment;
use crate::molecule::MoleculeCore;
use crate::record::AlignmentRecord;
use crate::rejection::RejectionReason;

/// One orthogonal piece of molecule behaviour: protocol handling, feature annotation or
/// conversion calling.
pub trait MoleculeCapability<R: AlignmentRecord>: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extra admission test for a fragment that already passed the clustering predicate.
    fn admits(&self, _core: &MoleculeCore<R>, _fragment: &Fragment<R>) -> bool {
        true
    }

    /// Post-processing once the last fragment has been added. Must not fail: problems are
    /// kept in the capability's state and reported by [`validate`](Self::validate).
    fn finalise(&mut self, _core: &mut MoleculeCore<R>) {}

    /// The capability's own validity check.
    fn validate(&self, core: &MoleculeCore<R>) -> Result<(), RejectionReason>;

    /// Writes the capability's tags onto the reads of the molecule.
    fn write_tags(&self, core: &mut MoleculeCore<R>);
}
