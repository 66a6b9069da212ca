//! Molecules: clusters of fragments derived from one original molecule.
//!
//! A [`Molecule`] is split in two parts:
//! - [`MoleculeCore`] holds the fragments, the cached founder facts (contig, strand, sample),
//!   the reference accessor, consensus caches, metadata and the rejection slot.
//! - An ordered list of [`MoleculeCapability`] objects adds protocol handling, feature
//!   annotation and conversion calling on top.
//!
//! Capabilities receive `&mut MoleculeCore` in their hooks, so they can read the consensus
//! and write metadata without borrowing the capability list. Hooks always run in list order:
//! protocol, transcriptome, conversion (see [`flavor`]).
//!
//! # Lifecycle
//!
//! 1. Created from a seed fragment, grows with [`Molecule::add_fragment`].
//! 2. [`Molecule::finalise`] computes the consensus and runs every capability's `finalise`
//!    hook. It is idempotent and never fails; problems surface through
//!    [`Molecule::is_valid`].
//! 3. [`Molecule::write_tags`] annotates the reads, which are returned with
//!    [`Molecule::into_records`].

pub mod capability;
pub mod conversion;
pub mod flavor;
pub mod protocol;
pub mod transcriptome;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::consensus::{
    BaseClassifier, Consensus, ConsensusOptions, MajorityVote, Observations, build_consensus,
    collect_observations, fill_reference_bases,
};
use crate::errors::{Result, ScmoError};
use crate::fragment::{Fragment, Span, Strand};
use crate::record::{AlignmentRecord, SamRecord};
use crate::reference::ReferenceSequence;
use crate::rejection::RejectionReason;
use crate::tags::{self, TagKey, TagValue};

pub use capability::MoleculeCapability;
pub use flavor::{Flavor, MoleculeFactory};

/// Which member of a molecule new fragments are compared against.
///
/// The clustering predicate is not transitive. Comparing against the founder keeps a
/// molecule anchored; comparing against the latest fragment lets chains of fragments, each
/// within the radius of the previous one, grow a single molecule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAnchor {
    /// Compare against the fragment that created the molecule
    #[default]
    Founder,
    /// Compare against the most recently added fragment
    Latest,
}

/// Shared molecule state handed to capabilities.
pub struct MoleculeCore<R: AlignmentRecord = SamRecord> {
    fragments: Vec<Fragment<R>>,
    chromosome: Option<String>,
    strand: Strand,
    sample: Option<String>,
    reference: Arc<dyn ReferenceSequence>,
    consensus_options: ConsensusOptions,
    classifier: Option<Arc<dyn BaseClassifier>>,
    safe_consensus: OnceLock<Consensus>,
    unsafe_consensus: OnceLock<Consensus>,
    rejection: Option<RejectionReason>,
    meta: BTreeMap<TagKey, TagValue>,
    molecule_id: Option<u64>,
    reject_multimapped: bool,
}

impl<R: AlignmentRecord> MoleculeCore<R> {
    fn new(fragment: Fragment<R>, reference: Arc<dyn ReferenceSequence>) -> Self {
        Self {
            chromosome: fragment.span().contig,
            strand: fragment.strand(),
            sample: fragment.sample().map(str::to_string),
            fragments: vec![fragment],
            reference,
            consensus_options: ConsensusOptions::default(),
            classifier: None,
            safe_consensus: OnceLock::new(),
            unsafe_consensus: OnceLock::new(),
            rejection: None,
            meta: BTreeMap::new(),
            molecule_id: None,
            reject_multimapped: false,
        }
    }

    /// Fragments in discovery order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment<R>] {
        &self.fragments
    }

    /// Fragments, mutably. Only fragment metadata should be changed through this.
    pub fn fragments_mut(&mut self) -> &mut [Fragment<R>] {
        &mut self.fragments
    }

    /// Every read of every fragment, read 1 before read 2.
    pub fn iter_reads(&self) -> impl Iterator<Item = &R> {
        self.fragments.iter().flat_map(|fragment| fragment.reads())
    }

    /// Every read, mutably.
    pub fn iter_reads_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.fragments.iter_mut().flat_map(|fragment| fragment.reads_mut())
    }

    /// Contig of the founding fragment.
    #[must_use]
    pub fn chromosome(&self) -> Option<&str> {
        self.chromosome.as_deref()
    }

    /// Strand shared by all fragments.
    #[must_use]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Sample shared by all fragments.
    #[must_use]
    pub fn sample(&self) -> Option<&str> {
        self.sample.as_deref()
    }

    /// Reference accessor.
    #[must_use]
    pub fn reference(&self) -> &dyn ReferenceSequence {
        self.reference.as_ref()
    }

    /// Founder contig, minimum start and maximum end over all fragments.
    #[must_use]
    pub fn span(&self) -> Span {
        let mut span = Span { contig: self.chromosome.clone(), start: None, end: None };
        for fragment in &self.fragments {
            let fragment_span = fragment.span();
            if let Some(start) = fragment_span.start {
                span.start = Some(span.start.map_or(start, |s| s.min(start)));
            }
            if let Some(end) = fragment_span.end {
                span.end = Some(span.end.map_or(end, |e| e.max(end)));
            }
        }
        span
    }

    /// Number of reads over all fragments.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.fragments.iter().map(Fragment::read_count).sum()
    }

    /// Number of fragments.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether every fragment is multimapping.
    #[must_use]
    pub fn is_multimapped(&self) -> bool {
        self.fragments.iter().all(Fragment::is_multimapped)
    }

    /// Observed bases per aligned position, with reference bases filled in from the
    /// reference where the reads do not carry them.
    #[must_use]
    pub fn observations(&self) -> Observations {
        let mut observations = collect_observations(self.iter_reads());
        fill_reference_bases(&mut observations, self.reference.as_ref());
        observations
    }

    fn classifier(&self) -> &dyn BaseClassifier {
        match &self.classifier {
            Some(classifier) => classifier.as_ref(),
            None => &MajorityVote,
        }
    }

    /// The molecule consensus using the molecule's classifier (majority vote by default).
    ///
    /// Results are cached until the next fragment is added. Without `allow_unsafe`,
    /// positions observed fewer than `min_support` times are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::Consensus`] when no read has an aligned base.
    pub fn consensus(&self, allow_unsafe: bool) -> Result<&Consensus> {
        let cache = if allow_unsafe { &self.unsafe_consensus } else { &self.safe_consensus };
        if let Some(consensus) = cache.get() {
            return Ok(consensus);
        }
        let consensus = self.consensus_with(self.classifier(), allow_unsafe)?;
        Ok(cache.get_or_init(|| consensus))
    }

    /// The molecule consensus with an explicit classifier. Not cached.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::Consensus`] when no read has an aligned base.
    pub fn consensus_with(
        &self,
        classifier: &dyn BaseClassifier,
        allow_unsafe: bool,
    ) -> Result<Consensus> {
        build_consensus(
            &self.observations(),
            classifier,
            self.consensus_options.min_support,
            allow_unsafe,
        )
    }

    fn reset_consensus(&mut self) {
        self.safe_consensus = OnceLock::new();
        self.unsafe_consensus = OnceLock::new();
    }

    /// Molecule-level metadata written onto every read.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<TagKey, TagValue> {
        &self.meta
    }

    /// Metadata entry for `key`.
    #[must_use]
    pub fn get_meta(&self, key: TagKey) -> Option<&TagValue> {
        self.meta.get(&key)
    }

    /// Sets a metadata entry.
    pub fn set_meta(&mut self, key: TagKey, value: impl Into<TagValue>) {
        self.meta.insert(key, value.into());
    }

    /// Why the molecule was rejected, if it was.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        self.rejection
    }

    /// Records a rejection reason.
    pub fn set_rejection_reason(&mut self, reason: RejectionReason) {
        self.rejection = Some(reason);
    }

    /// Identifier assigned by the clusterer.
    #[must_use]
    pub fn molecule_id(&self) -> Option<u64> {
        self.molecule_id
    }

    /// Sets (or removes) `tag` on every read.
    pub fn set_tag_on_reads(&mut self, tag: TagKey, value: Option<TagValue>) {
        for read in self.iter_reads_mut() {
            read.set_tag(tag, value.clone());
        }
    }

    fn write_base_tags(&mut self) {
        let read_count = self.read_count();
        let fragment_count = self.fragment_count();
        let molecule_id = self.molecule_id.map(|id| TagValue::String(id.to_string()));
        let sample = self.sample.clone().map(TagValue::String);
        let rejection = self.rejection.map(|reason| TagValue::from(reason.code()));
        let molecule_meta = self.meta.clone();

        for fragment in &mut self.fragments {
            let fragment_meta = fragment.meta().clone();
            for read in fragment.reads_mut() {
                if molecule_id.is_some() {
                    read.set_tag(tags::MOLECULE_ID, molecule_id.clone());
                }
                if sample.is_some() {
                    read.set_tag(tags::SAMPLE, sample.clone());
                }
                read.set_tag(tags::MOLECULE_READ_COUNT, Some(read_count.into()));
                read.set_tag(tags::MOLECULE_FRAGMENT_COUNT, Some(fragment_count.into()));
                for (&key, value) in fragment_meta.iter().chain(molecule_meta.iter()) {
                    read.set_tag(key, Some(value.clone()));
                }
                if rejection.is_some() {
                    read.set_tag(tags::REJECTION_REASON, rejection.clone());
                }
            }
        }
    }

    fn base_validity(&self) -> std::result::Result<(), RejectionReason> {
        if !self.span().is_valid() {
            return Err(RejectionReason::InvalidSpan);
        }
        if self.reject_multimapped && self.is_multimapped() {
            return Err(RejectionReason::Multimapped);
        }
        if let Err(e) = self.consensus(false) {
            debug!("{}: {e}", self.describe());
            return Err(RejectionReason::NoConsensus);
        }
        Ok(())
    }

    /// Short location description for messages, e.g. `chr1 100-200 (+)`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} ({})", self.span(), self.strand.symbol())
    }
}

impl<R: AlignmentRecord> fmt::Debug for MoleculeCore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoleculeCore")
            .field("span", &self.span())
            .field("strand", &self.strand)
            .field("sample", &self.sample)
            .field("fragments", &self.fragments.len())
            .field("molecule_id", &self.molecule_id)
            .field("rejection", &self.rejection)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// A cluster of fragments plus its active capabilities.
pub struct Molecule<R: AlignmentRecord = SamRecord> {
    core: MoleculeCore<R>,
    capabilities: Vec<Box<dyn MoleculeCapability<R>>>,
    finalised: bool,
}

impl<R: AlignmentRecord> Molecule<R> {
    /// A molecule seeded with `fragment` and no capabilities.
    #[must_use]
    pub fn new(fragment: Fragment<R>, reference: Arc<dyn ReferenceSequence>) -> Self {
        Self {
            core: MoleculeCore::new(fragment, reference),
            capabilities: Vec::new(),
            finalised: false,
        }
    }

    /// Appends a capability; hooks run in the order capabilities were added.
    #[must_use]
    pub fn with_capability(mut self, capability: Box<dyn MoleculeCapability<R>>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Uses `classifier` instead of majority vote for the cached consensus.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn BaseClassifier>) -> Self {
        self.core.classifier = Some(classifier);
        self.core.reset_consensus();
        self
    }

    /// Sets the consensus options.
    #[must_use]
    pub fn with_consensus_options(mut self, options: ConsensusOptions) -> Self {
        self.core.consensus_options = options;
        self.core.reset_consensus();
        self
    }

    /// Rejects molecules whose fragments are all multimapping.
    #[must_use]
    pub fn with_multimapped_rejection(mut self, reject: bool) -> Self {
        self.core.reject_multimapped = reject;
        self
    }

    /// Sets the molecule identifier written to the `MI` tag.
    pub fn set_molecule_id(&mut self, id: u64) {
        self.core.molecule_id = Some(id);
    }

    /// Shared state.
    #[must_use]
    pub fn core(&self) -> &MoleculeCore<R> {
        &self.core
    }

    /// Names of the active capabilities, in hook order.
    #[must_use]
    pub fn capability_names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(|capability| capability.name()).collect()
    }

    /// Whether `fragment` belongs to this molecule: it must match the representative picked
    /// by `anchor` and be admitted by every capability.
    ///
    /// # Errors
    ///
    /// Propagates [`ScmoError::LengthMismatch`] from the UMI comparison.
    pub fn accepts(&self, fragment: &Fragment<R>, anchor: ClusterAnchor) -> Result<bool> {
        if self.finalised {
            return Ok(false);
        }
        let representative = match anchor {
            ClusterAnchor::Founder => self.core.fragments.first(),
            ClusterAnchor::Latest => self.core.fragments.last(),
        };
        let Some(representative) = representative else {
            return Ok(false);
        };
        if !representative.matches(fragment)? {
            return Ok(false);
        }
        Ok(self.capabilities.iter().all(|capability| capability.admits(&self.core, fragment)))
    }

    /// Adds a fragment and invalidates the cached consensus.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::AlreadyFinalised`] after [`finalise`](Self::finalise), and
    /// [`ScmoError::InvalidParameter`] when the fragment's sample or strand differs from the
    /// molecule's.
    pub fn add_fragment(&mut self, fragment: Fragment<R>) -> Result<()> {
        if self.finalised {
            return Err(ScmoError::AlreadyFinalised { molecule: self.core.describe() });
        }
        if fragment.sample() != self.core.sample() || fragment.strand() != self.core.strand() {
            return Err(ScmoError::invalid_parameter(
                "fragment",
                format!(
                    "{fragment} does not share sample and strand with {}",
                    self.core.describe()
                ),
            ));
        }
        self.core.fragments.push(fragment);
        self.core.reset_consensus();
        Ok(())
    }

    /// Computes the consensus and runs every capability's finalise hook, once.
    pub fn finalise(&mut self) {
        if self.finalised {
            return;
        }
        if let Err(e) = self.core.consensus(false) {
            debug!("No consensus for molecule {}: {e}", self.core.describe());
        }
        for capability in &mut self.capabilities {
            capability.finalise(&mut self.core);
        }
        self.finalised = true;
    }

    /// Whether [`finalise`](Self::finalise) has run.
    #[must_use]
    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    /// Span defined, consensus obtainable, and every capability valid.
    ///
    /// The first failing check determines the rejection reason, which is stored when
    /// `set_rejection_reasons` is set.
    pub fn is_valid(&mut self, set_rejection_reasons: bool) -> bool {
        let outcome = self.core.base_validity().and_then(|()| {
            self.capabilities.iter().try_for_each(|capability| capability.validate(&self.core))
        });
        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!("Molecule {} rejected: {reason}", self.core.describe());
                if set_rejection_reasons {
                    self.core.set_rejection_reason(reason);
                }
                false
            }
        }
    }

    /// Writes molecule tags (`MI`, `SM`, `af`, `TF`, metadata, `RR`) and then every
    /// capability's tags onto the reads.
    pub fn write_tags(&mut self) {
        self.core.write_base_tags();
        for capability in &self.capabilities {
            capability.write_tags(&mut self.core);
        }
    }

    /// Fragments in discovery order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment<R>] {
        self.core.fragments()
    }

    /// Every read of every fragment.
    pub fn iter_reads(&self) -> impl Iterator<Item = &R> {
        self.core.iter_reads()
    }

    /// Every read, mutably.
    pub fn iter_reads_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.core.iter_reads_mut()
    }

    /// See [`MoleculeCore::span`].
    #[must_use]
    pub fn span(&self) -> Span {
        self.core.span()
    }

    /// Strand shared by all fragments.
    #[must_use]
    pub fn strand(&self) -> Strand {
        self.core.strand()
    }

    /// Sample shared by all fragments.
    #[must_use]
    pub fn sample(&self) -> Option<&str> {
        self.core.sample()
    }

    /// Contig of the founding fragment.
    #[must_use]
    pub fn chromosome(&self) -> Option<&str> {
        self.core.chromosome()
    }

    /// See [`MoleculeCore::consensus`].
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::Consensus`] when no read has an aligned base.
    pub fn consensus(&self, allow_unsafe: bool) -> Result<&Consensus> {
        self.core.consensus(allow_unsafe)
    }

    /// See [`MoleculeCore::consensus_with`].
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::Consensus`] when no read has an aligned base.
    pub fn consensus_with(
        &self,
        classifier: &dyn BaseClassifier,
        allow_unsafe: bool,
    ) -> Result<Consensus> {
        self.core.consensus_with(classifier, allow_unsafe)
    }

    /// Why the molecule was rejected, if it was.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        self.core.rejection_reason()
    }

    /// Metadata entry for `key`.
    #[must_use]
    pub fn get_meta(&self, key: TagKey) -> Option<&TagValue> {
        self.core.get_meta(key)
    }

    /// Sets a molecule metadata entry.
    pub fn set_meta(&mut self, key: TagKey, value: impl Into<TagValue>) {
        self.core.set_meta(key, value);
    }

    /// Identifier assigned by the clusterer.
    #[must_use]
    pub fn molecule_id(&self) -> Option<u64> {
        self.core.molecule_id()
    }

    /// Number of reads.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.core.read_count()
    }

    /// Number of fragments.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.core.fragment_count()
    }

    /// Consumes the molecule, returning its fragments.
    #[must_use]
    pub fn into_fragments(self) -> Vec<Fragment<R>> {
        self.core.fragments
    }

    /// Consumes the molecule, returning every read with the tags written so far.
    #[must_use]
    pub fn into_records(self) -> Vec<R> {
        self.core.fragments.into_iter().flat_map(Fragment::into_reads).collect()
    }
}

impl<R: AlignmentRecord> fmt::Display for Molecule<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Molecule(")?;
        if let Some(id) = self.core.molecule_id {
            write!(f, "{id}, ")?;
        }
        write!(
            f,
            "{}, sample: {}, {} fragments",
            self.core.describe(),
            self.core.sample().unwrap_or("?"),
            self.core.fragment_count()
        )?;
        if let Some(reason) = self.core.rejection {
            write!(f, ", rejected: {}", reason.code())?;
        }
        write!(f, ")")
    }
}

impl<R: AlignmentRecord> fmt::Debug for Molecule<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Molecule")
            .field("core", &self.core)
            .field("capabilities", &self.capability_names())
            .field("finalised", &self.finalised)
            .finish()
    }
}
