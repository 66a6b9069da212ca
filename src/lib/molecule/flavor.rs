//! Molecule flavors: named combinations of capabilities.
//!
//! A flavor is one protocol capability, optionally a transcriptome capability and optionally
//! conversion calling. [`MoleculeFactory`] turns a flavor into molecules whose capability
//! list is always ordered protocol, transcriptome, conversion.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consensus::{BaseClassifier, ConsensusOptions};
use crate::errors::{Result, ScmoError};
use crate::fragment::Fragment;
use crate::molecule::conversion::TapsConversion;
use crate::molecule::protocol::{Chic, NlaIii};
use crate::molecule::transcriptome::{FeatureLookup, Transcriptome};
use crate::molecule::{Molecule, MoleculeCapability};
use crate::record::AlignmentRecord;
use crate::reference::ReferenceSequence;

/// Library preparation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// NLA-III restriction digest
    NlaIii,
    /// Chromatin immunocleavage
    Chic,
}

/// A concrete molecule type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// Clustering and consensus only, with no protocol capability
    #[default]
    Base,
    /// NLA-III
    NlaIii,
    /// NLA-III with transcriptome features
    AnnotatedNlaIii,
    /// NLA-III with TAPS conversion calls
    TapsNlaIii,
    /// NLA-III with transcriptome features and TAPS conversion calls
    AnnotatedTapsNlaIii,
    /// CHiC
    Chic,
    /// CHiC with transcriptome features
    AnnotatedChic,
    /// CHiC with TAPS conversion calls
    TapsChic,
    /// CHiC with transcriptome features and TAPS conversion calls
    AnnotatedTapsChic,
}

impl Flavor {
    /// Every flavor, in declaration order.
    pub const ALL: [Flavor; 9] = [
        Flavor::Base,
        Flavor::NlaIii,
        Flavor::AnnotatedNlaIii,
        Flavor::TapsNlaIii,
        Flavor::AnnotatedTapsNlaIii,
        Flavor::Chic,
        Flavor::AnnotatedChic,
        Flavor::TapsChic,
        Flavor::AnnotatedTapsChic,
    ];

    /// The flavor's protocol, `None` for [`Flavor::Base`].
    #[must_use]
    pub fn protocol(self) -> Option<Protocol> {
        match self {
            Self::Base => None,
            Self::NlaIii | Self::AnnotatedNlaIii | Self::TapsNlaIii | Self::AnnotatedTapsNlaIii => {
                Some(Protocol::NlaIii)
            }
            Self::Chic | Self::AnnotatedChic | Self::TapsChic | Self::AnnotatedTapsChic => {
                Some(Protocol::Chic)
            }
        }
    }

    /// Whether molecules are annotated with transcriptome features.
    #[must_use]
    pub fn is_annotated(self) -> bool {
        matches!(
            self,
            Self::AnnotatedNlaIii
                | Self::AnnotatedTapsNlaIii
                | Self::AnnotatedChic
                | Self::AnnotatedTapsChic
        )
    }

    /// Whether molecules call TAPS conversions.
    #[must_use]
    pub fn calls_conversions(self) -> bool {
        matches!(
            self,
            Self::TapsNlaIii | Self::AnnotatedTapsNlaIii | Self::TapsChic | Self::AnnotatedTapsChic
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::NlaIii => "nla_iii",
            Self::AnnotatedNlaIii => "annotated_nla_iii",
            Self::TapsNlaIii => "taps_nla_iii",
            Self::AnnotatedTapsNlaIii => "annotated_taps_nla_iii",
            Self::Chic => "chic",
            Self::AnnotatedChic => "annotated_chic",
            Self::TapsChic => "taps_chic",
            Self::AnnotatedTapsChic => "annotated_taps_chic",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flavor {
    type Err = ScmoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|flavor| flavor.name() == s).ok_or_else(|| {
            ScmoError::invalid_parameter("flavor", format!("unknown molecule flavor '{s}'"))
        })
    }
}

/// Creates molecules of one flavor around shared collaborators.
#[derive(Clone)]
pub struct MoleculeFactory {
    flavor: Flavor,
    reference: Arc<dyn ReferenceSequence>,
    features: Option<Arc<dyn FeatureLookup>>,
    consensus_options: ConsensusOptions,
    classifier: Option<Arc<dyn BaseClassifier>>,
    reject_multimapped: bool,
}

impl MoleculeFactory {
    /// Creates a factory.
    ///
    /// # Errors
    ///
    /// Returns [`ScmoError::InvalidParameter`] when an annotated flavor is given no feature
    /// lookup.
    pub fn new(
        flavor: Flavor,
        reference: Arc<dyn ReferenceSequence>,
        features: Option<Arc<dyn FeatureLookup>>,
    ) -> Result<Self> {
        if flavor.is_annotated() && features.is_none() {
            return Err(ScmoError::invalid_parameter(
                "features",
                format!("flavor '{flavor}' needs a feature lookup"),
            ));
        }
        Ok(Self {
            flavor,
            reference,
            features,
            consensus_options: ConsensusOptions::default(),
            classifier: None,
            reject_multimapped: false,
        })
    }

    /// Uses `classifier` for molecule consensus.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn BaseClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the consensus options of every molecule.
    #[must_use]
    pub fn with_consensus_options(mut self, options: ConsensusOptions) -> Self {
        self.consensus_options = options;
        self
    }

    /// Rejects molecules whose reads are all multimapping.
    #[must_use]
    pub fn with_multimapped_rejection(mut self, reject: bool) -> Self {
        self.reject_multimapped = reject;
        self
    }

    /// The flavor produced.
    #[must_use]
    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// The shared reference.
    #[must_use]
    pub fn reference(&self) -> &Arc<dyn ReferenceSequence> {
        &self.reference
    }

    /// Creates a molecule seeded with `fragment`.
    #[must_use]
    pub fn create<R: AlignmentRecord>(&self, fragment: Fragment<R>) -> Molecule<R> {
        let mut molecule = Molecule::new(fragment, Arc::clone(&self.reference))
            .with_consensus_options(self.consensus_options)
            .with_multimapped_rejection(self.reject_multimapped);
        if let Some(classifier) = &self.classifier {
            molecule = molecule.with_classifier(Arc::clone(classifier));
        }
        for capability in self.capabilities() {
            molecule = molecule.with_capability(capability);
        }
        molecule
    }

    fn capabilities<R: AlignmentRecord>(&self) -> Vec<Box<dyn MoleculeCapability<R>>> {
        let mut capabilities: Vec<Box<dyn MoleculeCapability<R>>> = Vec::with_capacity(3);
        match self.flavor.protocol() {
            Some(Protocol::NlaIii) => capabilities.push(Box::new(NlaIii)),
            Some(Protocol::Chic) => capabilities.push(Box::new(Chic)),
            None => {}
        }
        if self.flavor.is_annotated() {
            if let Some(features) = &self.features {
                capabilities.push(Box::new(Transcriptome::new(Arc::clone(features))));
            }
        }
        if self.flavor.calls_conversions() {
            capabilities.push(Box::new(TapsConversion::new()));
        }
        capabilities
    }
}

impl fmt::Debug for MoleculeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoleculeFactory")
            .field("flavor", &self.flavor)
            .field("has_features", &self.features.is_some())
            .field("consensus_options", &self.consensus_options)
            .field("reject_multimapped", &self.reject_multimapped)
            .finish_non_exhaustive()
    }
}
