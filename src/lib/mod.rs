#![deny(unsafe_code)]
// Clippy lint configuration for CI
// - cast_*: coordinates and counts move between usize, u64 and i64
// - missing_*_doc: error sections live on the public entry points only
// - needless_pass_by_value: records and fragments are moved into molecules
// - module_name_repetitions: types are named after what they hold (e.g. MoleculeMetrics)
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
    clippy::redundant_closure_for_method_calls,
    clippy::map_unwrap_or,
    clippy::uninlined_format_args
)]

//! # scmo - single-cell molecule assignment
//!
//! Groups sorted alignment records from single-cell libraries into molecules, derives a
//! per-position consensus for each molecule and optionally reads chemical conversions
//! (TAPS) off that consensus. Results are written back onto the records as SAM tags.
//!
//! ## Overview
//!
//! ### Core
//!
//! - **[`fragment`]** - fragments, the clustering predicate and mate pairing
//! - **[`molecule`]** - molecules, consensus, validity and pluggable capabilities
//! - **[`clustering`]** - streaming and window-parallel molecule assignment
//! - **[`consensus`]** - positional observations and base classifiers
//! - **[`umi`]** - UMI comparison
//!
//! ### Collaborators
//!
//! - **[`record`]** - the record interface and its `noodles` implementation
//! - **[`reference`][mod@reference]** - reference sequence access
//! - **[`tags`]** - tag vocabulary and decoding rules
//!
//! ### Reporting
//!
//! - **[`errors`]**, **[`rejection`]**, **[`metrics`]**, **[`logging`]**, **[`progress`]**
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use scmo_lib::clustering::{ClusteringOptions, MoleculeClusterer};
//! use scmo_lib::fragment::{FragmentAssembler, FragmentOptions};
//! use scmo_lib::molecule::{Flavor, MoleculeFactory};
//! use scmo_lib::reference::ReferenceReader;
//! use scmo_lib::testutil::RecordBuilder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let reference = Arc::new(ReferenceReader::from_sequences([("chr1", "ACGT".repeat(100))]));
//! let factory = MoleculeFactory::new(Flavor::Base, reference, None)?;
//!
//! let records = vec![
//!     RecordBuilder::mapped("chr1", 11, "GTACGTAC").name("q1").build(),
//!     RecordBuilder::mapped("chr1", 12, "TACGTACG").name("q2").build(),
//! ];
//! let fragments = FragmentAssembler::new(records.into_iter(), FragmentOptions::default());
//! let clusterer = MoleculeClusterer::new(fragments, factory, ClusteringOptions::default())?;
//!
//! let mut output = Vec::new();
//! for molecule in clusterer {
//!     output.extend(molecule?.into_records());
//! }
//! assert_eq!(output.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod clustering;
pub mod consensus;
pub mod errors;
pub mod fragment;
pub mod logging;
pub mod metrics;
pub mod molecule;
pub mod progress;
pub mod record;
pub mod reference;
pub mod rejection;
pub mod tags;
pub mod testutil;
pub mod umi;

pub use clustering::{ClusteringOptions, MoleculeClusterer, cluster_windows};
pub use errors::{Result, ScmoError};
pub use fragment::{Fragment, FragmentOptions, Strand};
pub use molecule::{Flavor, Molecule, MoleculeFactory};
pub use record::{AlignmentRecord, SamRecord};
pub use reference::{ReferenceReader, ReferenceSequence};
pub use rejection::RejectionReason;
