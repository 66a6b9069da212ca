//! Error types for fragment assembly, molecule consensus and conversion calling.
//!
//! Errors fall into two groups. Structural misuse (`Order`, `AlreadyFinalised`,
//! `InvalidParameter`) is returned to the caller. Per-molecule data problems (`Consensus`,
//! `LengthMismatch`, reference lookups) are caught at the molecule finalisation boundary
//! and turned into a [`RejectionReason`](crate::rejection::RejectionReason) instead of
//! aborting the stream.

use thiserror::Error;

/// Result type alias for scmo operations
pub type Result<T> = std::result::Result<T, ScmoError>;

/// Error type for scmo operations
#[derive(Error, Debug)]
pub enum ScmoError {
    /// A two-record fragment was supplied with read 2 first
    #[error("Supply read 1 before read 2: the second record of '{read_name}' is flagged as read 1")]
    Order {
        /// Query name of the offending record (empty when the record has no name)
        read_name: String,
    },

    /// No read in the molecule has any aligned base
    #[error("Cannot obtain a consensus: {reason}")]
    Consensus {
        /// Explanation of why no consensus could be built
        reason: String,
    },

    /// Two UMIs of different length were compared by Hamming distance
    #[error(
        "Cannot compare UMIs of different length: '{left}' ({}) vs '{right}' ({})",
        .left.len(),
        .right.len()
    )]
    LengthMismatch {
        /// First UMI
        left: String,
        /// Second UMI
        right: String,
    },

    /// Required reference sequence not found
    #[error("Reference sequence '{ref_name}' not found")]
    ReferenceNotFound {
        /// The reference sequence name
        ref_name: String,
    },

    /// A reference fetch started past the end of the contig or had start > end
    #[error("Region {contig}:{start}-{end} is outside of the reference (length {length})")]
    RegionOutOfBounds {
        /// Contig name
        contig: String,
        /// Requested 0-based start
        start: usize,
        /// Requested exclusive end
        end: usize,
        /// Length of the contig
        length: usize,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A fragment was added to a molecule that has already been finalised
    #[error("Molecule {molecule} is already finalised")]
    AlreadyFinalised {
        /// Description of the molecule (contig, span and strand)
        molecule: String,
    },

    /// I/O error while loading a collaborator resource
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScmoError {
    /// Shorthand for building an [`ScmoError::InvalidParameter`].
    pub fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
    }

    /// Returns `true` for errors that describe a problem with the data of a single molecule
    /// rather than misuse of the API.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Consensus { .. }
                | Self::LengthMismatch { .. }
                | Self::ReferenceNotFound { .. }
                | Self::RegionOutOfBounds { .. }
        )
    }
}
