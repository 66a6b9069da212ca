//! Integration tests for the scmo library.
//!
//! These drive records through mate pairing, molecule assignment, protocol handling,
//! annotation and conversion calling, and check the tags written back onto the reads.

mod helpers;
mod test_clustering_pipeline;
mod test_conversion_calling;
mod test_flavors;
mod test_reference_fasta;
