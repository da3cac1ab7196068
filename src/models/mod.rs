//! Data types shared between the scoring core and its callers

/// Reference embeddings grouped by class.
pub mod references;
/// The result of checking one image.
pub mod verdict;
