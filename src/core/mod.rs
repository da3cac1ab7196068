//! Core scoring functionality

/// Spoiled-pixel color heuristic.
pub mod color;
/// Image embeddings and the model that produces them.
pub mod embeddings;
/// Weighted blend of similarity and color evidence.
pub mod scoring;
/// Cosine similarity between embeddings.
pub mod similarity;
