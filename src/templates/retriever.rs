//! Cosine-similarity ranking over in-memory template embeddings.
//!
//! Grounded in the cosine-distance-to-score conversion in
//! `crates/mira-server/src/search/utils.rs::distance_to_score`, adapted to
//! the exact formula spec.md §4.2 documents: cosine similarity from cosine
//! distance `d` is `1 − d/2`.

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Convert a cosine similarity into a normalized [0,1] score:
/// cosine distance `d = 1 - similarity`, score `= 1 - d/2 = (1 + similarity) / 2`.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    (1.0 + cosine_similarity(a, b)) / 2.0
}
