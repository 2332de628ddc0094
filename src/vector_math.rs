use std::cmp::Ordering;

/// Cosine similarity of two vectors. Mismatched or empty inputs, and zero
/// vectors, score 0.0.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let (dot, query_sq, candidate_sq) = query.iter().zip(candidate).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, qq, cc), (q, c)| (dot + q * c, qq + q * q, cc + c * c),
    );

    let denom = query_sq.sqrt() * candidate_sq.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Indices of `candidates` ordered by descending similarity to `query`.
pub fn rank_descending_by_cosine(query: &[f32], candidates: &[&[f32]]) -> Vec<(usize, f32)> {
    let mut scores: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    scores
}
