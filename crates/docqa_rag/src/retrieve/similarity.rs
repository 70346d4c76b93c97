pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity against a query whose norm is already known.
/// `None` when the dimensions differ or `v` is a zero vector.
pub(crate) fn cosine_to_query(query: &[f32], query_norm: f32, v: &[f32]) -> Option<f32> {
    if v.len() != query.len() {
        return None;
    }
    let v_norm = l2_norm(v);
    if v_norm == 0.0 || query_norm == 0.0 {
        return None;
    }
    let dot: f32 = query.iter().zip(v).map(|(a, b)| a * b).sum();
    Some(dot / (query_norm * v_norm))
}
