/// Compute the Euclidean (L2) distance between two vectors.
///
/// Accumulates in f64 and returns the result as f32.
/// Returns `f32::INFINITY` when the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    let mut sum: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let d = x as f64 - y as f64;
        sum += d * d;
    }
    sum.sqrt() as f32
}
