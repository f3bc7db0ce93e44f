//! Cosine-similarity novelty checks
//!
//! All vectors are unit-norm, so dot product stands in for cosine similarity.
//! Two thresholds are used by different callers and stay independently
//! configurable: the maintenance pass (default 0.97, incremental) and the
//! synthetic-memory check (default 0.95, once per generated answer).

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Maximum cosine similarity between `candidate` and every row of `existing`.
///
/// Returns `f32::NEG_INFINITY` for an empty row set.
pub fn max_similarity(candidate: ArrayView1<f32>, existing: ArrayView2<f32>) -> f32 {
    if existing.nrows() == 0 {
        return f32::NEG_INFINITY;
    }
    existing
        .dot(&candidate)
        .iter()
        .fold(f32::NEG_INFINITY, |acc, &s| acc.max(s))
}

/// A candidate is novel iff its maximum similarity against the existing set
/// is strictly below `threshold`. An empty existing set is always novel.
pub fn is_novel(candidate: ArrayView1<f32>, existing: ArrayView2<f32>, threshold: f32) -> bool {
    max_similarity(candidate, existing) < threshold
}

/// Incremental dedup pass over `vectors` in original order: each accepted row
/// joins the comparison set for subsequent candidates. Returns the indices of
/// the retained rows, ascending.
pub fn dedup_incremental(vectors: &Array2<f32>, threshold: f32) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::new();

    for i in 0..vectors.nrows() {
        let candidate = vectors.row(i);
        let novel = kept
            .iter()
            .all(|&j| vectors.row(j).dot(&candidate) < threshold);
        if novel {
            kept.push(i);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_empty_existing_set_is_always_novel() {
        let candidate = array![1.0, 0.0];
        let existing = Array2::<f32>::zeros((0, 2));
        assert!(is_novel(candidate.view(), existing.view(), 0.95));
        assert_eq!(
            max_similarity(candidate.view(), existing.view()),
            f32::NEG_INFINITY
        );
    }

    #[test]
    fn test_exact_duplicate_is_not_novel() {
        let candidate = array![1.0, 0.0];
        let existing = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(!is_novel(candidate.view(), existing.view(), 0.97));
    }

    #[test]
    fn test_threshold_is_strict() {
        // similarity exactly at the threshold is not novel
        let candidate = array![1.0, 0.0];
        let existing = array![[1.0, 0.0]];
        assert!(!is_novel(candidate.view(), existing.view(), 1.0));
        assert!(is_novel(candidate.view(), existing.view(), 1.0 + f32::EPSILON));
    }

    #[test]
    fn test_orthogonal_vectors_are_novel() {
        let candidate = array![1.0, 0.0];
        let existing = array![[0.0, 1.0]];
        assert!(is_novel(candidate.view(), existing.view(), 0.5));
    }

    #[test]
    fn test_incremental_pass_collapses_duplicates() {
        // rows 0 and 1 are identical, row 2 identical again, row 3 distinct
        let vectors = array![
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let kept = dedup_incremental(&vectors, 0.97);
        assert_eq!(kept, vec![0, 3]);
    }

    #[test]
    fn test_incremental_pass_keeps_original_order() {
        let vectors = array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        let kept = dedup_incremental(&vectors, 0.97);
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn test_each_accepted_row_extends_comparison_set() {
        // row 1 is near row 0 and gets dropped even though it differs from
        // everything accepted before row 0
        let a = [1.0f32, 0.0];
        let near_a = {
            let mut v = [0.999f32, 0.045];
            let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
            v[0] /= norm;
            v[1] /= norm;
            v
        };
        let vectors = Array2::from_shape_vec(
            (3, 2),
            vec![a[0], a[1], near_a[0], near_a[1], 0.0, 1.0],
        )
        .unwrap();
        let kept = dedup_incremental(&vectors, 0.97);
        assert_eq!(kept, vec![0, 2]);
    }
}
