//! Similarity and Prediction Algorithms for the Recommendation Cluster
//!
//! Pure functions over a dense [`RatingMatrix`]: cosine similarity between
//! rating rows and k-nearest-neighbour weighted rating prediction. Workers and
//! the coordinator both call into this module; nothing here does I/O.
//!
//! ## Mathematical Foundation
//!
//! ### Cosine Similarity
//!
//! ```text
//! cosine(u, v) = (u · v) / (||u|| * ||v||)
//! ```
//!
//! Missing ratings are stored as `0.0`, so they contribute nothing to the dot
//! product or to either norm. Similarity is therefore computed implicitly over
//! the positions rated in either vector, without building a sparse index.
//! A degenerate (all-zero) vector has similarity `0.0` with everything.
//!
//! ### KNN Prediction
//!
//! For a target user the neighbours are the `k` users with the highest
//! similarity, excluding the target itself. For each item the target has not
//! rated:
//!
//! ```text
//! prediction(m) = Σ sim(n) * r(n, m) / Σ |sim(n)|     over neighbours n with r(n, m) != 0
//! ```
//!
//! Items the target already rated are copied through unchanged, and an item no
//! neighbour rated predicts exactly `0.0`.
//!
//! ## Ordering
//!
//! All rankings are descending by score with ties broken by ascending index,
//! so identical inputs always produce identical outputs across nodes. `NaN`
//! scores rank last.

use std::cmp::Ordering;
use thiserror::Error;

use crate::types::{RatingMatrix, UserSimilarity};

/// Score assigned to the target user in [`SimilaritySearch::similarity_for_user`]
/// so it always ranks below every real neighbour.
pub const SELF_SIMILARITY_SENTINEL: f64 = -1.0;

/// Errors raised when a computation is asked about data it does not have
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("Ragged matrix: row {row} has {found} entries, expected {expected}")]
    RaggedMatrix { row: usize, expected: usize, found: usize },

    #[error("User index {user_index} out of range ({num_users} users)")]
    UserIndexOutOfRange { user_index: usize, num_users: usize },

    #[error("Similarity vector has {found} entries, matrix has {expected} users")]
    SimilarityLengthMismatch { expected: usize, found: usize },
}

pub type ComputeResult<T> = Result<T, ComputeError>;

/// Similarity and KNN prediction over rating matrices
pub struct SimilaritySearch;

impl SimilaritySearch {
    /// Cosine similarity between two rating vectors.
    ///
    /// Returns `0.0` when either vector has zero norm. Vectors taken from the
    /// same [`RatingMatrix`] always have equal length; if lengths differ only
    /// the common prefix is considered.
    pub fn cosine_similarity(u: &[f64], v: &[f64]) -> f64 {
        debug_assert_eq!(u.len(), v.len(), "cosine over vectors of different length");

        let (mut dot, mut norm_u, mut norm_v) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (a, b) in u.iter().zip(v.iter()) {
            dot += a * b;
            norm_u += a * a;
            norm_v += b * b;
        }

        if norm_u == 0.0 || norm_v == 0.0 {
            return 0.0;
        }

        dot / (norm_u.sqrt() * norm_v.sqrt())
    }

    /// Similarity of `user_index` against every row of the matrix.
    ///
    /// The entry for the target user itself is [`SELF_SIMILARITY_SENTINEL`]
    /// rather than its true self-similarity, so it is never selected as its
    /// own neighbour.
    pub fn similarity_for_user(matrix: &RatingMatrix, user_index: usize) -> ComputeResult<Vec<f64>> {
        let target = matrix.row(user_index).ok_or(ComputeError::UserIndexOutOfRange {
            user_index,
            num_users: matrix.num_users(),
        })?;

        Ok(matrix
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if i == user_index {
                    SELF_SIMILARITY_SENTINEL
                } else {
                    Self::cosine_similarity(target, row)
                }
            })
            .collect())
    }

    /// Full U x U pairwise similarity matrix, flattened row-major.
    ///
    /// Unlike [`similarity_for_user`](Self::similarity_for_user) the diagonal
    /// holds the true self-similarity (1.0 for any row with a rating, 0.0 for
    /// an empty row).
    pub fn similarity_matrix(matrix: &RatingMatrix) -> Vec<f64> {
        let rows = matrix.rows();
        let mut result = Vec::with_capacity(rows.len() * rows.len());

        for u in rows {
            for v in rows {
                result.push(Self::cosine_similarity(u, v));
            }
        }

        result
    }

    /// The `k` most similar users to `user_index`, best first.
    ///
    /// `k` is clamped to the number of candidates other than the target.
    pub fn top_neighbors(similarities: &[f64], user_index: usize, k: usize) -> Vec<UserSimilarity> {
        Self::rank_by_score(similarities)
            .into_iter()
            .filter(|&i| i != user_index)
            .take(k)
            .map(|i| UserSimilarity {
                user_index: i,
                score: similarities[i],
            })
            .collect()
    }

    /// Predict the target user's ratings from its `k` nearest neighbours.
    ///
    /// Known ratings pass through untouched; unknown ratings become the
    /// similarity-weighted mean of the neighbours who rated that item, or
    /// `0.0` when none did.
    pub fn predict_ratings(
        matrix: &RatingMatrix,
        similarities: &[f64],
        user_index: usize,
        k: usize,
    ) -> ComputeResult<Vec<f64>> {
        let target = matrix.row(user_index).ok_or(ComputeError::UserIndexOutOfRange {
            user_index,
            num_users: matrix.num_users(),
        })?;

        if similarities.len() != matrix.num_users() {
            return Err(ComputeError::SimilarityLengthMismatch {
                expected: matrix.num_users(),
                found: similarities.len(),
            });
        }

        let neighbors = Self::top_neighbors(similarities, user_index, k);
        let rows = matrix.rows();

        let predictions = target
            .iter()
            .enumerate()
            .map(|(item, &known)| {
                if known != 0.0 {
                    return known;
                }

                let (mut numerator, mut denominator) = (0.0_f64, 0.0_f64);
                for neighbor in &neighbors {
                    let rating = rows[neighbor.user_index][item];
                    if rating == 0.0 {
                        continue;
                    }
                    numerator += neighbor.score * rating;
                    denominator += neighbor.score.abs();
                }

                if denominator == 0.0 {
                    0.0
                } else {
                    numerator / denominator
                }
            })
            .collect();

        Ok(predictions)
    }

    /// Indices of `scores` ordered by descending score, ties by ascending index.
    pub fn rank_by_score(scores: &[f64]) -> Vec<usize> {
        let mut indexes: Vec<usize> = (0..scores.len()).collect();
        // Stable sort keeps equal scores in ascending index order
        indexes.sort_by(|&a, &b| descending(scores[a], scores[b]));
        indexes
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> RatingMatrix {
        RatingMatrix::new(vec![
            vec![1.0, 0.5, 0.0],
            vec![0.2, 0.0, 0.8],
            vec![0.0, 0.9, 0.4],
        ])
        .unwrap()
    }

    #[test]
    fn test_cosine_degenerate_vector_is_zero() {
        assert_eq!(SimilaritySearch::cosine_similarity(&[0.0, 0.0], &[0.3, 0.4]), 0.0);
        assert_eq!(SimilaritySearch::cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_disjoint_support_is_zero() {
        let u = [0.5, 0.0, 0.7, 0.0];
        let v = [0.0, 0.9, 0.0, 0.1];
        assert_eq!(SimilaritySearch::cosine_similarity(&u, &v), 0.0);
    }

    #[test]
    fn test_similarity_matrix_known_values() {
        let sims = SimilaritySearch::similarity_matrix(&sample_matrix());
        assert_eq!(sims.len(), 9);

        for i in 0..3 {
            assert!((sims[i * 3 + i] - 1.0).abs() < 1e-9, "diagonal {} = {}", i, sims[i * 3 + i]);
        }
        // 0.2 / (sqrt(1.25) * sqrt(0.68))
        assert!((sims[1] - 0.2169).abs() < 1e-3, "sims[0][1] = {}", sims[1]);
        assert!((sims[1] - sims[3]).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_for_user_uses_sentinel() {
        let sims = SimilaritySearch::similarity_for_user(&sample_matrix(), 1).unwrap();
        assert_eq!(sims[1], SELF_SIMILARITY_SENTINEL);
        assert!(sims[0] > 0.0 && sims[2] > 0.0);
    }

    #[test]
    fn test_similarity_for_user_out_of_range() {
        let err = SimilaritySearch::similarity_for_user(&sample_matrix(), 3).unwrap_err();
        assert_eq!(err, ComputeError::UserIndexOutOfRange { user_index: 3, num_users: 3 });
    }

    #[test]
    fn test_predict_keeps_known_ratings() {
        let matrix = sample_matrix();
        let sims = SimilaritySearch::similarity_for_user(&matrix, 0).unwrap();
        let preds = SimilaritySearch::predict_ratings(&matrix, &sims, 0, 2).unwrap();

        assert_eq!(preds[0], 1.0);
        assert_eq!(preds[1], 0.5);
        // Item 2 predicted from users 1 and 2 who both rated it
        let expected = (sims[1] * 0.8 + sims[2] * 0.4) / (sims[1].abs() + sims[2].abs());
        assert!((preds[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_predict_unrated_column_is_zero() {
        let matrix = RatingMatrix::new(vec![
            vec![0.5, 0.0],
            vec![0.4, 0.0],
            vec![0.3, 0.0],
        ])
        .unwrap();
        let sims = SimilaritySearch::similarity_for_user(&matrix, 0).unwrap();
        let preds = SimilaritySearch::predict_ratings(&matrix, &sims, 0, 2).unwrap();
        assert_eq!(preds, vec![0.5, 0.0]);
    }

    #[test]
    fn test_predict_clamps_large_k() {
        let matrix = sample_matrix();
        let sims = SimilaritySearch::similarity_for_user(&matrix, 2).unwrap();
        let clamped = SimilaritySearch::predict_ratings(&matrix, &sims, 2, 2).unwrap();
        let oversized = SimilaritySearch::predict_ratings(&matrix, &sims, 2, 50).unwrap();
        assert_eq!(clamped, oversized);
    }

    #[test]
    fn test_predict_with_zero_k_keeps_only_known() {
        let matrix = sample_matrix();
        let sims = SimilaritySearch::similarity_for_user(&matrix, 0).unwrap();
        let preds = SimilaritySearch::predict_ratings(&matrix, &sims, 0, 0).unwrap();
        assert_eq!(preds, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_predict_rejects_mismatched_similarities() {
        let err = SimilaritySearch::predict_ratings(&sample_matrix(), &[0.1], 0, 1).unwrap_err();
        assert_eq!(err, ComputeError::SimilarityLengthMismatch { expected: 3, found: 1 });
    }

    #[test]
    fn test_top_neighbors_excludes_target() {
        let neighbors = SimilaritySearch::top_neighbors(&[0.9, -1.0, 0.3, 0.7], 1, 10);
        let order: Vec<usize> = neighbors.iter().map(|n| n.user_index).collect();
        assert_eq!(order, vec![0, 3, 2]);
    }

    #[test]
    fn test_rank_by_score_ties_ascending() {
        let ranked = SimilaritySearch::rank_by_score(&[0.5, 0.9, 0.5, 0.9, 0.1]);
        assert_eq!(ranked, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_rank_by_score_nan_last() {
        let ranked = SimilaritySearch::rank_by_score(&[f64::NAN, 0.2, 0.8]);
        assert_eq!(ranked, vec![2, 1, 0]);
    }
}
