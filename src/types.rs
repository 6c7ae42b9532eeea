use serde::{Deserialize, Serialize, Serializer};

use crate::similarity_search::{ComputeError, ComputeResult};

/// Dense user x item rating table
///
/// Rows are internal user indices, columns internal item indices. A value of
/// exactly `0.0` means "no rating"; real ratings live in `(0, 1]`. Every row
/// has the same length, which is enforced on construction and on decode.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>")]
pub struct RatingMatrix {
    rows: Vec<Vec<f64>>,
}

impl RatingMatrix {
    /// Build a matrix, rejecting ragged rows
    pub fn new(rows: Vec<Vec<f64>>) -> ComputeResult<Self> {
        if let Some(first) = rows.first() {
            let expected = first.len();
            if let Some((row, found)) = rows
                .iter()
                .enumerate()
                .map(|(i, r)| (i, r.len()))
                .find(|(_, len)| *len != expected)
            {
                return Err(ComputeError::RaggedMatrix { row, expected, found });
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, user_index: usize) -> Option<&[f64]> {
        self.rows.get(user_index).map(|r| r.as_slice())
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    pub fn num_items(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TryFrom<Vec<Vec<f64>>> for RatingMatrix {
    type Error = ComputeError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl Serialize for RatingMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rows.serialize(serializer)
    }
}

/// The two computations a node can be asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// Full pairwise user similarity matrix
    Similarity,
    /// KNN rating prediction for one target user
    Recommendation,
    /// Any kind string this node does not understand
    #[serde(other)]
    Unsupported,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::Similarity => "SIMILARITY",
            TaskKind::Recommendation => "RECOMMENDATION",
            TaskKind::Unsupported => "UNSUPPORTED",
        };
        f.write_str(name)
    }
}

/// Self-contained task sent to the coordinator and replicated to workers
///
/// The kind travels under the `type` key for compatibility with existing
/// deployments; `kind` is accepted on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(rename = "type", alias = "kind")]
    pub kind: TaskKind,
    #[serde(default)]
    pub matrix: RatingMatrix,
    /// Target user, only meaningful for recommendation tasks
    #[serde(rename = "userIndex", default)]
    pub user_index: usize,
    /// Neighbour count for KNN prediction
    #[serde(default)]
    pub k: usize,
}

impl TaskMessage {
    pub fn similarity(matrix: RatingMatrix) -> Self {
        Self {
            kind: TaskKind::Similarity,
            matrix,
            user_index: 0,
            k: 0,
        }
    }

    pub fn recommendation(matrix: RatingMatrix, user_index: usize, k: usize) -> Self {
        Self {
            kind: TaskKind::Recommendation,
            matrix,
            user_index,
            k,
        }
    }

    /// Borrowing view used when the same task is sent to several endpoints
    pub fn borrowed(&self) -> TaskMessageRef<'_> {
        TaskMessageRef {
            kind: self.kind,
            matrix: &self.matrix,
            user_index: self.user_index,
            k: self.k,
        }
    }
}

/// Borrowed form of [`TaskMessage`] with an identical wire encoding
///
/// Lets a caller that owns a large matrix send it without cloning.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaskMessageRef<'a> {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub matrix: &'a RatingMatrix,
    #[serde(rename = "userIndex")]
    pub user_index: usize,
    pub k: usize,
}

/// Result of a task, as returned by workers and by the coordinator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinatorResponse {
    /// Flattened U x U similarity matrix, or a length-M prediction vector
    #[serde(default)]
    pub result: Vec<f64>,
    /// Item indices by descending score, recommendation responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<usize>>,
}

/// (user index, similarity score) pair produced while ranking neighbours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSimilarity {
    pub user_index: usize,
    pub score: f64,
}

/// Item metadata record returned to callers of the recommendation service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub item_id: String,
    pub title: String,
    pub genre: String,
}

impl ItemRecord {
    pub fn new(item_id: impl Into<String>, title: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            genre: genre.into(),
        }
    }

    /// Case-insensitive substring match against the genre field.
    /// `needle` must already be normalized (trimmed, lowercase).
    pub fn matches_genre(&self, needle: &str) -> bool {
        needle.is_empty() || self.genre.to_lowercase().contains(needle)
    }
}
