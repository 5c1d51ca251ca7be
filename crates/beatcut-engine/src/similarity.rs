//! Text similarity boundary.
//!
//! Tag comparison and music retrieval both score short texts against each
//! other. The scorer is an external collaborator; [`LexicalSimilarity`] is
//! the built-in fallback that needs no model.

use std::collections::BTreeSet;

use async_trait::async_trait;
use beatcut_models::{TagField, TagSet};

use crate::error::AssemblyResult;

/// Scores two texts in `[0, 1]`.
#[async_trait]
pub trait TextSimilarity: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> AssemblyResult<f64>;
}

/// Case-insensitive token overlap (Jaccard index).
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalSimilarity;

impl LexicalSimilarity {
    fn tokens(text: &str) -> BTreeSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    pub fn score(a: &str, b: &str) -> f64 {
        let ta = Self::tokens(a);
        let tb = Self::tokens(b);
        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }
        let shared = ta.intersection(&tb).count();
        let total = ta.union(&tb).count();
        shared as f64 / total as f64
    }
}

#[async_trait]
impl TextSimilarity for LexicalSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> AssemblyResult<f64> {
        Ok(Self::score(a, b))
    }
}

/// Similarity of one tag field between two shots.
///
/// An absent tag compares as the empty string: two empty tags are
/// identical (1.0), one empty tag matches nothing (0.0). Otherwise the
/// collaborator decides, clamped to `[0, 1]`.
pub async fn tag_similarity(
    scorer: &dyn TextSimilarity,
    a: &TagSet,
    b: &TagSet,
    field: TagField,
) -> AssemblyResult<f64> {
    let left = a.comparable(field).trim();
    let right = b.comparable(field).trim();

    match (left.is_empty(), right.is_empty()) {
        (true, true) => Ok(1.0),
        (true, false) | (false, true) => Ok(0.0),
        (false, false) => {
            let score = scorer.similarity(left, right).await?;
            Ok(if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 })
        }
    }
}
