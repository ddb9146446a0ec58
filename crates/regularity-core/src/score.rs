//! Top-K rank membership and the regularity score.
//!
//! Position 0 is never scored: the model has no context to predict the first token from.
//! Everything here is pure and allocation-light; callers decide `k`.

use crate::{Candidate, TokenPrediction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// One entry per scored position (positions `1..n`).
    pub hits: Vec<bool>,
    /// Fraction of `hits` that are true. `0.0` when nothing was scored.
    pub regularity: f64,
}

impl AnalysisResult {
    pub fn scored_positions(&self) -> usize {
        self.hits.len()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.iter().filter(|h| **h).count()
    }
}

/// Whether `observed` is one of the first `k` candidates (exact, case-sensitive match).
pub fn in_top_k(observed: &str, candidates: &[Candidate], k: usize) -> bool {
    candidates.iter().take(k).any(|c| c.token == observed)
}

/// Index of `observed` in the full candidate list, if present.
pub fn rank_of(observed: &str, candidates: &[Candidate]) -> Option<usize> {
    candidates.iter().position(|c| c.token == observed)
}

fn regularity_of(hits: &[bool]) -> f64 {
    if hits.is_empty() {
        // Nothing scoreable; this is a convention, not "fully predictable".
        return 0.0;
    }
    let n_hit = hits.iter().filter(|h| **h).count();
    n_hit as f64 / hits.len() as f64
}

pub fn score(predictions: &[TokenPrediction], k: usize) -> AnalysisResult {
    let hits: Vec<bool> = predictions
        .iter()
        .skip(1)
        .map(|p| in_top_k(&p.observed, &p.candidates, k))
        .collect();
    let regularity = regularity_of(&hits);
    AnalysisResult { hits, regularity }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDetail {
    pub position: usize,
    pub token: String,
    /// 0-based rank of the observed token among all candidates the model returned.
    pub rank: Option<usize>,
    pub in_top_k: bool,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetail {
    pub top_k: usize,
    pub tokens: Vec<TokenDetail>,
    pub regularity: f64,
}

/// Per-token view of the same analysis `score` performs.
///
/// The first token is reported with no rank so clients can still render it.
pub fn detail(predictions: &[TokenPrediction], k: usize) -> AnalysisDetail {
    let result = score(predictions, k);
    let tokens = predictions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let scored = i > 0;
            TokenDetail {
                position: p.position,
                token: p.observed.clone(),
                rank: if scored {
                    rank_of(&p.observed, &p.candidates)
                } else {
                    None
                },
                in_top_k: scored && result.hits[i - 1],
                candidates: p.candidates.clone(),
            }
        })
        .collect();
    AnalysisDetail {
        top_k: k,
        tokens,
        regularity: result.regularity,
    }
}
