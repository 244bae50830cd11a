//! Maximal Marginal Relevance re-ranking.
//!
//! Greedily picks the candidate maximising
//! `λ * relevance − (1 − λ) * max_similarity_to_selected` until `k` are
//! chosen. Similarity is cosine over embeddings when both candidates carry
//! one, else Jaccard overlap of their word sets.

use echogarden_core::similarity::{cosine_similarity, set_jaccard, word_set};
use std::collections::HashSet;

use crate::fusion::FusedCandidate;

#[derive(Clone, Copy)]
struct Pick {
    index: usize,
    mmr_score: f32,
}

impl Pick {
    /// Higher MMR wins; equal scores prefer the better-ranked candidate.
    fn better_than(self, other: &Self) -> bool {
        self.mmr_score > other.mmr_score
            || (self.mmr_score == other.mmr_score && self.index < other.index)
    }
}

/// Pairwise similarity between two fused candidates.
pub fn candidate_similarity(
    a: &FusedCandidate,
    b: &FusedCandidate,
    a_words: &HashSet<String>,
    b_words: &HashSet<String>,
) -> f32 {
    if let (Some(ea), Some(eb)) = (&a.embedding, &b.embedding)
        && let Some(sim) = cosine_similarity(ea, eb)
    {
        return sim;
    }
    set_jaccard(a_words, b_words)
}

/// Re-rank `candidates` (already sorted by relevance) by MMR.
///
/// Only the first `pool_size` candidates are considered. Returns at most
/// `k` candidates in selection order.
pub fn mmr_rerank(
    candidates: Vec<FusedCandidate>,
    k: usize,
    lambda: f32,
    pool_size: usize,
) -> Vec<FusedCandidate> {
    let pool_size = pool_size.min(candidates.len());
    if pool_size == 0 || k == 0 {
        return Vec::new();
    }

    let mut pool = candidates;
    pool.truncate(pool_size);
    let words: Vec<HashSet<String>> = pool.iter().map(|c| word_set(&c.message.text)).collect();

    let target = k.min(pool.len());
    let mut selected: Vec<usize> = Vec::with_capacity(target);
    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    // Running max similarity of each pool entry to anything selected so far.
    let mut max_sim: Vec<Option<f32>> = vec![None; pool.len()];

    while selected.len() < target {
        let mut best: Option<(usize, Pick)> = None;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = max_sim[idx].unwrap_or(0.0);
            let pick = Pick {
                index: idx,
                mmr_score: lambda * pool[idx].score - (1.0 - lambda) * redundancy,
            };
            if best.as_ref().is_none_or(|(_, b)| pick.better_than(b)) {
                best = Some((pos, pick));
            }
        }

        let Some((pos, pick)) = best else { break };
        remaining.swap_remove(pos);
        selected.push(pick.index);

        for &idx in &remaining {
            let sim = candidate_similarity(
                &pool[idx],
                &pool[pick.index],
                &words[idx],
                &words[pick.index],
            );
            max_sim[idx] = Some(max_sim[idx].map_or(sim, |m| m.max(sim)));
        }
    }

    let mut slots: Vec<Option<FusedCandidate>> = pool.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}
