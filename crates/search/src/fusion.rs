//! Score fusion — merges per-signal candidate lists into one ranking.
//!
//! Each signal's raw scores are min–max scaled to [0, 1] over its own
//! fetched set, then candidates are unioned by `(conv_id, msg_id)` and
//! scored `Σ weight(signal) * norm(signal)` over the signals that returned
//! them. A signal that did not return a candidate contributes nothing.

use echogarden_config::SearchConfig;
use echogarden_core::message::{MessageKey, MessageRef};
use echogarden_core::search::{ScoredCandidate, Signal};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Per-signal weights, normalised to sum to 1 so fused scores stay in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl FusionWeights {
    pub fn new(lexical: f32, vector: f32) -> Self {
        let lexical = lexical.max(0.0);
        let vector = vector.max(0.0);
        let total = lexical + vector;
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }
        Self {
            lexical: lexical / total,
            vector: vector / total,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.lexical_weight, config.vector_weight)
    }

    pub fn weight(&self, signal: Signal) -> f32 {
        match signal {
            Signal::Lexical => self.lexical,
            Signal::Vector => self.vector,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            vector: 0.6,
        }
    }
}

/// A candidate after fusion, before highlight rendering.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub message: MessageRef,
    /// Fused score in [0, 1]
    pub score: f32,
    /// Signals that returned this message, in `Signal` order
    pub signals: Vec<Signal>,
    pub embedding: Option<Arc<[f32]>>,
}

impl FusedCandidate {
    pub fn key(&self) -> MessageKey {
        self.message.key()
    }
}

/// Min–max scale `scores` to [0, 1].
///
/// A set with no spread (including a single score) scales to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(*s), hi.max(*s))
        });
    let spread = max - min;
    if spread <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores
        .iter()
        .map(|s| ((s - min) / spread).clamp(0.0, 1.0))
        .collect()
}

/// Descending score, then newer timestamp, then ascending `(conv_id, msg_id)`.
pub fn ranking_order(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.message.timestamp.cmp(&a.message.timestamp))
        .then_with(|| a.message.conv_id.cmp(&b.message.conv_id))
        .then_with(|| a.message.msg_id.cmp(&b.message.msg_id))
}

struct Accumulator {
    message: MessageRef,
    norms: HashMap<Signal, f32>,
    embedding: Option<Arc<[f32]>>,
}

/// Fuse per-signal result lists into one deterministic ranking.
pub fn fuse(lists: Vec<(Signal, Vec<ScoredCandidate>)>, weights: &FusionWeights) -> Vec<FusedCandidate> {
    let mut merged: HashMap<MessageKey, Accumulator> = HashMap::new();

    for (signal, candidates) in lists {
        let candidates = dedupe_best(signal, candidates);
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let norms = min_max_normalize(&scores);

        for (candidate, norm) in candidates.into_iter().zip(norms) {
            let acc = merged.entry(candidate.key()).or_insert_with(|| Accumulator {
                message: candidate.message.clone(),
                norms: HashMap::new(),
                embedding: None,
            });
            let slot = acc.norms.entry(signal).or_insert(norm);
            *slot = slot.max(norm);
            if acc.embedding.is_none() {
                acc.embedding = candidate.embedding;
            }
        }
    }

    let mut fused: Vec<FusedCandidate> = merged
        .into_values()
        .map(|acc| {
            let score: f32 = acc
                .norms
                .iter()
                .map(|(signal, norm)| weights.weight(*signal) * norm)
                .sum();
            let mut signals: Vec<Signal> = acc.norms.keys().copied().collect();
            signals.sort();
            FusedCandidate {
                message: acc.message,
                score: score.clamp(0.0, 1.0),
                signals,
                embedding: acc.embedding,
            }
        })
        .collect();

    fused.sort_by(ranking_order);
    fused
}

/// Drop non-finite scores and keep the best score per key.
fn dedupe_best(signal: Signal, candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut best: HashMap<MessageKey, ScoredCandidate> = HashMap::new();
    let mut dropped = 0usize;

    for candidate in candidates {
        if !candidate.score.is_finite() {
            dropped += 1;
            continue;
        }
        match best.get_mut(&candidate.key()) {
            Some(existing) if existing.score >= candidate.score => {}
            Some(existing) => *existing = candidate,
            None => {
                best.insert(candidate.key(), candidate);
            }
        }
    }

    if dropped > 0 {
        warn!(signal = %signal, dropped, "Dropped candidates with non-finite scores");
    }
    best.into_values().collect()
}
