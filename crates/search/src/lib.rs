//! Hybrid search ranking for EchoGarden.
//!
//! The ranker queries every configured [`CandidateSource`] concurrently,
//! min–max normalises each signal, fuses by weighted sum, breaks ties
//! deterministically, and can apply MMR diversity before rendering hits
//! with highlight spans and snippets.
//!
//! [`CandidateSource`]: echogarden_core::CandidateSource

pub mod diversity;
pub mod fusion;
pub mod highlight;
pub mod ranker;

pub use diversity::mmr_rerank;
pub use fusion::{FusedCandidate, FusionWeights, fuse, min_max_normalize};
pub use highlight::{build_snippets, highlight_spans};
pub use ranker::HybridRanker;
