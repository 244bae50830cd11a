//! # EchoGarden Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! EchoGarden retrieval core. This crate has **no async runtime dependency**:
//! it defines the model that the ranker, the assembler, and store
//! implementations agree on.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (candidate sources, embedder, message
//! store) is a trait here. Implementations live elsewhere, so:
//! - The ranker depends only on `CandidateSource`
//! - Tests swap in stub sources
//! - All crates depend inward on core

pub mod error;
pub mod message;
pub mod pack;
pub mod search;
pub mod similarity;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, SignalFailure, SourceError};
pub use message::{MessageKey, MessageRef, Role};
pub use pack::{Omission, OmissionReason, PackRequest, PackResponse, SegmentMeta};
pub use search::{
    DateRange, FilterSet, HighlightSpan, Hit, ScoredCandidate, SearchRequest, SearchResponse,
    Signal,
};
pub use source::{CandidateQuery, CandidateSource, Embedder, MessageStore};
