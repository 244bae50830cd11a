//! Collaborator traits — the only way the core reaches the message store.
//!
//! The store is external: it owns full-text indexes, vector indexes, and
//! embeddings. The core only reads through these interfaces and never
//! writes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SourceError;
use crate::message::{MessageKey, MessageRef};
use crate::search::{FilterSet, ScoredCandidate, Signal};

/// Query-shaped input handed to every candidate source.
///
/// The lexical variant reads `text`; the vector variant reads `embedding`.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub text: String,
    pub embedding: Option<Arc<[f32]>>,
    pub limit: usize,
    pub filters: FilterSet,
}

/// A retrieval backend that returns scored candidates.
///
/// Results must be ordered by the source's own relevance notion, best
/// first. Scores must be monotonic in relevance; the scale is the
/// source's own.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// The signal this source contributes.
    fn signal(&self) -> Signal;

    /// Whether the query needs a query embedding before this source can run.
    fn needs_embedding(&self) -> bool {
        self.signal() == Signal::Vector
    }

    async fn search(
        &self,
        query: &CandidateQuery,
    ) -> std::result::Result<Vec<ScoredCandidate>, SourceError>;
}

/// Turns query text into an embedding for vector retrieval.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, SourceError>;
}

/// Bulk message lookup.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch the given messages. Unknown keys are omitted from the map,
    /// not reported as errors.
    async fn fetch_messages(
        &self,
        keys: &[MessageKey],
    ) -> std::result::Result<HashMap<MessageKey, MessageRef>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Signal);

    #[async_trait]
    impl CandidateSource for Fixed {
        fn signal(&self) -> Signal {
            self.0
        }

        async fn search(
            &self,
            _query: &CandidateQuery,
        ) -> std::result::Result<Vec<ScoredCandidate>, SourceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn only_vector_sources_need_embeddings() {
        assert!(!Fixed(Signal::Lexical).needs_embedding());
        assert!(Fixed(Signal::Vector).needs_embedding());
    }

    #[tokio::test]
    async fn sources_are_object_safe() {
        let sources: Vec<Arc<dyn CandidateSource>> =
            vec![Arc::new(Fixed(Signal::Lexical)), Arc::new(Fixed(Signal::Vector))];
        let query = CandidateQuery {
            text: "docker".into(),
            embedding: None,
            limit: 10,
            filters: FilterSet::default(),
        };
        for source in &sources {
            assert!(source.search(&query).await.unwrap().is_empty());
        }
    }
}
