//! In-memory store — reference collaborator for tests and the CLI.
//!
//! Holds archived messages behind a `tokio::sync::RwLock` and serves the
//! three read operations the core consumes: lexical search, vector search,
//! and bulk fetch.

use async_trait::async_trait;
use echogarden_core::error::SourceError;
use echogarden_core::message::{MessageKey, MessageRef};
use echogarden_core::search::{FilterSet, ScoredCandidate, Signal};
use echogarden_core::similarity::{parse_terms, word_spans};
use echogarden_core::source::{CandidateQuery, CandidateSource, MessageStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::vector;

/// BM25 term-frequency saturation.
const BM25_K1: f32 = 1.2;
/// BM25 length normalisation.
const BM25_B: f32 = 0.75;

/// One archived message with the labels only the store knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub message: MessageRef,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Model that produced the message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl StoredMessage {
    pub fn new(message: MessageRef) -> Self {
        Self {
            message,
            tags: Vec::new(),
            model: None,
            embedding: None,
        }
    }
}

struct Entry {
    message: MessageRef,
    tags: Vec<String>,
    model: Option<String>,
    embedding: Option<Arc<[f32]>>,
    term_freqs: HashMap<String, u32>,
    length: u32,
}

impl Entry {
    fn from_stored(stored: StoredMessage) -> Self {
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        let mut length = 0;
        for (_, _, word) in word_spans(&stored.message.text) {
            *term_freqs.entry(word.to_lowercase()).or_default() += 1;
            length += 1;
        }
        Self {
            message: stored.message,
            tags: stored.tags,
            model: stored.model,
            embedding: stored.embedding.map(Arc::from),
            term_freqs,
            length,
        }
    }

    fn admitted_by(&self, filters: &FilterSet) -> bool {
        filters.admits(&self.message) && filters.admits_labels(&self.tags, self.model.as_deref())
    }
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    index: HashMap<MessageKey, usize>,
}

/// An in-memory archive. Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from messages. Later duplicates replace earlier ones.
    pub fn from_messages(messages: impl IntoIterator<Item = StoredMessage>) -> Self {
        let mut inner = Inner::default();
        for stored in messages {
            Self::upsert(&mut inner, stored);
        }
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Insert or replace a message. Returns `true` when it replaced one.
    pub async fn insert(&self, stored: StoredMessage) -> bool {
        let mut inner = self.inner.write().await;
        Self::upsert(&mut inner, stored)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The BM25 lexical candidate source over this store.
    pub fn lexical_source(&self) -> Arc<dyn CandidateSource> {
        Arc::new(LexicalSearch {
            store: self.clone(),
        })
    }

    /// The cosine-similarity candidate source over this store.
    pub fn vector_source(&self) -> Arc<dyn CandidateSource> {
        Arc::new(VectorSearch {
            store: self.clone(),
        })
    }

    fn upsert(inner: &mut Inner, stored: StoredMessage) -> bool {
        let key = stored.message.key();
        let entry = Entry::from_stored(stored);
        match inner.index.get(&key) {
            Some(&pos) => {
                inner.entries[pos] = entry;
                true
            }
            None => {
                inner.index.insert(key, inner.entries.len());
                inner.entries.push(entry);
                false
            }
        }
    }
}

/// Ties order by newer timestamp, then `(conv_id, msg_id)`.
fn sort_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.message.timestamp.cmp(&a.message.timestamp))
            .then_with(|| a.key().cmp(&b.key()))
    });
}

struct LexicalSearch {
    store: InMemoryStore,
}

#[async_trait]
impl CandidateSource for LexicalSearch {
    fn signal(&self) -> Signal {
        Signal::Lexical
    }

    async fn search(&self, query: &CandidateQuery) -> Result<Vec<ScoredCandidate>, SourceError> {
        let terms = parse_terms(&query.text);
        if terms.is_empty() {
            return Ok(vec![]);
        }

        let inner = self.store.inner.read().await;
        let docs: Vec<&Entry> = inner
            .entries
            .iter()
            .filter(|e| e.admitted_by(&query.filters))
            .collect();
        if docs.is_empty() {
            return Ok(vec![]);
        }

        let n = docs.len() as f32;
        let avg_len = docs.iter().map(|d| d.length as f32).sum::<f32>() / n;
        let idf: Vec<f32> = terms
            .iter()
            .map(|t| {
                let df = docs.iter().filter(|d| d.term_freqs.contains_key(t)).count() as f32;
                (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
            })
            .collect();

        let mut results: Vec<ScoredCandidate> = docs
            .iter()
            .filter_map(|doc| {
                let norm = 1.0 - BM25_B + BM25_B * doc.length as f32 / avg_len.max(1.0);
                let score: f32 = terms
                    .iter()
                    .zip(&idf)
                    .map(|(term, idf)| {
                        let tf = doc.term_freqs.get(term).copied().unwrap_or(0) as f32;
                        idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm)
                    })
                    .sum();
                (score > 0.0)
                    .then(|| ScoredCandidate::new(doc.message.clone(), score, Signal::Lexical))
            })
            .collect();

        sort_candidates(&mut results);
        results.truncate(query.limit);
        debug!(candidates = results.len(), "In-memory lexical search complete");
        Ok(results)
    }
}

struct VectorSearch {
    store: InMemoryStore,
}

#[async_trait]
impl CandidateSource for VectorSearch {
    fn signal(&self) -> Signal {
        Signal::Vector
    }

    async fn search(&self, query: &CandidateQuery) -> Result<Vec<ScoredCandidate>, SourceError> {
        let Some(query_embedding) = query.embedding.as_deref() else {
            return Err(SourceError::MissingEmbedding);
        };

        let inner = self.store.inner.read().await;
        let embedded = inner
            .entries
            .iter()
            .filter(|e| e.admitted_by(&query.filters))
            .filter_map(|e| e.embedding.as_ref().map(|emb| (&e.message, emb)));

        let mut results = vector::rank_by_similarity(embedded, query_embedding);
        sort_candidates(&mut results);
        results.truncate(query.limit);
        debug!(candidates = results.len(), "In-memory vector search complete");
        Ok(results)
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn fetch_messages(
        &self,
        keys: &[MessageKey],
    ) -> Result<HashMap<MessageKey, MessageRef>, SourceError> {
        let inner = self.inner.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let pos = *inner.index.get(key)?;
                Some((key.clone(), inner.entries[pos].message.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use echogarden_core::message::Role;

    fn stored(conv: &str, id: &str, text: &str, minute: u32) -> StoredMessage {
        StoredMessage::new(MessageRef {
            conv_id: conv.into(),
            msg_id: id.into(),
            role: Role::User,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            text: text.into(),
            parent_id: None,
        })
    }

    fn query(text: &str) -> CandidateQuery {
        CandidateQuery {
            text: text.into(),
            embedding: None,
            limit: 10,
            filters: FilterSet::default(),
        }
    }

    #[tokio::test]
    async fn lexical_search_returns_only_matches() {
        let store = InMemoryStore::from_messages([
            stored("c1", "1", "Rust is great for systems programming", 0),
            stored("c1", "2", "Python is great for scripting", 1),
            stored("c1", "3", "JavaScript runs in the browser", 2),
        ]);

        let results = store.lexical_source().search(&query("rust")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.msg_id, "1");
        assert_eq!(results[0].signal, Signal::Lexical);
    }

    #[tokio::test]
    async fn bm25_prefers_repeated_and_rarer_terms() {
        let store = InMemoryStore::from_messages([
            stored("c1", "1", "docker docker docker compose", 0),
            stored("c1", "2", "docker once", 1),
            stored("c1", "3", "volumes are for persistence", 2),
        ]);

        let results = store
            .lexical_source()
            .search(&query("docker"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message.msg_id, "1");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn lexical_search_respects_filters_and_limit() {
        let mut tagged = stored("c2", "1", "docker volumes", 0);
        tagged.tags = vec!["infra".into()];
        let store = InMemoryStore::from_messages([
            tagged,
            stored("c1", "1", "docker volumes", 1),
            stored("c1", "2", "docker networks", 2),
        ]);

        let mut q = query("docker");
        q.filters.tags = Some(["infra".to_string()].into_iter().collect());
        let results = store.lexical_source().search(&q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.conv_id, "c2");

        let mut q = query("docker");
        q.filters.conv_id = Some("c1".into());
        q.limit = 1;
        let results = store.lexical_source().search(&q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.conv_id, "c1");
    }

    #[tokio::test]
    async fn vector_search_requires_embedding() {
        let store = InMemoryStore::new();
        let err = store.vector_source().search(&query("x")).await.unwrap_err();
        assert_eq!(err, SourceError::MissingEmbedding);
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine_and_carries_embeddings() {
        let mut a = stored("c1", "a", "orthogonal", 0);
        a.embedding = Some(vec![0.0, 1.0]);
        let mut b = stored("c1", "b", "identical", 1);
        b.embedding = Some(vec![1.0, 0.0]);
        let c = stored("c1", "c", "no embedding", 2);
        let store = InMemoryStore::from_messages([a, b, c]);

        let mut q = query("anything");
        q.embedding = Some(Arc::from(vec![1.0, 0.0]));
        let results = store.vector_source().search(&q).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message.msg_id, "b");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[0].embedding.is_some());
    }

    #[tokio::test]
    async fn fetch_omits_unknown_keys() {
        let store = InMemoryStore::from_messages([stored("c1", "1", "hello", 0)]);
        let found = store
            .fetch_messages(&[MessageKey::new("c1", "1"), MessageKey::new("c1", "404")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&MessageKey::new("c1", "1")));
    }

    #[tokio::test]
    async fn insert_replaces_existing_key() {
        let store = InMemoryStore::new();
        assert!(!store.insert(stored("c1", "1", "first", 0)).await);
        assert!(store.insert(stored("c1", "1", "second", 0)).await);
        assert_eq!(store.len().await, 1);

        let found = store
            .fetch_messages(&[MessageKey::new("c1", "1")])
            .await
            .unwrap();
        assert_eq!(found[&MessageKey::new("c1", "1")].text, "second");
    }
}
