//! Search request/response shapes and the scored types that flow
//! between candidate sources and the ranker.
//!
//! The ranking pipeline merges two signals:
//! - Lexical (keyword / BM25-style, unbounded monotonic scores)
//! - Vector (cosine similarity in [-1, 1])

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::{MessageKey, MessageRef, Role};

/// Which retrieval backend produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Lexical,
    Vector,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time window. Either end may be open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| ts >= from) && self.to.is_none_or(|to| ts <= to)
    }
}

/// Optional narrowing predicates for candidate retrieval.
///
/// Absent options impose no constraint. `conv_id`, `date_range` and
/// `roles` are visible on a `MessageRef`; `tags` and `model` are archive
/// labels only the store can check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    #[serde(default, alias = "role", skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeSet<Role>>,

    /// Matches messages carrying any of these tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(DateRange {
            from: Some(from),
            to: Some(to),
        }) = &self.date_range
            && from > to
        {
            return Err(Error::invalid(format!(
                "date range start {from} is after end {to}"
            )));
        }
        if self.roles.as_ref().is_some_and(|r| r.is_empty()) {
            return Err(Error::invalid("role filter must name at least one role"));
        }
        Ok(())
    }

    /// Check the predicates that can be evaluated on the message itself.
    pub fn admits(&self, message: &MessageRef) -> bool {
        if let Some(conv_id) = &self.conv_id
            && &message.conv_id != conv_id
        {
            return false;
        }
        if let Some(range) = &self.date_range
            && !range.contains(message.timestamp)
        {
            return false;
        }
        if let Some(roles) = &self.roles
            && !roles.contains(&message.role)
        {
            return false;
        }
        true
    }

    /// Check the archive-label predicates (`tags`, `model`).
    pub fn admits_labels(&self, tags: &[String], model: Option<&str>) -> bool {
        if let Some(wanted) = &self.tags
            && !wanted.is_empty()
            && !tags.iter().any(|t| wanted.contains(t))
        {
            return false;
        }
        if let Some(wanted) = &self.model
            && model != Some(wanted.as_str())
        {
            return false;
        }
        true
    }
}

/// A message with a relevance score in one signal's native scale.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub message: MessageRef,
    pub score: f32,
    pub signal: Signal,
    /// Message embedding, when the source has one (used for diversity)
    pub embedding: Option<Arc<[f32]>>,
}

impl ScoredCandidate {
    pub fn new(message: MessageRef, score: f32, signal: Signal) -> Self {
        Self {
            message,
            score,
            signal,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Arc<[f32]>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn key(&self) -> MessageKey {
        self.message.key()
    }
}

/// Character offsets `[start, end)` of a query-term match in a hit's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(flatten)]
    pub message: MessageRef,

    /// Fused score in [0, 1]
    pub score: f32,

    /// Non-overlapping, sorted by start
    #[serde(default)]
    pub highlights: Vec<HighlightSpan>,

    /// Display snippets with matches wrapped in `**`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<String>,

    /// Signals that returned this message
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl Hit {
    pub fn key(&self) -> MessageKey {
        self.message.key()
    }
}

/// A search request from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default)]
    pub filters: FilterSet,

    #[serde(default)]
    pub diversity: bool,
}

pub fn default_k() -> usize {
    50
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            filters: FilterSet::default(),
            diversity: false,
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_diversity(mut self, diversity: bool) -> Self {
        self.diversity = diversity;
        self
    }
}

/// The ranked hits plus any degradation notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,

    /// One entry per signal that failed or timed out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(conv: &str, role: Role, day: u32) -> MessageRef {
        MessageRef {
            conv_id: conv.into(),
            msg_id: "1".into(),
            role,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            text: "text".into(),
            parent_id: None,
        }
    }

    #[test]
    fn empty_filters_admit_everything() {
        let filters = FilterSet::default();
        assert!(filters.is_empty());
        assert!(filters.admits(&message("c1", Role::Tool, 3)));
        assert!(filters.admits_labels(&[], None));
    }

    #[test]
    fn date_range_is_inclusive() {
        let filters = FilterSet {
            date_range: Some(DateRange {
                from: Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()),
                to: Some(Utc.with_ymd_and_hms(2024, 1, 4, 12, 0, 0).unwrap()),
            }),
            ..FilterSet::default()
        };
        assert!(!filters.admits(&message("c1", Role::User, 1)));
        assert!(filters.admits(&message("c1", Role::User, 2)));
        assert!(filters.admits(&message("c1", Role::User, 4)));
        assert!(!filters.admits(&message("c1", Role::User, 5)));
    }

    #[test]
    fn inverted_date_range_is_invalid() {
        let filters = FilterSet {
            date_range: Some(DateRange {
                from: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
                to: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }),
            ..FilterSet::default()
        };
        assert!(matches!(
            filters.validate(),
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn role_and_conversation_narrow() {
        let filters = FilterSet {
            conv_id: Some("c1".into()),
            roles: Some([Role::Assistant].into_iter().collect()),
            ..FilterSet::default()
        };
        assert!(filters.admits(&message("c1", Role::Assistant, 1)));
        assert!(!filters.admits(&message("c1", Role::User, 1)));
        assert!(!filters.admits(&message("c2", Role::Assistant, 1)));
    }

    #[test]
    fn tags_match_any_and_model_matches_exactly() {
        let filters = FilterSet {
            tags: Some(["docker".to_string(), "k8s".to_string()].into_iter().collect()),
            model: Some("gpt-4".into()),
            ..FilterSet::default()
        };
        assert!(filters.admits_labels(&["k8s".into()], Some("gpt-4")));
        assert!(!filters.admits_labels(&["rust".into()], Some("gpt-4")));
        assert!(!filters.admits_labels(&["docker".into()], Some("gpt-3.5-turbo")));
        assert!(!filters.admits_labels(&["docker".into()], None));
    }

    #[test]
    fn filters_accept_singular_role_key() {
        let filters: FilterSet =
            serde_json::from_str(r#"{"conv_id":"c1","role":["user"]}"#).unwrap();
        assert_eq!(filters.conv_id.as_deref(), Some("c1"));
        assert!(filters.roles.unwrap().contains(&Role::User));
    }

    #[test]
    fn search_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"docker"}"#).unwrap();
        assert_eq!(req.k, 50);
        assert!(!req.diversity);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn hit_flattens_message_fields() {
        let hit = Hit {
            message: message("c1", Role::User, 1),
            score: 0.5,
            highlights: vec![HighlightSpan { start: 0, end: 4 }],
            snippets: vec![],
            signals: vec![Signal::Lexical],
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["conv_id"], "c1");
        assert_eq!(json["highlights"][0]["end"], 4);
        assert_eq!(json["signals"][0], "lexical");
        assert!(json.get("snippets").is_none());
    }
}
