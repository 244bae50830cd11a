//! Pack request/response shapes exposed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{MessageKey, Role};

/// Build a token-budgeted block from an ordered list of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackRequest {
    /// `"<conv_id>/<msg_id>"` identifiers, in the order to pack them
    pub message_ids: Vec<String>,

    /// Falls back to the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Falls back to the configured default model when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Why a requested message is missing from the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    /// The store does not know the identifier
    NotFound,
    /// The store lookup failed
    FetchFailed,
    /// The message did not fit in the remaining budget
    BudgetExhausted,
}

/// A requested message left out of the pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Omission {
    pub conv_id: String,
    pub msg_id: String,
    pub reason: OmissionReason,
}

impl Omission {
    pub fn new(key: &MessageKey, reason: OmissionReason) -> Self {
        Self {
            conv_id: key.conv_id.clone(),
            msg_id: key.msg_id.clone(),
            reason,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.conv_id.clone(), self.msg_id.clone())
    }
}

/// Provenance for one included segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub conv_id: String,
    pub msg_id: String,
    pub role: Role,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
    /// The segment's text was cut to fit
    #[serde(default)]
    pub truncated: bool,
}

/// The packed block and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackResponse {
    pub text_block: String,
    pub token_count: usize,
    pub truncated: bool,
    pub segments: Vec<SegmentMeta>,
    #[serde(default)]
    pub omitted: Vec<Omission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_request_optional_fields() {
        let req: PackRequest = serde_json::from_str(r#"{"message_ids":["c1/1"]}"#).unwrap();
        assert_eq!(req.message_ids, vec!["c1/1"]);
        assert!(req.max_tokens.is_none());
        assert!(req.model.is_none());
    }

    #[test]
    fn omission_reasons_serialize_snake_case() {
        let omission = Omission::new(&MessageKey::new("c1", "2"), OmissionReason::BudgetExhausted);
        let json = serde_json::to_value(&omission).unwrap();
        assert_eq!(json["reason"], "budget_exhausted");
        assert_eq!(omission.key().to_string(), "c1/2");
    }
}
