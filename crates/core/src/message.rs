//! Message identity and value types.
//!
//! A `MessageRef` is owned by the external store and travels by value
//! through ranking and packing. It is never mutated after fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// The role of a message author in an archived conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human participant
    User,
    /// The model's reply
    Assistant,
    /// System instructions
    System,
    /// Tool output
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(Error::invalid(format!("unknown role '{other}'"))),
        }
    }
}

/// `(conv_id, msg_id)` identity of one message.
///
/// Ordering is lexicographic on `(conv_id, msg_id)`, which is the final
/// tie-break for ranked results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub conv_id: String,
    pub msg_id: String,
}

impl MessageKey {
    pub fn new(conv_id: impl Into<String>, msg_id: impl Into<String>) -> Self {
        Self {
            conv_id: conv_id.into(),
            msg_id: msg_id.into(),
        }
    }

    /// Parse the `"<conv_id>/<msg_id>"` wire form. Splits at the first `/`,
    /// so message ids may themselves contain slashes.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let Some((conv_id, msg_id)) = raw.split_once('/') else {
            return Err(Error::invalid(format!(
                "message identifier '{raw}' must be in the form '<conversation>/<message>'"
            )));
        };
        if conv_id.is_empty() || msg_id.is_empty() {
            return Err(Error::invalid(format!(
                "message identifier '{raw}' has an empty conversation or message part"
            )));
        }
        Ok(Self::new(conv_id, msg_id))
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conv_id, self.msg_id)
    }
}

impl std::str::FromStr for MessageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One archived message as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRef {
    pub conv_id: String,
    pub msg_id: String,
    pub role: Role,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Parent message id within the same conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl MessageRef {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.conv_id.clone(), self.msg_id.clone())
    }

    pub fn parent(&self) -> Option<MessageKey> {
        self.parent_id
            .as_ref()
            .map(|p| MessageKey::new(self.conv_id.clone(), p.clone()))
    }
}
