//! JSON-lines archive loading.
//!
//! Each non-blank line is one JSON-encoded `StoredMessage`:
//!
//! ```text
//! {"conv_id":"c1","msg_id":"1","role":"user","ts":"2024-05-01T10:00:00Z","text":"...","tags":["docker"]}
//! ```

use echogarden_core::message::MessageKey;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::in_memory::{InMemoryStore, StoredMessage};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read archive {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid archive entry on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Duplicate message {key} on line {line}")]
    Duplicate { key: MessageKey, line: usize },
}

/// Parse JSONL content into messages. Blank lines are skipped; a
/// malformed line or a repeated `(conv_id, msg_id)` fails the whole load.
pub fn parse_jsonl(content: &str) -> Result<Vec<StoredMessage>, ArchiveError> {
    let mut seen = HashSet::new();
    let mut messages = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredMessage =
            serde_json::from_str(line).map_err(|e| ArchiveError::Parse {
                line: line_no,
                reason: e.to_string(),
            })?;
        let key = stored.message.key();
        if !seen.insert(key.clone()) {
            return Err(ArchiveError::Duplicate { key, line: line_no });
        }
        messages.push(stored);
    }

    Ok(messages)
}

/// Load a JSONL archive file into an in-memory store.
pub fn load_jsonl(path: &Path) -> Result<InMemoryStore, ArchiveError> {
    let content = std::fs::read_to_string(path).map_err(|e| ArchiveError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let messages = parse_jsonl(&content)?;
    debug!(path = %path.display(), count = messages.len(), "Archive loaded");
    Ok(InMemoryStore::from_messages(messages))
}
