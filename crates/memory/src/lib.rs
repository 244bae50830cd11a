//! Message store implementations for EchoGarden.

pub mod archive;
pub mod in_memory;
pub mod vector;

pub use archive::{ArchiveError, load_jsonl, parse_jsonl};
pub use in_memory::{InMemoryStore, StoredMessage};
pub use vector::rank_by_similarity;
