//! Token counting and context pack assembly for EchoGarden.
//!
//! - [`TokenCounter`] maps model names to a tokenization scheme, built once
//!   at startup and shared read-only.
//! - [`ContextPackAssembler`] turns an ordered list of message identifiers
//!   into a token-budgeted, role-annotated text block with a provenance
//!   footer.

pub mod assembler;
pub mod token;
pub mod truncate;

pub use assembler::{ContextPack, ContextPackAssembler, Segment};
pub use token::{GENERIC_MODEL, TokenCounter, TokenScheme};
pub use truncate::{boundary_cut, fit_prefix};
