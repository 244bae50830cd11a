//! Token counting per model.
//!
//! The counter maps model names to a tokenization scheme. It is built once
//! from configuration and never modified afterwards, so it can be shared
//! behind an `Arc` by every assembler.
//!
//! The default scheme is a character heuristic, `ceil(chars / ratio)`,
//! which approximates BPE tokenizers on English text. Treat heuristic
//! counts as estimates when the provider enforces an exact limit. With the
//! `hf-tokenizers` feature, a model can be bound to a `tokenizer.json` for
//! exact counts.

use echogarden_config::TokenizerConfig;
use echogarden_core::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "hf-tokenizers")]
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the fallback scheme used for unrecognised models.
pub const GENERIC_MODEL: &str = "generic";

const GENERIC_CHARS_PER_TOKEN: f32 = 4.0;

/// Built-in heuristic ratios, overridable from `[tokenizer.models]`.
const BUILTIN_MODELS: &[(&str, f32)] = &[
    (GENERIC_MODEL, GENERIC_CHARS_PER_TOKEN),
    ("gpt-4", 4.0),
    ("gpt-4o", 4.0),
    ("gpt-4-turbo", 4.0),
    ("gpt-3.5-turbo", 4.0),
    ("claude", 3.5),
];

/// How one model's text is turned into a token count.
#[derive(Clone)]
pub enum TokenScheme {
    /// `ceil(char_count / chars_per_token)`
    Heuristic { chars_per_token: f32 },
    /// Exact counts from a HuggingFace tokenizer
    #[cfg(feature = "hf-tokenizers")]
    Tokenizer(Arc<tokenizers::Tokenizer>),
}

impl TokenScheme {
    pub fn heuristic(chars_per_token: f32) -> Self {
        Self::Heuristic { chars_per_token }
    }

    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self {
            Self::Heuristic { chars_per_token } => heuristic_count(text, *chars_per_token),
            #[cfg(feature = "hf-tokenizers")]
            Self::Tokenizer(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    warn!(error = %e, "Tokenizer failed to encode text, using estimate");
                    heuristic_count(text, GENERIC_CHARS_PER_TOKEN)
                }
            },
        }
    }

    pub fn is_exact(&self) -> bool {
        match self {
            Self::Heuristic { .. } => false,
            #[cfg(feature = "hf-tokenizers")]
            Self::Tokenizer(_) => true,
        }
    }
}

impl fmt::Debug for TokenScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic { chars_per_token } => f
                .debug_struct("Heuristic")
                .field("chars_per_token", chars_per_token)
                .finish(),
            #[cfg(feature = "hf-tokenizers")]
            Self::Tokenizer(_) => f.write_str("Tokenizer"),
        }
    }
}

fn heuristic_count(text: &str, chars_per_token: f32) -> usize {
    let chars = text.chars().count() as f64;
    (chars / f64::from(chars_per_token)).ceil() as usize
}

/// Read-only model → scheme table.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    schemes: BTreeMap<String, TokenScheme>,
    fallback: TokenScheme,
}

impl Default for TokenCounter {
    fn default() -> Self {
        let schemes = BUILTIN_MODELS
            .iter()
            .map(|(name, ratio)| (name.to_string(), TokenScheme::heuristic(*ratio)))
            .collect();
        Self {
            schemes,
            fallback: TokenScheme::heuristic(GENERIC_CHARS_PER_TOKEN),
        }
    }
}

impl TokenCounter {
    /// Built-in schemes plus the configured per-model overrides.
    pub fn from_config(config: &TokenizerConfig) -> Result<Self> {
        let mut counter = Self::default();

        for (name, model) in &config.models {
            let name = name.to_ascii_lowercase();
            if let Some(path) = &model.tokenizer_file
                && let Some(scheme) = load_tokenizer(&name, path)?
            {
                counter.insert(name, scheme);
                continue;
            }
            if let Some(ratio) = model.chars_per_token {
                if !(ratio.is_finite() && ratio > 0.0) {
                    return Err(Error::Config {
                        message: format!("tokenizer.models.{name}.chars_per_token must be > 0"),
                    });
                }
                counter.insert(name, TokenScheme::heuristic(ratio));
            }
        }

        if let Some(generic) = counter.schemes.get(GENERIC_MODEL) {
            counter.fallback = generic.clone();
        }
        Ok(counter)
    }

    /// Register or replace the scheme for `model`.
    pub fn insert(&mut self, model: impl Into<String>, scheme: TokenScheme) {
        self.schemes.insert(model.into(), scheme);
    }

    /// Count tokens in `text` for `model`.
    pub fn count(&self, text: &str, model: &str) -> usize {
        self.scheme(model).count(text)
    }

    /// Whether counts for `model` come from an exact tokenizer.
    pub fn is_exact(&self, model: &str) -> bool {
        self.scheme(model).is_exact()
    }

    /// Whether `model` resolves to a scheme other than the generic fallback.
    pub fn recognizes(&self, model: &str) -> bool {
        self.lookup(&model.to_ascii_lowercase()).is_some()
    }

    /// Exact name first, then the longest registered prefix, then generic.
    pub fn scheme(&self, model: &str) -> &TokenScheme {
        let model = model.to_ascii_lowercase();
        match self.lookup(&model) {
            Some(scheme) => scheme,
            None => {
                debug!(model = %model, "Unrecognised model, using generic token estimate");
                &self.fallback
            }
        }
    }

    fn lookup(&self, model: &str) -> Option<&TokenScheme> {
        if let Some(scheme) = self.schemes.get(model) {
            return Some(scheme);
        }
        self.schemes
            .iter()
            .filter(|(name, _)| name.as_str() != GENERIC_MODEL && model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, scheme)| scheme)
    }
}

#[cfg(feature = "hf-tokenizers")]
fn load_tokenizer(name: &str, path: &std::path::Path) -> Result<Option<TokenScheme>> {
    let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| Error::Config {
        message: format!(
            "failed to load tokenizer for model '{name}' from {}: {e}",
            path.display()
        ),
    })?;
    debug!(model = %name, path = %path.display(), "Loaded tokenizer");
    Ok(Some(TokenScheme::Tokenizer(Arc::new(tokenizer))))
}

#[cfg(not(feature = "hf-tokenizers"))]
fn load_tokenizer(name: &str, path: &std::path::Path) -> Result<Option<TokenScheme>> {
    warn!(
        model = %name,
        path = %path.display(),
        "tokenizer_file needs the hf-tokenizers feature, using heuristic counts"
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use echogarden_config::ModelTokenizerConfig;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(TokenCounter::default().count("", "gpt-4"), 0);
    }

    #[test]
    fn generic_rounds_up() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count("test", GENERIC_MODEL), 1);
        assert_eq!(counter.count("hello", GENERIC_MODEL), 2);
        assert_eq!(counter.count(&"a".repeat(100), GENERIC_MODEL), 25);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let counter = TokenCounter::default();
        // 4 chars, 8 bytes
        assert_eq!(counter.count("éééé", GENERIC_MODEL), 1);
    }

    #[test]
    fn unknown_model_falls_back_to_generic() {
        let counter = TokenCounter::default();
        assert!(!counter.recognizes("mystery-model"));
        assert_eq!(counter.count("abcdefgh", "mystery-model"), 2);
    }

    #[test]
    fn model_prefix_resolves_to_family() {
        let counter = TokenCounter::default();
        assert!(counter.recognizes("claude-3-opus"));
        // 7 chars / 3.5 = 2
        assert_eq!(counter.count("abcdefg", "claude-3-opus"), 2);
        assert_eq!(counter.count("abcdefgh", "Claude-3-Opus"), 3);
        assert!(counter.recognizes("gpt-4o-mini"));
    }

    #[test]
    fn heuristics_are_not_exact() {
        assert!(!TokenCounter::default().is_exact("gpt-4"));
    }

    #[test]
    fn config_overrides_ratio() {
        let mut config = TokenizerConfig::default();
        config.models.insert(
            "my-model".into(),
            ModelTokenizerConfig {
                chars_per_token: Some(2.0),
                tokenizer_file: None,
            },
        );
        config.models.insert(
            "generic".into(),
            ModelTokenizerConfig {
                chars_per_token: Some(5.0),
                tokenizer_file: None,
            },
        );
        let counter = TokenCounter::from_config(&config).unwrap();
        assert_eq!(counter.count("abcdef", "my-model"), 3);
        assert_eq!(counter.count("abcdefghij", "unknown"), 2);
    }

    #[test]
    fn rejects_non_positive_ratio() {
        let mut config = TokenizerConfig::default();
        config.models.insert(
            "bad".into(),
            ModelTokenizerConfig {
                chars_per_token: Some(0.0),
                tokenizer_file: None,
            },
        );
        assert!(matches!(
            TokenCounter::from_config(&config),
            Err(Error::Config { .. })
        ));
    }

    #[cfg(not(feature = "hf-tokenizers"))]
    #[test]
    fn tokenizer_file_without_feature_keeps_heuristic() {
        let mut config = TokenizerConfig::default();
        config.models.insert(
            "local".into(),
            ModelTokenizerConfig {
                chars_per_token: Some(2.0),
                tokenizer_file: Some("/nonexistent/tokenizer.json".into()),
            },
        );
        let counter = TokenCounter::from_config(&config).unwrap();
        assert_eq!(counter.count("abcd", "local"), 2);
    }
}
