//! Configuration loading, validation, and management for EchoGarden.
//!
//! Loads configuration from `~/.echogarden/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.echogarden/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hybrid ranking settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Context pack settings
    #[serde(default)]
    pub pack: PackConfig,

    /// Token counting overrides
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Upper bound for `k`; larger requests are capped
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Per-source over-fetch floor
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Per-source fetch is `max(min_candidates, fetch_multiplier * k)`
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure novelty
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,

    /// MMR re-ranks the top `mmr_pool_multiplier * k` candidates
    #[serde(default = "default_mmr_pool_multiplier")]
    pub mmr_pool_multiplier: usize,

    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Characters kept on each side of a match in display snippets
    #[serde(default = "default_snippet_window")]
    pub snippet_window: usize,

    #[serde(default = "default_snippet_limit")]
    pub snippet_limit: usize,
}

fn default_max_k() -> usize {
    200
}
fn default_min_candidates() -> usize {
    200
}
fn default_fetch_multiplier() -> usize {
    4
}
fn default_lexical_weight() -> f32 {
    0.4
}
fn default_vector_weight() -> f32 {
    0.6
}
fn default_mmr_lambda() -> f32 {
    0.7
}
fn default_mmr_pool_multiplier() -> usize {
    5
}
fn default_source_timeout_ms() -> u64 {
    2000
}
fn default_snippet_window() -> usize {
    40
}
fn default_snippet_limit() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_k: default_max_k(),
            min_candidates: default_min_candidates(),
            fetch_multiplier: default_fetch_multiplier(),
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            mmr_lambda: default_mmr_lambda(),
            mmr_pool_multiplier: default_mmr_pool_multiplier(),
            source_timeout_ms: default_source_timeout_ms(),
            snippet_window: default_snippet_window(),
            snippet_limit: default_snippet_limit(),
        }
    }
}

impl SearchConfig {
    pub fn source_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackConfig {
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    /// Requests above this budget are rejected
    #[serde(default = "default_max_tokens_cap")]
    pub max_tokens_cap: usize,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Tokens held back for the provenance footer
    #[serde(default = "default_footer_reserve")]
    pub footer_reserve: usize,

    /// Smallest remaining budget worth filling with a truncated segment
    #[serde(default = "default_min_fragment_tokens")]
    pub min_fragment_tokens: usize,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_max_tokens() -> usize {
    6000
}
fn default_max_tokens_cap() -> usize {
    16384
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_footer_reserve() -> usize {
    64
}
fn default_min_fragment_tokens() -> usize {
    20
}
fn default_fetch_timeout_ms() -> u64 {
    2000
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            max_tokens_cap: default_max_tokens_cap(),
            default_model: default_model(),
            footer_reserve: default_footer_reserve(),
            min_fragment_tokens: default_min_fragment_tokens(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl PackConfig {
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Per-model token counting overrides, applied on top of the built-in table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelTokenizerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTokenizerConfig {
    /// Character-ratio estimate for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chars_per_token: Option<f32>,

    /// A Hugging Face `tokenizer.json` giving exact counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.echogarden/config.toml).
    ///
    /// Environment variables override the file:
    /// - `ECHO_GARDEN_LOG_LEVEL`
    /// - `ECHO_GARDEN_SOURCE_TIMEOUT_MS`
    /// - `ECHO_GARDEN_DEFAULT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::default_path())
    }

    /// `~/.echogarden/config.toml`.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(level) = lookup("ECHO_GARDEN_LOG_LEVEL") {
            self.log.level = level;
        }

        if let Some(raw) = lookup("ECHO_GARDEN_SOURCE_TIMEOUT_MS") {
            self.search.source_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "ECHO_GARDEN_SOURCE_TIMEOUT_MS must be an integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(model) = lookup("ECHO_GARDEN_DEFAULT_MODEL") {
            self.pack.default_model = model;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".echogarden")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.search;
        let weights_valid = [s.lexical_weight, s.vector_weight]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0);
        if !weights_valid {
            return Err(ConfigError::ValidationError(
                "search weights must be finite and non-negative".into(),
            ));
        }
        if s.lexical_weight + s.vector_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "lexical_weight + vector_weight must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&s.mmr_lambda) {
            return Err(ConfigError::ValidationError(
                "mmr_lambda must be between 0.0 and 1.0".into(),
            ));
        }
        if s.max_k == 0 || s.fetch_multiplier == 0 || s.mmr_pool_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "max_k, fetch_multiplier and mmr_pool_multiplier must be >= 1".into(),
            ));
        }
        if s.source_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "source_timeout_ms must be >= 1".into(),
            ));
        }

        let p = &self.pack;
        if p.default_max_tokens == 0 || p.default_max_tokens > p.max_tokens_cap {
            return Err(ConfigError::ValidationError(format!(
                "default_max_tokens must be between 1 and max_tokens_cap ({})",
                p.max_tokens_cap
            )));
        }
        if p.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }

        for (model, entry) in &self.tokenizer.models {
            if let Some(ratio) = entry.chars_per_token
                && !(ratio.is_finite() && ratio > 0.0)
            {
                return Err(ConfigError::ValidationError(format!(
                    "tokenizer.models.{model}.chars_per_token must be > 0"
                )));
            }
        }

        Ok(())
    }

    /// Generate the default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_path_lives_in_config_dir() {
        let path = EngineConfig::default_path();
        assert!(path.starts_with(EngineConfig::config_dir()));
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.lexical_weight, 0.4);
        assert_eq!(config.search.vector_weight, 0.6);
        assert_eq!(config.search.mmr_lambda, 0.7);
        assert_eq!(config.pack.footer_reserve, 64);
        assert_eq!(config.pack.default_model, "gpt-4");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [search]
            lexical_weight = 0.5
            vector_weight = 0.5

            [tokenizer.models."my-model"]
            chars_per_token = 3.2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.search.lexical_weight, 0.5);
        assert_eq!(parsed.search.max_k, 200);
        assert_eq!(parsed.pack.max_tokens_cap, 16384);
        assert_eq!(
            parsed.tokenizer.models["my-model"].chars_per_token,
            Some(3.2)
        );
    }

    #[test]
    fn zero_weights_rejected() {
        let mut config = EngineConfig::default();
        config.search.lexical_weight = 0.0;
        config.search.vector_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn lambda_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.search.mmr_lambda = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mmr_lambda"));
    }

    #[test]
    fn default_budget_above_cap_rejected() {
        let mut config = EngineConfig::default();
        config.pack.default_max_tokens = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_chars_per_token_rejected() {
        let mut config = EngineConfig::default();
        config.tokenizer.models.insert(
            "odd".into(),
            ModelTokenizerConfig {
                chars_per_token: Some(0.0),
                tokenizer_file: None,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nmax_k = \"lots\"\n").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn file_values_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nsource_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("ECHO_GARDEN_LOG_LEVEL", "debug"),
            ("ECHO_GARDEN_SOURCE_TIMEOUT_MS", "500"),
            ("ECHO_GARDEN_DEFAULT_MODEL", "claude-3-5-sonnet"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.search.source_timeout_ms, 500);
        assert_eq!(config.pack.default_model, "claude-3-5-sonnet");
    }

    #[test]
    fn non_numeric_timeout_override_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|name| {
                (name == "ECHO_GARDEN_SOURCE_TIMEOUT_MS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = EngineConfig::default_toml();
        assert!(toml_str.contains("lexical_weight"));
        assert!(toml_str.contains("footer_reserve"));
    }
}
