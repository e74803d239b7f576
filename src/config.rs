//! Loading, saving and resolving the application's configuration.
//!
//! The configuration is a small YAML document at `config_dir()/config.yaml`. Every key is
//! optional; a missing file or missing keys fall back to [`LlmCliConfig::default`]. API keys
//! are never stored here, they are read from the environment by [`api_key_for`].
//!
//! # Examples
//!
//! ```no_run
//! use llm_cli::config::load_config;
//!
//! let path = llm_cli::config_dir().unwrap().join("config.yaml");
//! let config = load_config(&path).unwrap();
//! println!("default provider: {}", config.provider);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::{error::Error, fmt, fs};

use tracing::*;

use crate::chunker::DEFAULT_CHUNK_SIZE;

/// A hosted chat provider.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "anthropic")]
    Anthropic,
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "deepseek")]
    DeepSeek,
    #[value(name = "gemini")]
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::DeepSeek,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-3-7-sonnet-20250219",
            ProviderKind::OpenAi => "o3-mini-2025-01-31",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Gemini => "gemini-2.0-flash",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for codebase indexing and retrieval.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding model identifier sent to the embeddings endpoint.
    pub embedding_model: String,

    /// Base URL of the OpenAI-compatible embeddings API.
    pub embedding_api_base: String,

    /// Chunk width in characters.
    pub chunk_size: usize,

    /// Chunks retrieved per user turn.
    pub top_k: usize,

    /// Embedding requests in flight while building an index.
    pub concurrency: usize,

    /// Retries for transient embedding failures.
    pub max_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_api_base: "https://api.openai.com/v1".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            top_k: 3,
            concurrency: 4,
            max_retries: 3,
        }
    }
}

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct LlmCliConfig {
    /// Provider used when `--provider` is not given.
    pub provider: ProviderKind,

    /// Model used for each provider when `--model` is not given.
    pub provider_defaults: BTreeMap<ProviderKind, String>,

    pub retrieval: RetrievalConfig,
}

impl Default for LlmCliConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            provider_defaults: ProviderKind::ALL
                .iter()
                .map(|p| (*p, p.default_model().to_string()))
                .collect(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// The provider/model pair a session will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub model: String,
    /// Whether the CLI overrides changed the stored defaults.
    pub changed: bool,
}

impl LlmCliConfig {
    /// Resolve the provider and model for this run.
    ///
    /// CLI values win over the configuration. When either is given, the resolved pair is
    /// written back into `self` as the new default so the caller can persist it.
    pub fn resolve_provider(
        &mut self,
        provider: Option<ProviderKind>,
        model: Option<String>,
    ) -> ProviderSelection {
        let overridden = provider.is_some() || model.is_some();
        let provider = provider.unwrap_or(self.provider);
        let model = model.unwrap_or_else(|| self.model_for(provider));

        let changed = overridden
            && (self.provider != provider
                || self.provider_defaults.get(&provider) != Some(&model));
        if changed {
            self.provider = provider;
            self.provider_defaults.insert(provider, model.clone());
        }

        ProviderSelection {
            provider,
            model,
            changed,
        }
    }

    /// Default model for `provider`, falling back to the built-in one.
    pub fn model_for(&self, provider: ProviderKind) -> String {
        self.provider_defaults
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }
}

/// Loads the configuration from a YAML file.
///
/// A missing or empty file yields the defaults.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(file: &Path) -> Result<LlmCliConfig, Box<dyn Error>> {
    if !file.exists() {
        debug!("No config at {}, using defaults", file.display());
        return Ok(LlmCliConfig::default());
    }
    let content = fs::read_to_string(file)?;
    if content.trim().is_empty() {
        return Ok(LlmCliConfig::default());
    }
    let config: LlmCliConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Writes the configuration as YAML, creating parent directories.
pub fn save_config(config: &LlmCliConfig, file: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, serde_yaml::to_string(config)?)?;
    info!("Saved config to {}", file.display());
    Ok(())
}

/// Read the API key for `provider` from the environment.
///
/// # Errors
/// Returns an error naming the variable when it is unset or empty.
pub fn api_key_for(provider: ProviderKind) -> Result<String, Box<dyn Error>> {
    api_key_from(provider, |name| std::env::var(name).ok())
}

fn api_key_from(
    provider: ProviderKind,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, Box<dyn Error>> {
    let name = provider.api_key_env();
    match lookup(name) {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(format!("{name} environment variable not set").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    #[test]
    fn test_load_config_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, LlmCliConfig::default());
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.retrieval.chunk_size, 1000);
    }

    #[test]
    fn test_load_config_partial_file_keeps_other_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
provider: gemini
retrieval:
  top_k: 5
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.concurrency, 4);
        assert_eq!(config.model_for(ProviderKind::Gemini), "gemini-2.0-flash");
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_config_unknown_provider() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "provider: mistral").unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");
        let mut config = LlmCliConfig::default();
        config.provider = ProviderKind::DeepSeek;
        config.retrieval.max_retries = 7;

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_resolve_provider_without_overrides_uses_defaults() {
        let mut config = LlmCliConfig::default();
        let selection = config.resolve_provider(None, None);
        assert_eq!(selection.provider, ProviderKind::Anthropic);
        assert_eq!(selection.model, "claude-3-7-sonnet-20250219");
        assert!(!selection.changed);
    }

    #[test]
    fn test_resolve_provider_override_becomes_default() {
        let mut config = LlmCliConfig::default();
        let selection = config.resolve_provider(Some(ProviderKind::OpenAi), Some("gpt-4o".into()));
        assert_eq!(selection.model, "gpt-4o");
        assert!(selection.changed);
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model_for(ProviderKind::OpenAi), "gpt-4o");

        let again = config.resolve_provider(Some(ProviderKind::OpenAi), None);
        assert_eq!(again.model, "gpt-4o");
        assert!(!again.changed);
    }

    #[test]
    fn test_api_key_lookup() {
        let key = api_key_from(ProviderKind::Gemini, |name| {
            (name == "GEMINI_API_KEY").then(|| "g-123".to_string())
        });
        assert_eq!(key.unwrap(), "g-123");

        let missing = api_key_from(ProviderKind::Anthropic, |_| None).unwrap_err();
        assert!(missing.to_string().contains("ANTHROPIC_API_KEY"));

        assert!(api_key_from(ProviderKind::OpenAi, |_| Some("  ".into())).is_err());
    }
}
