use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Text-processing limits shared across components.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    /// Character cap applied to document content before it is sent to any
    /// provider. Longer documents are a known, accepted approximation.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Length of content previews returned to callers. Presentation
    /// contract only; stored content is never truncated.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    8000
}
fn default_preview_chars() -> usize {
    500
}

/// Analyzer settings: the generation provider used for the model-backed
/// sub-extractions, plus classification thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Documents with at most this many years of experience classify as
    /// junior.
    #[serde(default = "default_junior_max_years")]
    pub junior_max_years: u32,
    /// Documents with at least this many years of experience classify as
    /// senior.
    #[serde(default = "default_senior_min_years")]
    pub senior_min_years: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            summary_max_chars: default_summary_max_chars(),
            junior_max_years: default_junior_max_years(),
            senior_min_years: default_senior_min_years(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_summary_max_chars() -> usize {
    600
}
fn default_junior_max_years() -> u32 {
    2
}
fn default_senior_min_years() -> u32 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Version tag written with every embedding. Bumping it marks all
    /// stored embeddings stale for the next backfill.
    #[serde(default = "default_embedding_version")]
    pub version: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            version: default_embedding_version(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_version() -> String {
    "1".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight of the semantic channel in the combined score; the lexical
    /// channel gets `1 - semantic_weight`. Documents without a stored
    /// vector are scored lexical-only.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.6
}
fn default_final_limit() -> i64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// Number of top-ranked documents assembled into the context block.
    #[serde(default = "default_context_documents")]
    pub context_documents: usize,
    /// Per-document excerpt cap in the context block.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            context_documents: default_context_documents(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_context_documents() -> usize {
    6
}
fn default_excerpt_chars() -> usize {
    700
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.processing.max_chars == 0 {
        anyhow::bail!("processing.max_chars must be > 0");
    }
    if config.processing.preview_chars == 0 {
        anyhow::bail!("processing.preview_chars must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.semantic_weight) {
        anyhow::bail!("retrieval.semantic_weight must be in [0.0, 1.0]");
    }

    if config.answer.context_documents == 0 {
        anyhow::bail!("answer.context_documents must be >= 1");
    }

    if config.analysis.junior_max_years >= config.analysis.senior_min_years {
        anyhow::bail!("analysis.junior_max_years must be < analysis.senior_min_years");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.version.trim().is_empty() {
            anyhow::bail!("embedding.version must not be empty");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.analysis.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown analysis provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.analysis.is_enabled() && config.analysis.model.is_none() {
        anyhow::bail!(
            "analysis.model must be specified when provider is '{}'",
            config.analysis.provider
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse("[db]\npath = \"./data/dossier.sqlite\"\n").unwrap();
        assert_eq!(cfg.processing.max_chars, 8000);
        assert_eq!(cfg.processing.preview_chars, 500);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.analysis.is_enabled());
        assert_eq!(cfg.retrieval.final_limit, 12);
        assert_eq!(cfg.answer.context_documents, 6);
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"openai\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn semantic_weight_bounds_checked() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[retrieval]\nsemantic_weight = 1.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("semantic_weight"));
    }

    #[test]
    fn experience_thresholds_must_be_ordered() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[analysis]\njunior_max_years = 9\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("junior_max_years"));
    }
}
