use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// Use the tokenizer-backed recursive splitter; the word-window
    /// fallback is used automatically whenever it fails.
    #[serde(default = "default_true")]
    pub use_advanced_chunking: bool,
    #[serde(default = "default_true")]
    pub preserve_code_blocks: bool,
    #[serde(default = "default_true")]
    pub preserve_markdown: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            use_advanced_chunking: true,
            preserve_code_blocks: true,
            preserve_markdown: true,
        }
    }
}

fn default_max_tokens() -> usize {
    300
}
fn default_overlap() -> usize {
    50
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Floor for page/file search results. Observed call sites in the
    /// product range 0.3-0.9; pick per use case, never infer one value.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Owners embedded concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, to stay under model-service rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestConfig {
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    #[serde(default = "default_confidence_cutoff")]
    pub confidence_cutoff: f32,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            max_suggestions: default_max_suggestions(),
            confidence_cutoff: default_confidence_cutoff(),
        }
    }
}

fn default_max_suggestions() -> usize {
    8
}
fn default_confidence_cutoff() -> f32 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Prior messages carried into the prompt for continuity.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Retrieved sources offered to the generation model.
    #[serde(default = "default_context_sources")]
    pub context_sources: usize,
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    /// RAG retrieval floor for workspace-mode questions.
    #[serde(default = "default_workspace_threshold")]
    pub workspace_threshold: f32,
    /// Lower floor for help mode; help text is curated and sparse.
    #[serde(default = "default_help_threshold")]
    pub help_threshold: f32,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            context_sources: default_context_sources(),
            max_citations: default_max_citations(),
            workspace_threshold: default_workspace_threshold(),
            help_threshold: default_help_threshold(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_history_limit() -> usize {
    6
}
fn default_context_sources() -> usize {
    5
}
fn default_max_citations() -> usize {
    3
}
fn default_workspace_threshold() -> f32 {
    0.3
}
fn default_help_threshold() -> f32 {
    0.2
}
fn default_title_max_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub embed_model: Option<String>,
    #[serde(default)]
    pub chat_model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            embed_model: None,
            chat_model: None,
            dims: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }

    if config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.suggest.confidence_cutoff) {
        anyhow::bail!("suggest.confidence_cutoff must be in [0.0, 1.0]");
    }

    for (name, value) in [
        ("chat.workspace_threshold", config.chat.workspace_threshold),
        ("chat.help_threshold", config.chat.help_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    if config.model.is_enabled() {
        if config.model.dims.is_none() || config.model.dims == Some(0) {
            anyhow::bail!(
                "model.dims must be > 0 when provider is '{}'",
                config.model.provider
            );
        }
        if config.model.embed_model.is_none() {
            anyhow::bail!(
                "model.embed_model must be specified when provider is '{}'",
                config.model.provider
            );
        }
    }

    match config.model.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
