use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "rag.toml";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an Insurance Agency Customer Care assistant. \
     Use only the provided context to answer. \
     If not found, say you don't have it and offer human support.";

// ──────────────────────────── TOML structure ────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimensions() -> u32 {
    1536
}
fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            max_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_pdftotext")]
    pub pdftotext_bin: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            pdftotext_bin: default_pdftotext(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_pdftotext() -> String {
    "pdftotext".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_source_path")]
    pub source_path: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_source_path() -> String {
    "data/knowledge.pdf".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}

// ──────────────────────────── Resolved Settings ────────────────────────────

/// Flat settings structure resolved from TOML + environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    // API
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,

    // OpenAI
    pub openai_api_key: String,
    pub openai_base_url: String,

    // Embedding
    pub embedding_model: String,
    pub vector_dimensions: u32,
    pub embedding_batch_size: usize,

    // Completion
    pub completion_model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub system_prompt: String,

    // Parser
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub pdftotext_bin: String,

    // Retrieval
    pub top_k: usize,

    // Storage
    pub source_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Resolve the config file path from `RAG_CONFIG`, falling back to `rag.toml`.
pub fn config_path_from_env() -> PathBuf {
    std::env::var("RAG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load settings from a TOML path and the environment. A missing file means
/// every section takes its defaults.
pub fn load_settings_from_path(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
    // Load .env if present (ignore errors)
    let _ = dotenvy::dotenv();

    let path = path.as_ref();
    let config: TomlConfig = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        TomlConfig::default()
    };

    resolve(config)
}

fn resolve(config: TomlConfig) -> anyhow::Result<Settings> {
    let openai_api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable is required"))?;

    let openai_base_url = std::env::var("OPENAI_BASE_URL")
        .ok()
        .or(config.openai.base_url)
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    // ALLOWED_ORIGINS overrides the file.
    let allowed_origins = match std::env::var("ALLOWED_ORIGINS") {
        Ok(raw) => parse_origins(&raw),
        Err(_) => config
            .api
            .allowed_origins
            .unwrap_or_else(|| parse_origins(DEFAULT_ALLOWED_ORIGINS)),
    };

    if config.parser.chunk_size == 0 {
        anyhow::bail!("parser.chunk_size must be greater than zero");
    }
    if config.parser.chunk_overlap >= config.parser.chunk_size {
        anyhow::bail!(
            "parser.chunk_overlap ({}) must be smaller than parser.chunk_size ({})",
            config.parser.chunk_overlap,
            config.parser.chunk_size
        );
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be greater than zero");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be greater than zero");
    }

    Ok(Settings {
        host: config.api.host,
        port: config.api.port,
        allowed_origins,
        openai_api_key,
        openai_base_url,
        embedding_model: config.embedding.model,
        vector_dimensions: config.embedding.dimensions,
        embedding_batch_size: config.embedding.batch_size,
        completion_model: config.completion.model,
        max_tokens: config.completion.max_tokens,
        temperature: config.completion.temperature,
        system_prompt: config
            .completion
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        chunk_size: config.parser.chunk_size,
        chunk_overlap: config.parser.chunk_overlap,
        pdftotext_bin: config.parser.pdftotext_bin,
        top_k: config.retrieval.top_k,
        source_path: PathBuf::from(config.storage.source_path),
        data_dir: PathBuf::from(config.storage.data_dir),
    })
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}
