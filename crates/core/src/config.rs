use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capacity::{max_capacity_from_policy_text, CapacityGranularity, CapacityPolicy};
use crate::domain::time_slot::TimeSlot;
use crate::retrieval::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::retrieval::embedder::DEFAULT_HASHING_DIMENSION;
use crate::retrieval::{ChunkingConfig, SourceDocument, DEFAULT_EMBED_BATCH_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "maitre.toml";
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub capacity: CapacityConfig,
    pub reservations: ReservationsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBaseConfig {
    pub documents_dir: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Clone, Debug)]
pub struct CapacityConfig {
    /// Explicit limit; when unset the policy document (then the static default) decides.
    pub max_capacity: Option<u32>,
    pub granularity: CapacityGranularity,
    pub policy_document: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ReservationsConfig {
    pub service_slots: Vec<TimeSlot>,
    pub default_slot: TimeSlot,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Chat sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// `open_ai` covers any OpenAI-compatible chat completions endpoint, Groq included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai", alias = "groq")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hashing,
    Ollama,
    #[serde(alias = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub embedding_provider: Option<EmbeddingProvider>,
    pub documents_dir: Option<PathBuf>,
    pub max_capacity: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://maitre.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Hashing,
                model: "all-minilm".to_string(),
                base_url: None,
                api_key: None,
                dimension: DEFAULT_HASHING_DIMENSION,
                batch_size: DEFAULT_EMBED_BATCH_SIZE,
            },
            knowledge_base: KnowledgeBaseConfig {
                documents_dir: PathBuf::from("knowledge_base"),
                top_k: DEFAULT_TOP_K,
                chunk_size: DEFAULT_CHUNK_SIZE,
                chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            },
            capacity: CapacityConfig {
                max_capacity: None,
                granularity: CapacityGranularity::PerSlot,
                policy_document: None,
            },
            reservations: ReservationsConfig {
                service_slots: (17..=21).map(TimeSlot::on_the_hour).collect(),
                default_slot: TimeSlot::on_the_hour(19),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                session_idle_secs: 1800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "groq" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|groq|ollama)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "open_ai",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported embedding provider `{other}` (expected hashing|ollama|openai)"
            ))),
        }
    }
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::Ollama => "ollama",
            Self::OpenAi => "open_ai",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn chunking(&self) -> Result<ChunkingConfig, ConfigError> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
            .map_err(|error| ConfigError::Validation(format!("knowledge_base: {error}")))
    }
}

impl CapacityConfig {
    /// Resolves the effective policy, reading the policy document when no explicit limit is set.
    pub fn resolve_policy(&self) -> Result<CapacityPolicy, ConfigError> {
        if self.max_capacity.is_some() {
            return Ok(CapacityPolicy::resolve(self.max_capacity, None, self.granularity));
        }

        let policy_text = match &self.policy_document {
            Some(path) => Some(
                fs::read_to_string(path)
                    .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?,
            ),
            None => None,
        };
        Ok(CapacityPolicy::resolve(None, policy_text.as_deref(), self.granularity))
    }

    /// Like [`Self::resolve_policy`], but with neither a limit nor a policy file configured the
    /// knowledge base documents are scanned for `Max Capacity: N`.
    pub fn resolve_policy_with_documents(
        &self,
        documents: &[SourceDocument],
    ) -> Result<CapacityPolicy, ConfigError> {
        if self.max_capacity.is_some() || self.policy_document.is_some() {
            return self.resolve_policy();
        }

        let from_documents =
            documents.iter().find_map(|document| max_capacity_from_policy_text(&document.text));
        Ok(CapacityPolicy::resolve(from_documents, None, self.granularity))
    }
}

impl ReservationsConfig {
    pub fn is_service_slot(&self, slot: TimeSlot) -> bool {
        self.service_slots.contains(&slot)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(provider) = embedding.provider {
                self.embedding.provider = provider;
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = Some(base_url);
            }
            if let Some(embedding_api_key_value) = embedding.api_key {
                self.embedding.api_key = Some(secret_value(embedding_api_key_value));
            }
            if let Some(dimension) = embedding.dimension {
                self.embedding.dimension = dimension;
            }
            if let Some(batch_size) = embedding.batch_size {
                self.embedding.batch_size = batch_size;
            }
        }

        if let Some(knowledge_base) = patch.knowledge_base {
            if let Some(documents_dir) = knowledge_base.documents_dir {
                self.knowledge_base.documents_dir = documents_dir;
            }
            if let Some(top_k) = knowledge_base.top_k {
                self.knowledge_base.top_k = top_k;
            }
            if let Some(chunk_size) = knowledge_base.chunk_size {
                self.knowledge_base.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = knowledge_base.chunk_overlap {
                self.knowledge_base.chunk_overlap = chunk_overlap;
            }
        }

        if let Some(capacity) = patch.capacity {
            if let Some(max_capacity) = capacity.max_capacity {
                self.capacity.max_capacity = Some(max_capacity);
            }
            if let Some(granularity) = capacity.granularity {
                self.capacity.granularity = granularity;
            }
            if let Some(policy_document) = capacity.policy_document {
                self.capacity.policy_document = Some(policy_document);
            }
        }

        if let Some(reservations) = patch.reservations {
            if let Some(service_slots) = reservations.service_slots {
                self.reservations.service_slots = service_slots;
            }
            if let Some(default_slot) = reservations.default_slot {
                self.reservations.default_slot = default_slot;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MAITRE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MAITRE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("MAITRE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MAITRE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MAITRE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAITRE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MAITRE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MAITRE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MAITRE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MAITRE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MAITRE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MAITRE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("MAITRE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("MAITRE_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(value) = read_env("MAITRE_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("MAITRE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = read_env("MAITRE_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MAITRE_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_usize("MAITRE_EMBEDDING_DIMENSION", &value)?;
        }
        if let Some(value) = read_env("MAITRE_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = parse_usize("MAITRE_EMBEDDING_BATCH_SIZE", &value)?;
        }

        if let Some(value) = read_env("MAITRE_KNOWLEDGE_BASE_DOCUMENTS_DIR") {
            self.knowledge_base.documents_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("MAITRE_KNOWLEDGE_BASE_TOP_K") {
            self.knowledge_base.top_k = parse_usize("MAITRE_KNOWLEDGE_BASE_TOP_K", &value)?;
        }
        if let Some(value) = read_env("MAITRE_KNOWLEDGE_BASE_CHUNK_SIZE") {
            self.knowledge_base.chunk_size =
                parse_usize("MAITRE_KNOWLEDGE_BASE_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = read_env("MAITRE_KNOWLEDGE_BASE_CHUNK_OVERLAP") {
            self.knowledge_base.chunk_overlap =
                parse_usize("MAITRE_KNOWLEDGE_BASE_CHUNK_OVERLAP", &value)?;
        }

        if let Some(value) = read_env("MAITRE_CAPACITY_MAX_CAPACITY") {
            self.capacity.max_capacity = Some(parse_u32("MAITRE_CAPACITY_MAX_CAPACITY", &value)?);
        }
        if let Some(value) = read_env("MAITRE_CAPACITY_GRANULARITY") {
            self.capacity.granularity = CapacityGranularity::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "MAITRE_CAPACITY_GRANULARITY".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("MAITRE_CAPACITY_POLICY_DOCUMENT") {
            self.capacity.policy_document = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("MAITRE_RESERVATIONS_SERVICE_SLOTS") {
            self.reservations.service_slots = value
                .split(',')
                .map(|raw| parse_slot("MAITRE_RESERVATIONS_SERVICE_SLOTS", raw))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = read_env("MAITRE_RESERVATIONS_DEFAULT_SLOT") {
            self.reservations.default_slot = parse_slot("MAITRE_RESERVATIONS_DEFAULT_SLOT", &value)?;
        }

        if let Some(value) = read_env("MAITRE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MAITRE_SERVER_PORT") {
            self.server.port = parse_u16("MAITRE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MAITRE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MAITRE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("MAITRE_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = parse_u64("MAITRE_SERVER_SESSION_IDLE_SECS", &value)?;
        }

        let log_level = read_env("MAITRE_LOGGING_LEVEL").or_else(|| read_env("MAITRE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MAITRE_LOGGING_FORMAT").or_else(|| read_env("MAITRE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(embedding_provider) = overrides.embedding_provider {
            self.embedding.provider = embedding_provider;
        }
        if let Some(documents_dir) = overrides.documents_dir {
            self.knowledge_base.documents_dir = documents_dir;
        }
        if let Some(max_capacity) = overrides.max_capacity {
            self.capacity.max_capacity = Some(max_capacity);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_embedding(&self.embedding)?;
        validate_knowledge_base(&self.knowledge_base)?;
        validate_capacity(&self.capacity)?;
        validate_reservations(&self.reservations)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn missing_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn missing_text(value: Option<&String>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            if missing_secret(llm.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai-compatible providers (set MAITRE_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if missing_text(llm.base_url.as_ref()) {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if embedding.batch_size == 0 {
        return Err(ConfigError::Validation(
            "embedding.batch_size must be greater than zero".to_string(),
        ));
    }

    match embedding.provider {
        EmbeddingProvider::Hashing => {
            if embedding.dimension == 0 {
                return Err(ConfigError::Validation(
                    "embedding.dimension must be greater than zero".to_string(),
                ));
            }
        }
        EmbeddingProvider::Ollama => {
            if missing_text(embedding.base_url.as_ref()) {
                return Err(ConfigError::Validation(
                    "embedding.base_url is required for ollama embeddings".to_string(),
                ));
            }
        }
        EmbeddingProvider::OpenAi => {
            if missing_secret(embedding.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "embedding.api_key is required for openai embeddings".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_knowledge_base(knowledge_base: &KnowledgeBaseConfig) -> Result<(), ConfigError> {
    if knowledge_base.top_k == 0 {
        return Err(ConfigError::Validation(
            "knowledge_base.top_k must be greater than zero".to_string(),
        ));
    }

    knowledge_base.chunking().map(|_| ())
}

fn validate_capacity(capacity: &CapacityConfig) -> Result<(), ConfigError> {
    if capacity.max_capacity == Some(0) {
        return Err(ConfigError::Validation(
            "capacity.max_capacity must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_reservations(reservations: &ReservationsConfig) -> Result<(), ConfigError> {
    if reservations.service_slots.is_empty() {
        return Err(ConfigError::Validation(
            "reservations.service_slots must list at least one service time".to_string(),
        ));
    }

    if !reservations.is_service_slot(reservations.default_slot) {
        return Err(ConfigError::Validation(format!(
            "reservations.default_slot `{}` is not one of reservations.service_slots",
            reservations.default_slot
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "server.session_idle_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_slot(key: &str, value: &str) -> Result<TimeSlot, ConfigError> {
    TimeSlot::parse(value).ok_or_else(|| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    knowledge_base: Option<KnowledgeBasePatch>,
    capacity: Option<CapacityPatch>,
    reservations: Option<ReservationsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    provider: Option<EmbeddingProvider>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    dimension: Option<usize>,
    batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeBasePatch {
    documents_dir: Option<PathBuf>,
    top_k: Option<usize>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CapacityPatch {
    max_capacity: Option<u32>,
    granularity: Option<CapacityGranularity>,
    policy_document: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ReservationsPatch {
    service_slots: Option<Vec<TimeSlot>>,
    default_slot: Option<TimeSlot>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EmbeddingProvider, LlmProvider, LoadOptions,
        LogFormat,
    };
    use crate::capacity::{CapacityGranularity, DEFAULT_MAX_CAPACITY};
    use crate::domain::time_slot::TimeSlot;
    use crate::retrieval::SourceDocument;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.knowledge_base.top_k == 3, "default top_k should be 3")?;
        ensure(config.knowledge_base.chunk_size == 1000, "default chunk size should be 1000")?;
        ensure(config.knowledge_base.chunk_overlap == 200, "default overlap should be 200")?;
        ensure(
            config.capacity.granularity == CapacityGranularity::PerSlot,
            "default granularity should be per slot",
        )?;
        ensure(
            config.embedding.provider == EmbeddingProvider::Hashing,
            "default embedder should be the local hashing embedder",
        )?;
        ensure(
            config.reservations.is_service_slot(config.reservations.default_slot),
            "default slot should be a service slot",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_MAITRE_GROQ_KEY", "gsk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("maitre.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "groq"
api_key = "${TEST_MAITRE_GROQ_KEY}"
base_url = "https://api.groq.com/openai/v1"
model = "llama3-8b-8192"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "groq is openai-compatible")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "gsk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_MAITRE_GROQ_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_LOG_LEVEL", "warn");
        env::set_var("MAITRE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["MAITRE_LOG_LEVEL", "MAITRE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("MAITRE_CAPACITY_MAX_CAPACITY", "40");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("maitre.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[capacity]
max_capacity = 30
granularity = "per_day"

[reservations]
service_slots = ["6:00 PM", "7:30 PM"]
default_slot = "7:30pm"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.capacity.max_capacity == Some(40), "env capacity should beat the file")?;
            ensure(
                config.capacity.granularity == CapacityGranularity::PerDay,
                "file granularity should beat the default",
            )?;
            ensure(
                Some(config.reservations.default_slot) == TimeSlot::new(19, 30),
                "default slot should parse from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["MAITRE_DATABASE_URL", "MAITRE_CAPACITY_MAX_CAPACITY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["MAITRE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn default_slot_outside_service_slots_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_RESERVATIONS_SERVICE_SLOTS", "6pm, 7pm");
        env::set_var("MAITRE_RESERVATIONS_DEFAULT_SLOT", "9pm");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("default_slot")
            );
            ensure(rejected, "default slot must be one of the service slots")
        })();

        clear_vars(&["MAITRE_RESERVATIONS_SERVICE_SLOTS", "MAITRE_RESERVATIONS_DEFAULT_SLOT"]);
        result
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_KNOWLEDGE_BASE_CHUNK_SIZE", "100");
        env::set_var("MAITRE_KNOWLEDGE_BASE_CHUNK_OVERLAP", "100");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("knowledge_base")
            );
            ensure(rejected, "overlap equal to chunk size should be rejected")
        })();

        clear_vars(&["MAITRE_KNOWLEDGE_BASE_CHUNK_SIZE", "MAITRE_KNOWLEDGE_BASE_CHUNK_OVERLAP"]);
        result
    }

    #[test]
    fn policy_document_supplies_capacity_when_unset() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let policy = dir.path().join("policy.txt");
        fs::write(&policy, "House rules\nMax Capacity: 72\n").map_err(|err| err.to_string())?;

        let mut config = AppConfig::default();
        config.capacity.policy_document = Some(policy);
        let resolved = config.capacity.resolve_policy().map_err(|err| err.to_string())?;
        ensure(resolved.max_capacity == 72, "policy document capacity should be used")?;

        config.capacity.policy_document = None;
        let fallback = config.capacity.resolve_policy().map_err(|err| err.to_string())?;
        ensure(fallback.max_capacity == DEFAULT_MAX_CAPACITY, "default capacity should apply")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAITRE_LLM_PROVIDER", "openai");
        env::set_var("MAITRE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["MAITRE_LLM_PROVIDER", "MAITRE_LLM_API_KEY"]);
        result
    }

    #[test]
    fn documents_supply_capacity_only_when_nothing_is_configured() -> Result<(), String> {
        let documents = SourceDocument::from_texts(["Menu", "Seating policy\nMax Capacity: 80"]);
        let mut capacity = AppConfig::default().capacity;

        let from_documents =
            capacity.resolve_policy_with_documents(&documents).map_err(|err| err.to_string())?;
        ensure(from_documents.max_capacity == 80, "documents should supply the limit")?;

        capacity.max_capacity = Some(12);
        capacity.granularity = CapacityGranularity::PerDay;
        let explicit =
            capacity.resolve_policy_with_documents(&documents).map_err(|err| err.to_string())?;
        ensure(explicit.max_capacity == 12, "explicit limit should win over documents")?;
        ensure(explicit.granularity == CapacityGranularity::PerDay, "granularity should carry")
    }
}
