//! Configuration for the store, the LLM provider and the schema cache
//!
//! Loaded from a YAML file, from the environment, or both (environment wins).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// LLM Provider options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Groq,
    Ollama,
    Gemini,
    /// Offline provider that always answers with a fixed read query
    Mock,
}

impl LLMProvider {
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProvider::Ollama | LLMProvider::Mock)
    }

    /// Default API base URL when none is configured
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Groq => "https://api.groq.com/openai/v1",
            LLMProvider::Ollama => "http://localhost:11434",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LLMProvider::Mock => "",
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "groq" => Ok(LLMProvider::Groq),
            "ollama" => Ok(LLMProvider::Ollama),
            "gemini" => Ok(LLMProvider::Gemini),
            "mock" => Ok(LLMProvider::Mock),
            other => Err(ConfigError::Invalid {
                name: "LLM_PROVIDER",
                reason: format!("unknown provider '{}' (use openai, groq, ollama, gemini or mock)", other),
            }),
        }
    }
}

/// Configuration for NLQ features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NLQConfig {
    /// The LLM provider to use
    pub provider: LLMProvider,
    /// Model name (e.g., "llama-3.3-70b-versatile", "gpt-4o")
    pub model: String,
    /// API Key (not needed for Ollama or Mock)
    #[serde(default)]
    pub api_key: Option<String>,
    /// API Base URL, overrides the provider default
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Replaces the built-in Cypher system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Completion budget per question
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    512
}

/// Neo4j connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// HTTP endpoint, e.g. "http://localhost:7474"
    pub uri: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Upper bound on concurrently open sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_sessions() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub neo4j: Neo4jConfig,
    pub nlq: NLQConfig,
    /// Where the rendered schema text is cached
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("prompt_schema/graph_schema.txt")
}

impl AppConfig {
    /// Parse a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build the configuration from environment variables only
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reading from an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => LLMProvider::Groq,
        };

        let mut config = AppConfig {
            neo4j: Neo4jConfig {
                uri: require("NEO4J_URI")?,
                user: require("NEO4J_USER")?,
                password: require("NEO4J_PASSWORD")?,
                database: get("NEO4J_DB").unwrap_or_else(default_database),
                max_sessions: default_max_sessions(),
                timeout_secs: default_timeout_secs(),
            },
            nlq: NLQConfig {
                provider,
                model: get("LLM_MODEL").or_else(|| get("GROQ_MODEL")).unwrap_or_default(),
                api_key: get("LLM_API_KEY").or_else(|| get("GROQ_API_KEY")),
                api_base_url: get("LLM_API_BASE_URL"),
                system_prompt: None,
                max_tokens: default_max_tokens(),
            },
            schema_path: get("GRAPH_SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_schema_path),
        };
        if let Some(raw) = get("LLM_MAX_TOKENS") {
            config.nlq.max_tokens = parse_number("LLM_MAX_TOKENS", &raw)?;
        }
        Ok(config)
    }

    /// Let environment variables win over values read from a file
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEO4J_URI") {
            self.neo4j.uri = v;
        }
        if let Some(v) = get("NEO4J_USER") {
            self.neo4j.user = v;
        }
        if let Some(v) = get("NEO4J_PASSWORD") {
            self.neo4j.password = v;
        }
        if let Some(v) = get("NEO4J_DB") {
            self.neo4j.database = v;
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.nlq.provider = v.parse()?;
        }
        if let Some(v) = get("LLM_MODEL").or_else(|| get("GROQ_MODEL")) {
            self.nlq.model = v;
        }
        if let Some(v) = get("LLM_API_KEY").or_else(|| get("GROQ_API_KEY")) {
            self.nlq.api_key = Some(v);
        }
        if let Some(v) = get("LLM_API_BASE_URL") {
            self.nlq.api_base_url = Some(v);
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.nlq.max_tokens = parse_number("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("GRAPH_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.nlq.provider != LLMProvider::Mock && self.nlq.model.trim().is_empty() {
            return Err(ConfigError::Missing("LLM_MODEL"));
        }
        if self.nlq.provider.requires_api_key() && self.nlq.api_key.is_none() {
            return Err(ConfigError::Missing("LLM_API_KEY"));
        }
        if self.nlq.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                name: "max_tokens",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.neo4j.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                name: "max_sessions",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
