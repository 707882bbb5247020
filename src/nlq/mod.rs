//! Natural Language Querying (NLQ)
//!
//! Translates a question into a read-only Cypher query with an LLM, gates it,
//! runs it and returns the rows.
//!
//! One question goes through these stages, each of which can fail terminally:
//!
//! `BuildingPrompt -> AwaitingCompletion -> Extracting -> Validating -> Executing -> Done`
//!
//! Nothing is retried. A query rejected by the read-only gate never reaches
//! the store.

pub mod client;
pub mod extract;
pub mod prompts;
pub mod safety;

pub use client::{LlmClient, NLQClient};
pub use extract::extract_query;
pub use safety::{find_mutating_keyword, is_read_only};

use crate::config::{AppConfig, ConfigError};
use crate::graph::{GraphConnector, Neo4jConnector, Params, Record, Row, StoreError};
use crate::schema::{SchemaCache, SchemaCacheError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Tracing target for the raw completion and validated query in verbose mode
pub const VERBOSE_TARGET: &str = "graphask::verbose";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    ApiError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Where a question is in the translation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildingPrompt,
    AwaitingCompletion,
    Extracting,
    Validating,
    Executing,
    Done,
}

#[derive(Error, Debug)]
pub enum AskError {
    #[error("Schema unavailable at {path}: {reason}")]
    SchemaUnavailable { path: PathBuf, reason: String },
    #[error("No Cypher found in LLM response")]
    NoQueryExtracted { raw: String },
    #[error("Only read-only Cypher is allowed (found {keyword}): {query}")]
    UnsafeQueryRejected { query: String, keyword: &'static str },
    #[error("Store failed to execute `{query}`: {source}")]
    StoreExecution {
        query: String,
        #[source]
        source: StoreError,
    },
    #[error("LLM invocation failed: {0}")]
    LlmInvocation(#[from] LlmError),
}

impl AskError {
    /// Stage the question failed in
    pub fn stage(&self) -> Stage {
        match self {
            AskError::SchemaUnavailable { .. } => Stage::BuildingPrompt,
            AskError::LlmInvocation(_) => Stage::AwaitingCompletion,
            AskError::NoQueryExtracted { .. } => Stage::Extracting,
            AskError::UnsafeQueryRejected { .. } => Stage::Validating,
            AskError::StoreExecution { .. } => Stage::Executing,
        }
    }

    /// The generated query, when the pipeline got far enough to have one
    pub fn query(&self) -> Option<&str> {
        match self {
            AskError::UnsafeQueryRejected { query, .. } | AskError::StoreExecution { query, .. } => {
                Some(query.as_str())
            }
            _ => None,
        }
    }

    /// True when rephrasing the question may help, false when the schema
    /// cache, the LLM or the store itself is the problem
    pub fn is_retryable_by_user(&self) -> bool {
        match self {
            AskError::NoQueryExtracted { .. } | AskError::UnsafeQueryRejected { .. } => true,
            AskError::StoreExecution { source, .. } => matches!(source, StoreError::Query { .. }),
            AskError::SchemaUnavailable { .. } | AskError::LlmInvocation(_) => false,
        }
    }
}

pub type AskResult<T> = Result<T, AskError>;

/// A validated query and the rows it produced, in store order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub results: Vec<Row>,
}

/// Errors while wiring a pipeline from configuration
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct NLQPipeline {
    llm: Arc<dyn LlmClient>,
    graph: Arc<dyn GraphConnector>,
    schema: SchemaCache,
    system_prompt: String,
    max_tokens: u32,
}

impl NLQPipeline {
    pub fn new(llm: Arc<dyn LlmClient>, graph: Arc<dyn GraphConnector>, schema: SchemaCache) -> Self {
        Self {
            llm,
            graph,
            schema,
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
            max_tokens: 512,
        }
    }

    /// Build the configured LLM client and Neo4j connector
    pub fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let llm = NLQClient::new(&config.nlq)?;
        let graph = Neo4jConnector::new(&config.neo4j)?;

        let mut pipeline = Self::new(Arc::new(llm), Arc::new(graph), SchemaCache::new(&config.schema_path))
            .with_max_tokens(config.nlq.max_tokens);
        if let Some(prompt) = &config.nlq.system_prompt {
            pipeline = pipeline.with_system_prompt(prompt.clone());
        }
        Ok(pipeline)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema
    }

    pub fn graph(&self) -> &dyn GraphConnector {
        self.graph.as_ref()
    }

    /// Answer a question using the cached schema text.
    ///
    /// Fails with [`AskError::SchemaUnavailable`] if the cache has not been
    /// generated; the store is never introspected here.
    pub async fn ask_graph(&self, question: &str, verbose: bool) -> AskResult<QueryResult> {
        let schema_text = self.schema.load().map_err(|e| AskError::SchemaUnavailable {
            path: self.schema.path().to_path_buf(),
            reason: match e {
                SchemaCacheError::Missing(_) => "file not found, regenerate the schema first".to_string(),
                other => other.to_string(),
            },
        })?;
        self.ask_with_schema(question, &schema_text, verbose).await
    }

    /// Answer a question against the given schema text
    pub async fn ask_with_schema(&self, question: &str, schema_text: &str, verbose: bool) -> AskResult<QueryResult> {
        debug!("{:?}: {}", Stage::BuildingPrompt, question);
        let system = prompts::system_prompt_with_schema(&self.system_prompt, schema_text);

        debug!("{:?}", Stage::AwaitingCompletion);
        let raw = self.llm.generate(&system, question.trim(), self.max_tokens).await?;
        if verbose {
            info!(target: VERBOSE_TARGET, "Raw completion: {}", raw);
        }

        debug!("{:?}", Stage::Extracting);
        let query = extract_query(&raw).ok_or(AskError::NoQueryExtracted { raw })?;

        debug!("{:?}: {}", Stage::Validating, query);
        ensure_read_only(&query)?;
        if verbose {
            info!(target: VERBOSE_TARGET, "Generated Cypher: {}", query);
        }

        self.execute_validated(query).await
    }

    /// Gate an operator-supplied query and, if it passes, execute it
    pub async fn run_read_only(&self, query: &str) -> AskResult<QueryResult> {
        ensure_read_only(query)?;
        self.execute_validated(query.to_string()).await
    }

    async fn execute_validated(&self, query: String) -> AskResult<QueryResult> {
        debug!("{:?}", Stage::Executing);
        let records = match self.execute(&query).await {
            Ok(records) => records,
            Err(source) => return Err(AskError::StoreExecution { query, source }),
        };

        debug!("{:?}: {} rows", Stage::Done, records.len());
        Ok(QueryResult {
            query,
            results: records.into_iter().map(Record::into_row).collect(),
        })
    }

    /// The session lives only for this call and is released on every path
    async fn execute(&self, query: &str) -> Result<Vec<Record>, StoreError> {
        let mut session = self.graph.session().await?;
        session.run(query, &Params::new()).await
    }
}

fn ensure_read_only(query: &str) -> AskResult<()> {
    match find_mutating_keyword(query) {
        Some(keyword) => Err(AskError::UnsafeQueryRejected {
            query: query.to_string(),
            keyword,
        }),
        None => Ok(()),
    }
}
