//! Graphask
//!
//! Ask questions of a Neo4j property graph in plain language. Each question is
//! translated to a single read-only Cypher query by an LLM, checked against a
//! mutation denylist, executed, and returned together with the query.
//!
//! # Components
//!
//! - [`nlq::extract_query`]: pull a query out of free-form model output
//! - [`nlq::is_read_only`]: textual read-only gate
//! - [`schema`]: store introspection, schema rendering and the on-disk schema cache
//! - [`nlq::NLQPipeline`]: prompt, complete, extract, validate, execute, shape
//! - [`graph`]: the store collaborator traits and the Neo4j HTTP connector
//!
//! ## Example Usage
//!
//! ```rust
//! use graphask::schema::{render_schema, RelationshipTriple};
//! use std::collections::{BTreeMap, BTreeSet};
//!
//! let props: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
//! let rels = vec![RelationshipTriple::new("Movie", "HAS_GENRE", "Genre")];
//! let text = render_schema(["Movie", "Genre"], &props, &rels);
//! assert!(text.contains("(Movie)-[:HAS_GENRE]->(Genre)"));
//!
//! assert!(graphask::is_read_only("MATCH (n) RETURN n"));
//! assert!(!graphask::is_read_only("MATCH (n) DETACH DELETE n"));
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod nlq;
pub mod schema;

// Re-export main types for convenience
pub use config::{AppConfig, ConfigError, LLMProvider, NLQConfig, Neo4jConfig};

pub use graph::{
    GraphConnector, GraphSession, Neo4jConnector, Params, Record, Row, StoreError, StoreResult,
};

pub use nlq::{
    extract_query, find_mutating_keyword, is_read_only, AskError, AskResult, LlmClient, LlmError,
    LlmResult, NLQClient, NLQPipeline, QueryResult, SetupError, Stage,
};

pub use schema::{
    introspect, render_schema, RelationshipTriple, SchemaCache, SchemaCacheError, SchemaSnapshot,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.3.0");
    }
}
