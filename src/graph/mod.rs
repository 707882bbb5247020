//! Graph store collaborator
//!
//! The NLQ pipeline talks to the store only through [`GraphConnector`] and
//! [`GraphSession`]. A connector is long-lived and cheap to share; a session is
//! acquired per question and released when it is dropped.

pub mod neo4j;

pub use neo4j::Neo4jConnector;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error [{code}]: {message}")]
    Query { code: String, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Store request timed out")]
    Timeout,
    #[error("No store session available")]
    SessionsExhausted,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query parameters, passed to the store as a JSON object
pub type Params = serde_json::Map<String, Value>;

/// A result row as handed to callers: column name -> value, in column order
pub type Row = IndexMap<String, Value>;

/// A single record as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    /// Pair column names with values. Missing trailing values become null.
    pub fn new(columns: Vec<String>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Flatten into a plain ordered mapping
    pub fn into_row(self) -> Row {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// One unit of store access. Not shared across concurrent questions.
#[async_trait]
pub trait GraphSession: Send {
    /// Execute a Cypher statement and collect every record
    async fn run(&mut self, query: &str, params: &Params) -> StoreResult<Vec<Record>>;
}

/// Hands out sessions against a graph store
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn session(&self) -> StoreResult<Box<dyn GraphSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_into_row_preserves_column_order() {
        let record = Record::new(
            vec!["title".to_string(), "year".to_string(), "cast".to_string()],
            vec![json!("Heat"), json!(1995), json!(["Pacino", "De Niro"])],
        );
        assert_eq!(record.get("year"), Some(&json!(1995)));

        let row = record.into_row();
        let keys: Vec<&str> = row.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["title", "year", "cast"]);
        assert_eq!(row["cast"], json!(["Pacino", "De Niro"]));
    }

    #[test]
    fn test_record_pads_missing_values() {
        let record = Record::new(vec!["a".to_string(), "b".to_string()], vec![json!(1)]);
        assert_eq!(record.get("b"), Some(&Value::Null));
        assert_eq!(record.get("c"), None);
    }
}
