//! Graph schema snapshots and their prompt text
//!
//! A [`SchemaSnapshot`] summarises labels, per-label properties and
//! relationship triples at one point in time. Its rendered text is what the
//! LLM sees; it is cached on disk by [`SchemaCache`] and only refreshed by an
//! explicit regeneration, so it can go stale if the store changes.

pub mod cache;
pub mod introspect;

pub use cache::{SchemaCache, SchemaCacheError};
pub use introspect::introspect;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// First line of every rendered schema
pub const SCHEMA_HEADER: &str = "Graph schema (Neo4j Cypher):";

/// A directed `(from)-[:rel_type]->(to)` pattern seen in the store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipTriple {
    pub from: String,
    pub rel_type: String,
    pub to: String,
}

impl RelationshipTriple {
    pub fn new(from: impl Into<String>, rel_type: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            rel_type: rel_type.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for RelationshipTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[:{}]->({})", self.from, self.rel_type, self.to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub labels: BTreeSet<String>,
    pub properties_by_label: BTreeMap<String, BTreeSet<String>>,
    pub relationships: Vec<RelationshipTriple>,
}

impl SchemaSnapshot {
    pub fn render(&self) -> String {
        render_schema(&self.labels, &self.properties_by_label, &self.relationships)
    }
}

/// Render schema metadata as prompt text.
///
/// Labels are emitted in sorted order with their sorted property names.
/// Relationship triples keep the caller's order.
pub fn render_schema<L, P>(
    labels: L,
    properties_by_label: &BTreeMap<String, P>,
    relationships: &[RelationshipTriple],
) -> String
where
    L: IntoIterator,
    L::Item: AsRef<str>,
    for<'a> &'a P: IntoIterator<Item = &'a String>,
{
    let labels: BTreeSet<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();

    let nodes: Vec<String> = labels
        .iter()
        .map(|label| {
            let props: BTreeSet<&str> = properties_by_label
                .get(label)
                .map(|p| IntoIterator::into_iter(p).map(|s| s.as_str()).collect())
                .unwrap_or_default();
            if props.is_empty() {
                label.clone()
            } else {
                format!("{} ({})", label, props.into_iter().collect::<Vec<_>>().join(", "))
            }
        })
        .collect();

    let rels: Vec<String> = relationships.iter().map(|t| t.to_string()).collect();

    [
        SCHEMA_HEADER.to_string(),
        format!("- Nodes: {}", nodes.join(", ")),
        format!("- Relationships: {}", rels.join(", ")),
    ]
    .join("\n")
}
