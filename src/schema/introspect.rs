//! Build a [`SchemaSnapshot`] by querying the store

use crate::graph::{GraphSession, Params, Record, StoreResult};
use crate::schema::{RelationshipTriple, SchemaSnapshot};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label";

const NODE_TYPE_PROPERTIES_QUERY: &str =
    "CALL db.schema.nodeTypeProperties() YIELD nodeLabels, propertyName RETURN nodeLabels, propertyName";

const RELATIONSHIPS_QUERY: &str = "MATCH (a)-[r]->(b) \
     WITH labels(a)[0] AS fromLabel, type(r) AS relType, labels(b)[0] AS toLabel \
     RETURN DISTINCT fromLabel, relType, toLabel \
     ORDER BY fromLabel, relType, toLabel";

/// Introspect labels, properties and relationship triples.
///
/// Label or relationship listing failures abort. Property discovery uses the
/// bulk procedure when it answers with rows, and otherwise samples one node
/// per label; a label whose sample fails gets an empty property set.
pub async fn introspect(session: &mut dyn GraphSession) -> StoreResult<SchemaSnapshot> {
    let labels = list_labels(session).await?;
    let properties_by_label = node_properties(session, &labels).await;
    let relationships = relationship_triples(session).await?;

    debug!(
        "Introspected {} labels and {} relationship triples",
        labels.len(),
        relationships.len()
    );

    Ok(SchemaSnapshot {
        labels,
        properties_by_label,
        relationships,
    })
}

async fn list_labels(session: &mut dyn GraphSession) -> StoreResult<BTreeSet<String>> {
    let records = session.run(LABELS_QUERY, &Params::new()).await?;
    Ok(records
        .iter()
        .filter_map(|r| string_at(r, "label"))
        .collect())
}

async fn node_properties(
    session: &mut dyn GraphSession,
    labels: &BTreeSet<String>,
) -> BTreeMap<String, BTreeSet<String>> {
    match session.run(NODE_TYPE_PROPERTIES_QUERY, &Params::new()).await {
        Ok(records) if !records.is_empty() => return properties_from_type_rows(&records),
        Ok(_) => debug!("db.schema.nodeTypeProperties() returned nothing, sampling labels"),
        Err(e) => warn!("db.schema.nodeTypeProperties() unavailable ({}), sampling labels", e),
    }

    let mut out = BTreeMap::new();
    for label in labels {
        let query = format!(
            "MATCH (n:`{}`) RETURN keys(n) AS keys LIMIT 1",
            label.replace('`', "``")
        );
        let props = match session.run(&query, &Params::new()).await {
            Ok(records) => records
                .first()
                .and_then(|r| r.get("keys"))
                .and_then(Value::as_array)
                .map(|keys| keys.iter().map(value_to_name).collect())
                .unwrap_or_default(),
            Err(e) => {
                warn!("Sampling properties for label {} failed: {}", label, e);
                BTreeSet::new()
            }
        };
        out.insert(label.clone(), props);
    }
    out
}

/// Group `(nodeLabels, propertyName)` rows by the first label
fn properties_from_type_rows(records: &[Record]) -> BTreeMap<String, BTreeSet<String>> {
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        let label = match record.get("nodeLabels") {
            Some(Value::Array(labels)) => labels.first().and_then(Value::as_str),
            Some(Value::String(label)) => Some(label.as_str()),
            _ => None,
        };
        let prop = record.get("propertyName").and_then(Value::as_str);
        if let (Some(label), Some(prop)) = (label, prop) {
            out.entry(label.to_string()).or_default().insert(prop.to_string());
        }
    }
    out
}

async fn relationship_triples(session: &mut dyn GraphSession) -> StoreResult<Vec<RelationshipTriple>> {
    let records = session.run(RELATIONSHIPS_QUERY, &Params::new()).await?;
    let mut triples: Vec<RelationshipTriple> = records
        .iter()
        .filter_map(|r| {
            Some(RelationshipTriple::new(
                string_at(r, "fromLabel")?,
                string_at(r, "relType")?,
                string_at(r, "toLabel")?,
            ))
        })
        .collect();
    triples.sort();
    triples.dedup();
    Ok(triples)
}

fn string_at(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(Value::as_str).map(str::to_string)
}

fn value_to_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
