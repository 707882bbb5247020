//! Prompt text for Cypher generation

pub const SYSTEM_PROMPT: &str = "You are a Cypher expert. Given the graph schema and a question, reply with ONLY one Cypher READ query.
Use only MATCH, RETURN, WHERE, WITH, ORDER BY, LIMIT. No CREATE/MERGE/DELETE. No explanation.

Relationship direction is critical: (A)-[:REL]->(B) means A has the outgoing relationship to B. Always use the exact directions from the schema, do not reverse them.
Relationships are path patterns in MATCH, e.g. (a)-[:REL_TYPE]->(b). Do not use relationship types as properties (e.g. a.REL_TYPE = b is invalid).";

/// System prompt followed by the rendered schema
pub fn system_prompt_with_schema(base: &str, schema_text: &str) -> String {
    format!("{}\n\n{}", base.trim_end(), schema_text.trim())
}
