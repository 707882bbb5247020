//! Read-only gate for generated Cypher
//!
//! This is a plain substring denylist over the uppercased query, not a parser.
//! It rejects benign queries that mention a denylisted word anywhere (inside a
//! string literal, a comment, or a longer identifier such as `OFFSET` or
//! `ASSET`), and it does not catch mutations hidden behind procedure calls or
//! other obfuscation. Both are known limitations.

/// Keywords whose presence marks a query as mutating
pub const MUTATING_KEYWORDS: [&str; 6] = ["CREATE", "MERGE", "DELETE", "SET", "REMOVE", "DROP"];

/// First denylisted keyword found in the query, if any
pub fn find_mutating_keyword(query: &str) -> Option<&'static str> {
    let upper = query.to_uppercase();
    MUTATING_KEYWORDS.iter().copied().find(|kw| upper.contains(kw))
}

/// True when no denylisted keyword appears in the query
pub fn is_read_only(query: &str) -> bool {
    find_mutating_keyword(query).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_queries_pass() {
        assert!(is_read_only("MATCH (n) RETURN n"));
        assert!(is_read_only("MATCH (m:Movie)-[:HAS_GENRE]->(g:Genre) RETURN g.name, count(m) ORDER BY count(m) DESC LIMIT 5"));
    }

    #[test]
    fn test_mutations_rejected() {
        assert!(!is_read_only("MATCH (n) DELETE n"));
        assert!(!is_read_only("match (n) set n.x=1"));
        assert!(!is_read_only("CREATE (n:Evil) RETURN n"));
        assert_eq!(find_mutating_keyword("MATCH (n) DETACH DELETE n"), Some("DELETE"));
        assert_eq!(find_mutating_keyword("merge (p:Person {name: 'x'})"), Some("MERGE"));
        assert_eq!(find_mutating_keyword("MATCH (n) REMOVE n.age"), Some("REMOVE"));
        assert_eq!(find_mutating_keyword("DROP CONSTRAINT movie_id"), Some("DROP"));
    }

    #[test]
    fn test_known_false_positives() {
        // Denylisted words inside literals or longer words still trip the gate
        assert!(!is_read_only("MATCH (m:Movie) WHERE m.overview CONTAINS 'created' RETURN m"));
        assert!(!is_read_only("MATCH (a:Asset) RETURN a"));
    }
}
