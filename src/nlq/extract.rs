//! Pull a Cypher candidate out of free-form LLM output

use regex::Regex;
use std::sync::LazyLock;

/// Keywords that can open a read query
const QUERY_LEADING_KEYWORDS: [&str; 6] = ["MATCH", "RETURN", "OPTIONAL", "WITH", "UNWIND", "CALL"];

static RE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

/// Extract a candidate query from LLM output.
///
/// In order: the interior of the first fenced block (an empty block yields
/// `None`); else everything from the first line starting with a query keyword;
/// else the whole trimmed text. Prose therefore passes through as a candidate
/// and is left to the safety gate and the store to reject.
pub fn extract_query(raw: &str) -> Option<String> {
    let text = raw.trim();

    if let Some(caps) = RE_FENCE.captures(text) {
        let inner = caps.get(1).map(|m| strip_language_tag(m.as_str()).trim()).unwrap_or("");
        return if inner.is_empty() { None } else { Some(inner.to_string()) };
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(start) = lines.iter().position(|line| starts_with_query_keyword(line)) {
        return Some(lines[start..].join("\n").trim().to_string());
    }

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Drop a language tag from a fence interior.
///
/// A tag is a lone word on the opening line, or `cypher` followed by
/// whitespace. Query keywords are never tags, so a block opening with a bare
/// `MATCH` line keeps it.
fn strip_language_tag(body: &str) -> &str {
    if let Some((first, rest)) = body.split_once('\n') {
        if is_language_tag(first.trim()) {
            return rest;
        }
    }

    let trimmed = body.trim_start();
    match (trimmed.get(..6), trimmed.get(6..)) {
        (Some(tag), Some(rest)) if tag.eq_ignore_ascii_case("cypher") && rest.starts_with(char::is_whitespace) => rest,
        _ => body,
    }
}

fn is_language_tag(word: &str) -> bool {
    !word.is_empty()
        && word.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
        && !QUERY_LEADING_KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

fn starts_with_query_keyword(line: &str) -> bool {
    let upper = line.trim().to_uppercase();
    QUERY_LEADING_KEYWORDS.iter().any(|kw| upper.starts_with(kw))
}
