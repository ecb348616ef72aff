//! Free-text matching over a record's string fields.

use serde_json::Value;

use crate::field::{as_text, resolve};

/// Case-insensitive substring matcher.
///
/// Lowercasing is Unicode-aware and locale-agnostic, so CJK and other
/// non-ASCII content match the same way ASCII does.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchMatcher;

impl SearchMatcher {
    pub fn new() -> Self {
        Self
    }

    /// True if any of `fields` contains `query`.
    ///
    /// An empty or whitespace-only query matches everything. With no
    /// fields given, every string-valued top-level field and every
    /// string-valued field one level down is searched.
    pub fn matches(&self, record: &Value, query: &str, fields: &[&str]) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();

        if fields.is_empty() {
            return default_fields(record)
                .into_iter()
                .any(|text| text.to_lowercase().contains(&needle));
        }

        fields.iter().any(|field| {
            resolve(record, field)
                .and_then(as_text)
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        })
    }
}

fn default_fields(record: &Value) -> Vec<&str> {
    let mut out = Vec::new();
    if let Value::Object(map) = record {
        for value in map.values() {
            match value {
                Value::String(s) => out.push(s.as_str()),
                Value::Object(nested) => {
                    out.extend(nested.values().filter_map(Value::as_str));
                }
                _ => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_query_matches() {
        let m = SearchMatcher::new();
        assert!(m.matches(&json!({}), "", &[]));
        assert!(m.matches(&json!({"name": "x"}), "   ", &["name"]));
    }

    #[test]
    fn test_named_fields_or() {
        let m = SearchMatcher::new();
        let r = json!({"name": "Alice Johnson", "email": "ajo@example.com"});
        assert!(m.matches(&r, "ALICE", &["name"]));
        assert!(m.matches(&r, "example", &["name", "email"]));
        assert!(!m.matches(&r, "example", &["name"]));
    }

    #[test]
    fn test_default_fields_cover_one_nested_level() {
        let m = SearchMatcher::new();
        let r = json!({"id": 7, "profile": {"city": "Zürich", "deep": {"x": "hidden"}}});
        assert!(m.matches(&r, "zürich", &[]));
        assert!(!m.matches(&r, "hidden", &[]));
        // numbers are not string-valued
        assert!(!m.matches(&r, "7", &[]));
    }

    #[test]
    fn test_unicode_substring() {
        let m = SearchMatcher::new();
        assert!(m.matches(&json!({"name": "张三"}), "张", &["name"]));
        assert!(!m.matches(&json!({"name": "李四"}), "张", &["name"]));
    }

    #[test]
    fn test_null_field_does_not_match() {
        let m = SearchMatcher::new();
        assert!(!m.matches(&json!({"name": null}), "null", &["name"]));
    }
}
