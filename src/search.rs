//! `sift search` and `sift suggest`.
//!
//! Both commands load the records file named by `[data].path`, build a
//! [`SearchEngine`] over the file-backed history, and print to stdout.

use anyhow::{bail, Context, Result};
use record_sift_core::engine::SearchEngine;
use record_sift_core::filter::{Operator, SearchFilter};
use record_sift_core::store::KeyValueStore;
use serde_json::Value;

use crate::config::Config;
use crate::file_store::JsonFileStore;
use crate::records::{InMemoryRecords, RecordRepository};

/// Engine over the history file configured in `[history].path`.
pub fn open_engine(config: &Config) -> SearchEngine<JsonFileStore> {
    SearchEngine::new(
        JsonFileStore::new(&config.history.path),
        config.search.clone(),
    )
}

/// Parse `field:operator[:value]`.
///
/// The value is read as JSON when it parses (`30`, `["a","b"]`, `true`),
/// otherwise as a plain string. Omitting it yields an unbound filter that
/// takes its operand from the query.
pub fn parse_filter(spec: &str) -> Result<SearchFilter> {
    let mut parts = spec.splitn(3, ':');
    let field = parts.next().unwrap_or_default().trim();
    let Some(operator) = parts.next() else {
        bail!("invalid filter '{}': expected field:operator[:value]", spec);
    };
    if field.is_empty() {
        bail!("invalid filter '{}': field must not be empty", spec);
    }
    let operator: Operator = operator
        .trim()
        .parse()
        .with_context(|| format!("invalid filter '{}'", spec))?;

    let filter = match parts.next() {
        Some(raw) => {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            SearchFilter::new(field, operator, value)
        }
        None => SearchFilter::unbound(field, operator),
    };
    filter.validate()?;
    Ok(filter)
}

async fn load_records(config: &Config) -> Result<Vec<Value>> {
    InMemoryRecords::load(&config.data.path, config.data.id_field.clone())
        .await?
        .all()
        .await
}

pub async fn run_search(
    config: &Config,
    query: &str,
    filter_specs: &[String],
    record_history: bool,
    highlight: bool,
) -> Result<()> {
    let filters = filter_specs
        .iter()
        .map(|s| parse_filter(s))
        .collect::<Result<Vec<_>>>()?;
    let records = load_records(config).await?;
    let mut engine = open_engine(config);

    let results = if record_history {
        engine.search_and_record(&records, query, &filters)?
    } else {
        engine.search(&records, query, &filters)?
    };

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{} of {} records matched", results.len(), records.len());
    let term = query.trim();
    for record in results {
        let line = if highlight && !term.is_empty() {
            serde_json::to_string(&highlight_record(&engine, record, term))?
        } else {
            serde_json::to_string(record)?
        };
        println!("{}", line);
    }
    Ok(())
}

pub async fn run_suggest(config: &Config, query: &str, field: &str) -> Result<()> {
    let records = load_records(config).await?;
    let engine = open_engine(config);
    let suggestions = engine.suggestions(&records, query, field)?;

    if suggestions.is_empty() {
        println!("No suggestions.");
    }
    for suggestion in suggestions {
        println!("{}", suggestion);
    }
    Ok(())
}

/// Copy of `record` with every string value highlighted.
pub fn highlight_record<S: KeyValueStore>(
    engine: &SearchEngine<S>,
    record: &Value,
    term: &str,
) -> Value {
    match record {
        Value::String(s) => Value::String(engine.highlight(s, term)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| highlight_record(engine, v, term))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), highlight_record(engine, v, term)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_sift_core::engine::SearchOptions;
    use record_sift_core::store::memory::InMemoryKeyValueStore;
    use serde_json::json;

    #[test]
    fn test_parse_bound_filters() {
        let f = parse_filter("age:greaterThan:30").unwrap();
        assert_eq!(f.field, "age");
        assert_eq!(f.operator, Operator::GreaterThan);
        assert_eq!(f.value, Some(json!(30)));

        let f = parse_filter("status:in:[\"active\",\"new\"]").unwrap();
        assert_eq!(f.value, Some(json!(["active", "new"])));

        let f = parse_filter("name:contains:Alice Johnson").unwrap();
        assert_eq!(f.value, Some(json!("Alice Johnson")));

        // only the first two colons split
        let f = parse_filter("createdAt:lessThan:2024-01-01T10:00").unwrap();
        assert_eq!(f.value, Some(json!("2024-01-01T10:00")));
    }

    #[test]
    fn test_parse_unbound_filter() {
        let f = parse_filter("profile.name:contains").unwrap();
        assert_eq!(f.field, "profile.name");
        assert!(!f.is_bound());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_filter("age").is_err());
        assert!(parse_filter(":equals:1").is_err());
        let err = parse_filter("age:bigger:1").unwrap_err();
        assert!(format!("{:#}", err).contains("unknown filter operator"));
        assert!(parse_filter("age:between:5").is_err());
    }

    #[test]
    fn test_highlight_record_walks_strings() {
        let engine = SearchEngine::new(InMemoryKeyValueStore::new(), SearchOptions::default());
        let out = highlight_record(
            &engine,
            &json!({"name": "Alice", "age": 30, "tags": ["alice-team"], "p": {"nick": "ALICE"}}),
            "alice",
        );
        assert_eq!(
            out,
            json!({
                "name": "<mark>Alice</mark>",
                "age": 30,
                "tags": ["<mark>alice</mark>-team"],
                "p": {"nick": "<mark>ALICE</mark>"}
            })
        );
    }
}
