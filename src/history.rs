//! `sift history` subcommands over the file-backed search history.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use record_sift_core::history::SearchHistoryItem;

use crate::config::Config;
use crate::search::open_engine;

pub fn list_history(config: &Config) -> Result<()> {
    let engine = open_engine(config);
    let history = engine.history();
    if history.is_empty() {
        println!("No search history.");
        return Ok(());
    }

    for item in history {
        println!("{}", describe(item));
    }
    Ok(())
}

pub fn remove_history(config: &Config, id: &str) -> Result<()> {
    let mut engine = open_engine(config);
    if !engine.remove_from_history(id) {
        bail!("no history entry with id: {}", id);
    }
    println!("Removed {}.", id);
    Ok(())
}

pub fn clear_history(config: &Config) -> Result<()> {
    let mut engine = open_engine(config);
    engine.clear_history();
    println!("Search history cleared.");
    Ok(())
}

fn describe(item: &SearchHistoryItem) -> String {
    let when = DateTime::<Utc>::from_timestamp_millis(item.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| item.timestamp.to_string());
    let query = if item.query.is_empty() {
        "(filters only)"
    } else {
        item.query.as_str()
    };
    let mut line = format!(
        "{}  {}  {} results  {}",
        item.id, query, item.result_count, when
    );
    if !item.filters.is_empty() {
        let filters: Vec<String> = item
            .filters
            .iter()
            .map(|f| match &f.value {
                Some(_) => format!("{} {} {}", f.field, f.operator, f.display_value()),
                None => format!("{} {}", f.field, f.operator),
            })
            .collect();
        line.push_str(&format!("  [{}]", filters.join("; ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_sift_core::filter::{Operator, SearchFilter};
    use serde_json::json;

    #[test]
    fn test_describe() {
        let mut item = SearchHistoryItem::new(
            "alice",
            vec![
                SearchFilter::new("status", Operator::In, json!(["active", "new"])),
                SearchFilter::unbound("name", Operator::Contains),
            ],
            2,
        );
        item.id = "abc".to_string();
        item.timestamp = 0;
        assert_eq!(
            describe(&item),
            "abc  alice  2 results  1970-01-01 00:00:00  [status in active, new; name contains]"
        );
    }
}
