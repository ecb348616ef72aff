//! Search engine over in-memory record collections.
//!
//! The engine composes [`FilterEvaluator`] and [`SearchMatcher`] and owns
//! the search history. It has no I/O of its own: records are passed in by
//! the caller, history goes through a [`KeyValueStore`].
//!
//! # Search algorithm
//!
//! 1. Validate every filter's operand shape.
//! 2. Keep records passing every *bound* filter (AND).
//! 3. If the query is non-empty, keep records matching it (OR):
//!    - unbound `contains` filters name the text fields for the matcher,
//!    - other unbound filters are evaluated with the query as operand,
//!    - with no unbound filters, the matcher searches its default fields.
//!
//! Output preserves input order.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::debounce::Debouncer;
use crate::field::{as_text, resolve, to_value};
use crate::filter::{FilterEvaluator, Operator, SearchFilter};
use crate::highlight::{highlight, HighlightTags};
use crate::history::{
    ErrorCallback, SearchHistoryItem, SearchHistoryStore, DEFAULT_HISTORY_KEY,
    DEFAULT_MAX_HISTORY_ITEMS,
};
use crate::matcher::SearchMatcher;
use crate::store::KeyValueStore;
use crate::{Result, SearchError};

/// Maximum number of suggestions returned by [`SearchEngine::suggestions`].
pub const MAX_SUGGESTIONS: usize = 10;

/// Engine tuning, usually read from the `[search]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,
    #[serde(default = "default_history_key")]
    pub history_key: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub highlight: HighlightTags,
}

fn default_max_history_items() -> usize {
    DEFAULT_MAX_HISTORY_ITEMS
}
fn default_history_key() -> String {
    DEFAULT_HISTORY_KEY.to_string()
}
fn default_debounce_ms() -> u64 {
    300
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_history_items: default_max_history_items(),
            history_key: default_history_key(),
            debounce_ms: default_debounce_ms(),
            highlight: HighlightTags::default(),
        }
    }
}

pub struct SearchEngine<S> {
    options: SearchOptions,
    history: SearchHistoryStore<S>,
    evaluator: FilterEvaluator,
    matcher: SearchMatcher,
}

impl<S: KeyValueStore> SearchEngine<S> {
    /// Build an engine, loading existing history from `store`.
    pub fn new(store: S, options: SearchOptions) -> Self {
        Self::build(store, options, None)
    }

    /// Build an engine whose history reports persistence failures to `on_error`.
    pub fn with_error_callback(store: S, options: SearchOptions, on_error: ErrorCallback) -> Self {
        Self::build(store, options, Some(on_error))
    }

    fn build(store: S, options: SearchOptions, on_error: Option<ErrorCallback>) -> Self {
        let history = SearchHistoryStore::open(
            store,
            options.history_key.clone(),
            options.max_history_items,
            on_error,
        );
        Self {
            options,
            history,
            evaluator: FilterEvaluator::new(),
            matcher: SearchMatcher::new(),
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Records passing every filter, in input order.
    pub fn filter<'a, T: Serialize>(
        &self,
        records: &'a [T],
        filters: &[SearchFilter],
    ) -> Result<Vec<&'a T>> {
        self.search(records, "", filters)
    }

    /// Records passing every bound filter and matching `query`, in input order.
    pub fn search<'a, T: Serialize>(
        &self,
        records: &'a [T],
        query: &str,
        filters: &[SearchFilter],
    ) -> Result<Vec<&'a T>> {
        let query = query.trim();
        for filter in filters {
            filter.validate()?;
        }
        if query.is_empty() && filters.is_empty() {
            return Ok(records.iter().collect());
        }

        let (bound, unbound): (Vec<&SearchFilter>, Vec<&SearchFilter>) =
            filters.iter().partition(|f| f.is_bound());

        if !query.is_empty() {
            if let Some(f) = unbound.iter().find(|f| f.operator.takes_list()) {
                return Err(SearchError::configuration(format!(
                    "filter on '{}': {} needs an explicit value",
                    f.field, f.operator
                )));
            }
        }

        let phase = QueryPhase {
            query,
            operand: Value::String(query.to_string()),
            text_fields: unbound
                .iter()
                .filter(|f| f.operator == Operator::Contains)
                .map(|f| f.field.as_str())
                .collect(),
            scalar: unbound
                .iter()
                .filter(|f| f.operator != Operator::Contains)
                .copied()
                .collect(),
            any_unbound: !unbound.is_empty(),
        };

        let mut out = Vec::new();
        for record in records {
            let value = to_value(record)?;
            if !self.passes_all(&value, &bound)? {
                continue;
            }
            if !query.is_empty() && !self.matches_query(&value, &phase)? {
                continue;
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Run [`search`](Self::search) and record the search in history when
    /// it had a query or filters.
    pub fn search_and_record<'a, T: Serialize>(
        &mut self,
        records: &'a [T],
        query: &str,
        filters: &[SearchFilter],
    ) -> Result<Vec<&'a T>> {
        let results = self.search(records, query, filters)?;
        self.add_to_history(query, filters.to_vec(), results.len());
        Ok(results)
    }

    fn passes_all(&self, record: &Value, filters: &[&SearchFilter]) -> Result<bool> {
        for filter in filters {
            if !self.evaluator.evaluate(record, filter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_query(&self, record: &Value, phase: &QueryPhase<'_>) -> Result<bool> {
        if !phase.any_unbound {
            return Ok(self.matcher.matches(record, phase.query, &[]));
        }
        if !phase.text_fields.is_empty()
            && self.matcher.matches(record, phase.query, &phase.text_fields)
        {
            return Ok(true);
        }
        for filter in &phase.scalar {
            if self
                .evaluator
                .evaluate_with(record, &filter.field, filter.operator, &phase.operand)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Wrap occurrences of `term` in `text` with the configured markers.
    pub fn highlight(&self, text: &str, term: &str) -> String {
        highlight(text, term, &self.options.highlight)
    }

    /// Distinct values of `field` containing `query`, first seen first.
    pub fn suggestions<T: Serialize>(
        &self,
        records: &[T],
        query: &str,
        field: &str,
    ) -> Result<Vec<String>> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Ok(Vec::new());
        }
        let needle = query.to_lowercase();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for record in records {
            let value = to_value(record)?;
            let Some(text) = resolve(&value, field).and_then(as_text) else {
                continue;
            };
            if text.to_lowercase().contains(&needle) && seen.insert(text.clone()) {
                out.push(text);
                if out.len() == MAX_SUGGESTIONS {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// A debouncer using the configured delay.
    pub fn debouncer<A>(&self) -> Debouncer<A> {
        Debouncer::new(Duration::from_millis(self.options.debounce_ms))
    }

    /// Record a search. Ignored when both the query and filters are empty.
    pub fn add_to_history(
        &mut self,
        query: &str,
        filters: Vec<SearchFilter>,
        result_count: usize,
    ) -> Option<&SearchHistoryItem> {
        let query = query.trim();
        if query.is_empty() && filters.is_empty() {
            return None;
        }
        Some(
            self.history
                .add(SearchHistoryItem::new(query, filters, result_count)),
        )
    }

    /// History entries, most recent first.
    pub fn history(&self) -> &[SearchHistoryItem] {
        self.history.get_all()
    }

    pub fn remove_from_history(&mut self, id: &str) -> bool {
        self.history.remove(id)
    }

    pub fn clear_history(&mut self) {
        self.history.clear()
    }

    pub fn history_store(&self) -> &SearchHistoryStore<S> {
        &self.history
    }
}

struct QueryPhase<'a> {
    query: &'a str,
    operand: Value,
    text_fields: Vec<&'a str>,
    scalar: Vec<&'a SearchFilter>,
    any_unbound: bool,
}
