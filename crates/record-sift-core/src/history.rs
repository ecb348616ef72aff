//! Bounded, deduplicated search history backed by a [`KeyValueStore`].
//!
//! Entries are kept most-recent-first. Adding a search that is already
//! present refreshes that entry (filters, count, timestamp) and moves it to
//! the front instead of duplicating it. The list never exceeds `max_items`; the oldest entries
//! fall off the tail.
//!
//! Persistence is best-effort. Storage failures are logged and handed to
//! the optional error callback, but never interrupt the in-memory
//! operation that triggered them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::SearchFilter;
use crate::store::KeyValueStore;
use crate::SearchError;

pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 10;
pub const DEFAULT_HISTORY_KEY: &str = "search-history";

/// Callback invoked with every absorbed persistence failure.
pub type ErrorCallback = Box<dyn Fn(&SearchError) + Send + Sync>;

/// One past search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryItem {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
    #[serde(default)]
    pub result_count: usize,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SearchHistoryItem {
    pub fn new(query: impl Into<String>, filters: Vec<SearchFilter>, result_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            filters,
            result_count,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

pub struct SearchHistoryStore<S> {
    store: S,
    key: String,
    max_items: usize,
    items: Vec<SearchHistoryItem>,
    on_error: Option<ErrorCallback>,
}

impl<S: KeyValueStore> SearchHistoryStore<S> {
    /// Open the history stored under `key`, loading whatever is there.
    pub fn new(store: S, key: impl Into<String>, max_items: usize) -> Self {
        Self::open(store, key, max_items, None)
    }

    /// Like [`new`](Self::new), reporting persistence failures (including
    /// the initial load) to `on_error`.
    pub fn open(
        store: S,
        key: impl Into<String>,
        max_items: usize,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        let mut history = Self {
            store,
            key: key.into(),
            max_items: max_items.max(1),
            items: Vec::new(),
            on_error,
        };
        history.load();
        history
    }

    pub fn set_error_callback(&mut self, on_error: ErrorCallback) {
        self.on_error = Some(on_error);
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Entries, most recent first.
    pub fn get_all(&self) -> &[SearchHistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert `item` at the front, or refresh the entry it duplicates.
    ///
    /// Entries with a query dedup by query alone. Filter-only entries (empty
    /// query) dedup by their filter list.
    pub fn add(&mut self, item: SearchHistoryItem) -> &SearchHistoryItem {
        match self.items.iter().position(|existing| same_search(existing, &item)) {
            Some(pos) => {
                let mut existing = self.items.remove(pos);
                existing.timestamp = item.timestamp.max(existing.timestamp + 1);
                existing.filters = item.filters;
                existing.result_count = item.result_count;
                self.items.insert(0, existing);
            }
            None => self.items.insert(0, item),
        }
        self.items.truncate(self.max_items);
        self.persist();
        &self.items[0]
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        let removed = self.items.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.persist();
    }

    /// Replace the in-memory entries with what the store holds.
    pub fn load(&mut self) {
        self.items = match self.store.get_item(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<SearchHistoryItem>>(&raw) {
                Ok(mut items) => {
                    items.truncate(self.max_items);
                    items
                }
                Err(e) => {
                    self.report(SearchError::Persistence(format!(
                        "failed to parse history under '{}': {}",
                        self.key, e
                    )));
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                self.report(SearchError::Persistence(format!(
                    "failed to load history under '{}': {}",
                    self.key, e
                )));
                Vec::new()
            }
        };
    }

    /// Write the current entries to the store.
    pub fn persist(&self) {
        let result = serde_json::to_string(&self.items)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set_item(&self.key, &json));
        if let Err(e) = result {
            self.report(SearchError::Persistence(format!(
                "failed to save history under '{}': {}",
                self.key, e
            )));
        }
    }

    fn report(&self, err: SearchError) {
        tracing::warn!(key = %self.key, error = %err, "search history persistence failed");
        if let Some(callback) = &self.on_error {
            callback(&err);
        }
    }
}

fn same_search(existing: &SearchHistoryItem, item: &SearchHistoryItem) -> bool {
    existing.query == item.query && (!item.query.is_empty() || existing.filters == item.filters)
}
