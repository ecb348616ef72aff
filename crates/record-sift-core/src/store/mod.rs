//! Key-value persistence abstraction.
//!
//! The [`KeyValueStore`] trait is the only thing the search history needs
//! from its host: read a string by key, write a string by key. Browser
//! storage, a JSON file, or Redis all satisfy it.
//!
//! Implementations must be `Send + Sync` so engines can live behind
//! shared state in async servers.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;

/// Abstract string key-value backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_item`](KeyValueStore::get_item) | Read the value stored under a key |
/// | [`set_item`](KeyValueStore::set_item) | Write (replace) the value under a key |
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }
}
