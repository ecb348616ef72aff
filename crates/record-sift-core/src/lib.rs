//! # Record Sift Core
//!
//! Shared, WASM-safe logic for Record Sift: field access over dynamic
//! records, structured filters, free-text matching, highlighting, the
//! debounce state machine, bounded search history and the search engine
//! that ties them together.
//!
//! This crate contains no tokio, filesystem I/O, or other native-only
//! dependencies. Persistence goes through the [`store::KeyValueStore`]
//! trait so the host decides where history lives.
//!
//! ```rust
//! use record_sift_core::engine::{SearchEngine, SearchOptions};
//! use record_sift_core::filter::{Operator, SearchFilter};
//! use record_sift_core::store::memory::InMemoryKeyValueStore;
//! use serde_json::json;
//!
//! let records = vec![
//!     json!({"name": "Alice Johnson", "age": 30, "status": "active"}),
//!     json!({"name": "Diana Prince", "age": 28, "status": "active"}),
//! ];
//! let engine = SearchEngine::new(InMemoryKeyValueStore::new(), SearchOptions::default());
//! let hits = engine
//!     .filter(&records, &[SearchFilter::new("age", Operator::LessThan, json!(30))])
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

pub mod debounce;
pub mod engine;
pub mod error;
pub mod field;
pub mod filter;
pub mod highlight;
pub mod history;
pub mod matcher;
pub mod store;

pub use error::{Result, SearchError};
