//! # Record Sift
//!
//! Structured filtering, free-text search and search history over JSON
//! record collections, plus rate-limited bulk operations.
//!
//! The pure engine (filters, matcher, highlighting, debounce state machine,
//! history, [`SearchEngine`](record_sift_core::engine::SearchEngine)) lives
//! in `record-sift-core`. This crate adds the native pieces around it:
//! file-backed persistence, async batch execution, rate limiting, an axum
//! HTTP API and the `sift` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ records.json│──▶│ SearchEngine  │──▶│ history.json    │
//! └──────┬──────┘   │ (core)       │   └─────────────────┘
//!        │          └──────┬───────┘
//!        ▼                 │
//! ┌─────────────┐          ├──────────────┐
//! │ BatchOp     │          ▼              ▼
//! │ Runner      │     ┌──────────┐  ┌──────────────┐
//! └─────────────┘     │   CLI    │  │ HTTP + rate  │
//!                     │  (sift)  │  │ limiter      │
//!                     └──────────┘  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sift search alice --filter status:equals:active --filter name:contains
//! sift suggest ali --field name
//! sift history list
//! sift batch status archived 3 7 9
//! sift serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`file_store`] | JSON-file key-value store for history |
//! | [`records`] | Record repository over the records file |
//! | [`debounce`] | Trailing-edge debounce on tokio timers |
//! | [`batch`] | Chunked concurrent batch operations |
//! | [`progress`] | Batch progress reporting |
//! | [`rate_limit`] | Fixed-window rate limiter |
//! | [`middleware`] | Axum rate-limit middleware |
//! | [`server`] | HTTP API |
//! | [`search`] | `sift search` / `sift suggest` |
//! | [`history`] | `sift history` |
//! | [`batch_cmd`] | `sift batch` |

pub mod batch;
pub mod batch_cmd;
pub mod config;
pub mod debounce;
pub mod file_store;
pub mod history;
pub mod middleware;
pub mod progress;
pub mod rate_limit;
pub mod records;
pub mod search;
pub mod server;
