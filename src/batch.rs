//! Chunked, concurrent execution of per-item async operations.
//!
//! Items are split into consecutive chunks of `batch_size`. Chunks run one
//! after another; the items of a chunk run concurrently and are awaited
//! together. After each chunk the progress callback fires once with the
//! running total, then the runner sleeps `delay_between_batches` unless that
//! was the last chunk.
//!
//! One item failing (an `Err` or a panic) never affects its siblings. The
//! failure is recorded with its message and the run carries on, unless
//! `stop_on_error` is set, in which case no further chunk starts.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::{join_all, FutureExt};
use serde::{Deserialize, Serialize};

pub type ProgressFn = Arc<dyn Fn(BatchProgress) + Send + Sync>;
pub type ItemCompleteFn = Arc<dyn Fn(usize, bool) + Send + Sync>;

/// Running totals passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub delay_between_batches: Duration,
    /// Extra attempts for a failing item before it is recorded as failed.
    pub max_retries: u32,
    pub stop_on_error: bool,
    on_progress: Option<ProgressFn>,
    on_item_complete: Option<ItemCompleteFn>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_between_batches: Duration::from_millis(100),
            max_retries: 0,
            stop_on_error: false,
            on_progress: None,
            on_item_complete: None,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn delay_between_batches(mut self, delay: Duration) -> Self {
        self.delay_between_batches = delay;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Called once per finished chunk.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(BatchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Called as each item settles, with its position in the input and
    /// whether it succeeded.
    pub fn on_item_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, bool) + Send + Sync + 'static,
    {
        self.on_item_complete = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("batch_size", &self.batch_size)
            .field("delay_between_batches", &self.delay_between_batches)
            .field("max_retries", &self.max_retries)
            .field("stop_on_error", &self.stop_on_error)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem<T> {
    pub item: T,
    pub error: String,
}

/// Outcome of a batch run.
///
/// `processed == succeeded.len() + failed.len()` and
/// `success == failed.is_empty()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationResult<T> {
    pub success: bool,
    pub processed: usize,
    pub succeeded: Vec<T>,
    pub failed: Vec<FailedItem<T>>,
}

impl<T> BatchOperationResult<T> {
    fn empty() -> Self {
        Self {
            success: true,
            processed: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.error.as_str())
    }
}

impl<T: Serialize> BatchOperationResult<T> {
    /// `status,error,data` rows, succeeded items first. `data` is the item as JSON.
    pub fn to_csv(&self) -> Result<String> {
        let mut out = String::from("status,error,data\n");
        for item in &self.succeeded {
            push_row(&mut out, "succeeded", "", &serde_json::to_string(item)?);
        }
        for failed in &self.failed {
            push_row(
                &mut out,
                "failed",
                &failed.error,
                &serde_json::to_string(&failed.item)?,
            );
        }
        Ok(out)
    }
}

fn push_row(out: &mut String, status: &str, error: &str, data: &str) {
    let cells = [status, error, data].map(csv_field);
    out.push_str(&cells.join(","));
    out.push('\n');
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One `(id, data)` pair for [`BatchOperationRunner::batch_update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate<Id, D> {
    pub id: Id,
    pub data: D,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOperationRunner {
    options: BatchOptions,
}

impl BatchOperationRunner {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `op` over every item.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, op: F) -> BatchOperationResult<T>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let total = items.len();
        let batch_size = self.options.batch_size.max(1);
        let mut result = BatchOperationResult::empty();
        let mut pending = items.into_iter().enumerate().peekable();
        let mut chunk_no = 0usize;

        loop {
            let chunk: Vec<(usize, T)> = pending.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunk_no += 1;
            tracing::debug!(chunk = chunk_no, size = chunk.len(), total, "running batch chunk");

            let op = &op;
            let outcomes = join_all(chunk.into_iter().map(|(index, item)| async move {
                let outcome = self.attempt(op, &item).await;
                if let Some(callback) = &self.options.on_item_complete {
                    callback(index, outcome.is_ok());
                }
                (item, outcome)
            }))
            .await;

            let mut chunk_failed = false;
            for (item, outcome) in outcomes {
                result.processed += 1;
                match outcome {
                    Ok(()) => result.succeeded.push(item),
                    Err(error) => {
                        tracing::warn!(error = %error, "batch item failed");
                        chunk_failed = true;
                        result.failed.push(FailedItem { item, error });
                    }
                }
            }

            if let Some(callback) = &self.options.on_progress {
                callback(BatchProgress {
                    processed: result.processed,
                    total,
                });
            }

            if chunk_failed && self.options.stop_on_error {
                tracing::debug!(
                    processed = result.processed,
                    total,
                    "stopping batch after failed chunk"
                );
                break;
            }
            if pending.peek().is_some() && !self.options.delay_between_batches.is_zero() {
                tokio::time::sleep(self.options.delay_between_batches).await;
            }
        }

        result.success = result.failed.is_empty();
        result
    }

    async fn attempt<T, F, Fut>(&self, op: &F, item: &T) -> std::result::Result<(), String>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = AssertUnwindSafe(async { op(item.clone()).await })
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic),
            };
            if attempt >= self.options.max_retries {
                return Err(error);
            }
            attempt += 1;
            tracing::debug!(attempt, error = %error, "retrying batch item");
        }
    }

    /// Alias of [`run`](Self::run) for creating items.
    pub async fn batch_create<T, F, Fut>(&self, items: Vec<T>, create_fn: F) -> BatchOperationResult<T>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run(items, create_fn).await
    }

    pub async fn batch_delete<Id, F, Fut>(&self, ids: Vec<Id>, delete_fn: F) -> BatchOperationResult<Id>
    where
        Id: Clone,
        F: Fn(Id) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run(ids, delete_fn).await
    }

    /// Apply `update_fn(id, data)` to every pair.
    pub async fn batch_update<Id, D, F, Fut>(
        &self,
        updates: Vec<BatchUpdate<Id, D>>,
        update_fn: F,
    ) -> BatchOperationResult<BatchUpdate<Id, D>>
    where
        Id: Clone,
        D: Clone,
        F: Fn(Id, D) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run(updates, |update| update_fn(update.id, update.data))
            .await
    }

    /// Set the same `status` on every id.
    pub async fn batch_update_status<Id, F, Fut>(
        &self,
        ids: Vec<Id>,
        status: &str,
        update_fn: F,
    ) -> BatchOperationResult<Id>
    where
        Id: Clone,
        F: Fn(Id, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run(ids, |id| update_fn(id, status.to_string())).await
    }
}

/// Items rejected by `validator`, with its messages. Nothing is executed.
pub fn validate_batch<T, V>(items: &[T], validator: V) -> Vec<FailedItem<T>>
where
    T: Clone,
    V: Fn(&T) -> std::result::Result<(), String>,
{
    items
        .iter()
        .filter_map(|item| {
            validator(item).err().map(|error| FailedItem {
                item: item.clone(),
                error,
            })
        })
        .collect()
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn fast() -> BatchOptions {
        BatchOptions::new().delay_between_batches(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let runner = BatchOperationRunner::new(fast());
        let result = runner
            .run((1..=5).collect(), |_n: i32| async { Ok(()) })
            .await;
        assert!(result.success);
        assert_eq!(result.processed, 5);
        assert_eq!(result.succeeded, vec![1, 2, 3, 4, 5]);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let runner = BatchOperationRunner::new(fast().batch_size(4));
        let result = runner
            .run((1..=10).collect(), |n: i32| async move {
                if n % 3 == 0 {
                    bail!("item {} rejected", n);
                }
                Ok(())
            })
            .await;

        assert_eq!(result.processed, 10);
        assert_eq!(result.succeeded.len() + result.failed.len(), 10);
        assert!(!result.success);
        let failed: Vec<i32> = result.failed.iter().map(|f| f.item).collect();
        assert_eq!(failed, vec![3, 6, 9]);
        assert_eq!(result.failed[0].error, "item 3 rejected");
        assert_eq!(result.errors().count(), 3);
    }

    #[tokio::test]
    async fn test_progress_once_per_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = BatchOperationRunner::new(
            fast()
                .batch_size(2)
                .on_progress(move |p| sink.lock().unwrap().push((p.processed, p.total))),
        );
        runner
            .run(vec!['a', 'b', 'c', 'd', 'e'], |_c| async { Ok(()) })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_item_complete_reports_index_and_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = BatchOperationRunner::new(
            fast().on_item_complete(move |index, ok| sink.lock().unwrap().push((index, ok))),
        );
        runner
            .run(vec![10, 11, 12], |n: i32| async move {
                if n == 11 {
                    bail!("odd");
                }
                Ok(())
            })
            .await;
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![(0, true), (1, false), (2, true)]);
    }

    #[tokio::test]
    async fn test_chunk_runs_concurrently() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runner = BatchOperationRunner::new(fast().batch_size(3));
        runner
            .run((0..6).collect(), |_n: i32| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_chunks() {
        let runner = BatchOperationRunner::new(
            BatchOptions::new()
                .batch_size(2)
                .delay_between_batches(Duration::from_millis(100)),
        );
        let start = Instant::now();
        runner.run(vec![1, 2, 3, 4, 5], |_n: i32| async { Ok(()) }).await;
        // three chunks, two gaps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_panics_are_recorded() {
        let runner = BatchOperationRunner::new(fast());
        let result = runner
            .run(vec![1, 2], |n: i32| async move {
                if n == 2 {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        assert_eq!(result.succeeded, vec![1]);
        assert_eq!(result.failed[0].error, "panicked: boom");
    }

    #[tokio::test]
    async fn test_retries_before_failing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = BatchOperationRunner::new(fast().max_retries(2));
        let counter = calls.clone();
        let result = runner
            .run(vec!["flaky"], move |_s| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        bail!("transient");
                    }
                    Ok(())
                }
            })
            .await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = runner
            .run(vec!["broken"], |_s| async { bail!("permanent") })
            .await;
        assert_eq!(result.failed[0].error, "permanent");
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_remaining_chunks() {
        let runner = BatchOperationRunner::new(fast().batch_size(2).stop_on_error(true));
        let result = runner
            .run((1..=6).collect(), |n: i32| async move {
                if n == 3 {
                    bail!("stop here");
                }
                Ok(())
            })
            .await;
        assert_eq!(result.processed, 4);
        assert_eq!(result.succeeded, vec![1, 2, 4]);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_wrappers() {
        let runner = BatchOperationRunner::new(fast());
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let result = runner
            .batch_update_status(vec![1, 2], "archived", move |id: u32, status| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(format!("{}={}", id, status));
                    Ok(())
                }
            })
            .await;
        assert_eq!(result.succeeded, vec![1, 2]);
        let mut statuses = statuses.lock().unwrap().clone();
        statuses.sort();
        assert_eq!(statuses, vec!["1=archived", "2=archived"]);

        let result = runner
            .batch_update(
                vec![BatchUpdate { id: 7, data: "x" }],
                |id: u32, _data| async move {
                    if id == 7 {
                        bail!("record not found: 7");
                    }
                    Ok(())
                },
            )
            .await;
        assert_eq!(result.failed[0].item.id, 7);

        let result = runner
            .batch_delete(vec![1u32], |_id| async { Ok(()) })
            .await;
        assert!(result.success);
        let result = runner
            .batch_create(vec!["a".to_string()], |_s| async { Ok(()) })
            .await;
        assert_eq!(result.processed, 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let runner = BatchOperationRunner::new(fast());
        let result = runner.run(Vec::<u8>::new(), |_b| async { Ok(()) }).await;
        assert!(result.success);
        assert_eq!(result.processed, 0);
    }

    #[test]
    fn test_validate_batch() {
        let invalid = validate_batch(&[1, -2, 3, -4], |n| {
            if *n < 0 {
                Err(format!("{} is negative", n))
            } else {
                Ok(())
            }
        });
        assert_eq!(invalid.len(), 2);
        assert_eq!(invalid[1].item, -4);
        assert_eq!(invalid[1].error, "-4 is negative");
    }

    #[test]
    fn test_csv_export_quotes_fields() {
        let result = BatchOperationResult {
            success: false,
            processed: 2,
            succeeded: vec![serde_json::json!({"id": 1})],
            failed: vec![FailedItem {
                item: serde_json::json!({"id": 2, "name": "a,b"}),
                error: "said \"no\"".to_string(),
            }],
        };
        let csv = result.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "status,error,data");
        assert_eq!(lines[1], r#"succeeded,,"{""id"":1}""#);
        assert_eq!(lines[2], r#"failed,"said ""no""","{""id"":2,""name"":""a,b""}""#);
    }
}
