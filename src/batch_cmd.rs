//! `sift batch` subcommands: bulk status changes and deletes on the records file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::batch::{validate_batch, BatchOperationResult, BatchOperationRunner};
use crate::config::Config;
use crate::progress::{self, ProgressMode};
use crate::records::{InMemoryRecords, RecordRepository};

/// Reject blank ids before anything runs.
pub fn check_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        bail!("no ids given");
    }
    let invalid = validate_batch(ids, |id| {
        if id.trim().is_empty() {
            Err("id must not be empty".to_string())
        } else {
            Ok(())
        }
    });
    if let Some(first) = invalid.first() {
        bail!("{} invalid id(s): {}", invalid.len(), first.error);
    }
    Ok(())
}

pub async fn run_batch_status(
    config: &Config,
    status: &str,
    ids: Vec<String>,
    csv: Option<&Path>,
    progress: ProgressMode,
) -> Result<()> {
    if status.trim().is_empty() {
        bail!("status must not be empty");
    }
    check_ids(&ids)?;
    let records = load(config).await?;
    let runner = runner(config, "status", progress);

    let repo = records.clone();
    let result = runner
        .batch_update_status(ids, status, move |id: String, status| {
            let repo = repo.clone();
            async move { repo.update_status(&id, &status).await }
        })
        .await;

    finish(&records, "status", &result, csv).await
}

pub async fn run_batch_delete(
    config: &Config,
    ids: Vec<String>,
    csv: Option<&Path>,
    progress: ProgressMode,
) -> Result<()> {
    check_ids(&ids)?;
    let records = load(config).await?;
    let runner = runner(config, "delete", progress);

    let repo = records.clone();
    let result = runner
        .batch_delete(ids, move |id: String| {
            let repo = repo.clone();
            async move { repo.delete(&id).await }
        })
        .await;

    finish(&records, "delete", &result, csv).await
}

async fn load(config: &Config) -> Result<Arc<InMemoryRecords>> {
    let records = InMemoryRecords::load(&config.data.path, config.data.id_field.clone()).await?;
    Ok(Arc::new(records))
}

fn runner(config: &Config, operation: &str, progress: ProgressMode) -> BatchOperationRunner {
    let options = progress::attach(config.batch.options(), operation, progress.reporter());
    BatchOperationRunner::new(options)
}

async fn finish<T: Serialize + std::fmt::Display>(
    records: &InMemoryRecords,
    operation: &str,
    result: &BatchOperationResult<T>,
    csv: Option<&Path>,
) -> Result<()> {
    if !result.succeeded.is_empty() {
        records.save().await?;
    }

    println!("batch {}", operation);
    println!("  processed: {}", result.processed);
    println!("  succeeded: {}", result.succeeded.len());
    println!("  failed: {}", result.failed.len());
    for failure in &result.failed {
        println!("  - {}: {}", failure.item, failure.error);
    }

    if let Some(path) = csv {
        std::fs::write(path, result.to_csv()?)
            .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
        println!("  csv: {}", path.display());
    }

    if !result.success {
        bail!(
            "{} of {} items failed",
            result.failed.len(),
            result.processed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ids() {
        assert!(check_ids(&["1".to_string(), "2".to_string()]).is_ok());
        assert!(check_ids(&[]).is_err());
        let err = check_ids(&["1".to_string(), " ".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "1 invalid id(s): id must not be empty");
    }
}
