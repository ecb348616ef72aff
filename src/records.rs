//! Record collections the CLI and server operate on.
//!
//! [`RecordRepository`] is the seam batch operations write through. The
//! bundled [`InMemoryRecords`] keeps a JSON array in memory and can be
//! loaded from and saved back to the `[data].path` file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use record_sift_core::field::{as_text, resolve};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

/// Async access to a mutable record collection.
///
/// Ids are compared against the configured id field rendered as text, so
/// `"7"` finds both `{"id": 7}` and `{"id": "7"}`.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Every record, in storage order.
    async fn all(&self) -> Result<Vec<Value>>;

    /// Set `status` on the record with `id`.
    async fn update_status(&self, id: &str, status: &str) -> Result<()>;

    /// Remove the record with `id`.
    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct InMemoryRecords {
    id_field: String,
    path: Option<PathBuf>,
    records: RwLock<Vec<Value>>,
    save_lock: Mutex<()>,
}

impl InMemoryRecords {
    pub fn new(records: Vec<Value>, id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            path: None,
            records: RwLock::new(records),
            save_lock: Mutex::new(()),
        }
    }

    /// Load a JSON array of records from `path`; [`save`](Self::save) writes back there.
    pub async fn load(path: &Path, id_field: impl Into<String>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read records file: {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse records file: {}", path.display()))?;
        let Value::Array(records) = value else {
            bail!("records file must contain a JSON array: {}", path.display());
        };
        tracing::debug!(path = %path.display(), count = records.len(), "loaded records");

        let mut repo = Self::new(records, id_field);
        repo.path = Some(path.to_path_buf());
        Ok(repo)
    }

    /// Write the records back to the file they were loaded from. No-op for
    /// collections built with [`new`](Self::new).
    ///
    /// Saves are serialized and each one snapshots the records after taking
    /// the save lock, so the last write on disk is never older than an
    /// earlier one. The file is replaced through a temporary sibling.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;
        let json = serde_json::to_string_pretty(&*self.records.read().await)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write records file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace records file: {}", path.display()))?;
        Ok(())
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn has_id(&self, record: &Value, id: &str) -> bool {
        resolve(record, &self.id_field)
            .and_then(as_text)
            .is_some_and(|candidate| candidate == id)
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecords {
    async fn all(&self) -> Result<Vec<Value>> {
        Ok(self.records.read().await.clone())
    }

    async fn update_status(&self, id: &str, status: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| self.has_id(r, id)) else {
            bail!("record not found: {}", id);
        };
        let Value::Object(fields) = record else {
            bail!("record {} is not an object", id);
        };
        fields.insert("status".to_string(), Value::String(status.to_string()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(pos) = records.iter().position(|r| self.has_id(r, id)) else {
            bail!("record not found: {}", id);
        };
        records.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn repo() -> InMemoryRecords {
        InMemoryRecords::new(
            vec![
                json!({"id": 1, "name": "Alice", "status": "active"}),
                json!({"id": "2", "name": "Bob", "status": "active"}),
            ],
            "id",
        )
    }

    #[tokio::test]
    async fn test_update_status_matches_numeric_and_string_ids() {
        let repo = repo();
        repo.update_status("1", "archived").await.unwrap();
        repo.update_status("2", "archived").await.unwrap();
        let all = repo.all().await.unwrap();
        assert!(all.iter().all(|r| r["status"] == "archived"));
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let repo = repo();
        let err = repo.delete("99").await.unwrap_err();
        assert_eq!(err.to_string(), "record not found: 99");
        let err = repo.update_status("99", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "record not found: 99");
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo();
        repo.delete("1").await.unwrap();
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_and_save_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        std::fs::write(&path, r#"[{"uid": "a", "status": "new"}]"#).unwrap();

        let repo = InMemoryRecords::load(&path, "uid").await.unwrap();
        repo.update_status("a", "done").await.unwrap();
        repo.save().await.unwrap();

        let reloaded = InMemoryRecords::load(&path, "uid").await.unwrap();
        assert_eq!(reloaded.all().await.unwrap()[0]["status"], "done");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_every_update() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        let initial: Vec<Value> = (0..20)
            .map(|i| json!({"id": i, "status": "new"}))
            .collect();
        std::fs::write(&path, serde_json::to_string(&initial).unwrap()).unwrap();

        let repo = std::sync::Arc::new(InMemoryRecords::load(&path, "id").await.unwrap());
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.update_status(&i.to_string(), "done").await.unwrap();
                    repo.save().await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let reloaded = InMemoryRecords::load(&path, "id").await.unwrap();
        let all = reloaded.all().await.unwrap();
        assert_eq!(all.len(), 20);
        assert!(all.iter().all(|r| r["status"] == "done"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_rejects_non_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        std::fs::write(&path, r#"{"id": 1}"#).unwrap();
        let err = InMemoryRecords::load(&path, "id").await.err().unwrap();
        assert!(err.to_string().contains("JSON array"));
    }
}
