//! JSON-lines file store
//!
//! One `StoredSnapshot` per line, opened in append mode. Appends from this
//! process are serialised by an async mutex. A corrupt line fails the whole read.

use crate::{sort_ascending, SnapshotStore, StoreError, StoredSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use pointscope_core::Snapshot;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct JsonlSnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<StoredSnapshot>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    StoreError::Serialization(format!("{}:{}: {}", self.path.display(), i + 1, e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for JsonlSnapshotStore {
    async fn append(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let record = StoredSnapshot {
            snapshot: snapshot.clone(),
            created_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            path = %self.path.display(),
            captured_at_unix = snapshot.captured_at_unix,
            "Snapshot appended"
        );
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots: Vec<Snapshot> = self
            .read_records()
            .await?
            .into_iter()
            .map(|r| r.snapshot)
            .collect();
        sort_ascending(&mut snapshots);
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
