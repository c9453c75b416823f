//! In-memory snapshot store

use crate::{sort_ascending, SnapshotStore, StoreError, StoredSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pointscope_core::Snapshot;

/// Vector-backed store, process lifetime only
pub struct MemorySnapshotStore {
    records: RwLock<Vec<StoredSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Pre-seeded store
    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let now = Utc::now();
        let records = snapshots
            .into_iter()
            .map(|snapshot| StoredSnapshot {
                snapshot,
                created_at: now,
            })
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Raw records in insertion order
    pub fn records(&self) -> Vec<StoredSnapshot> {
        self.records.read().clone()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn append(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.records.write().push(StoredSnapshot {
            snapshot: snapshot.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots: Vec<Snapshot> = self
            .records
            .read()
            .iter()
            .map(|r| r.snapshot.clone())
            .collect();
        sort_ascending(&mut snapshots);
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_ordered() {
        let store = MemorySnapshotStore::new();
        store
            .append(&Snapshot::from_figures(200, 2.0, 2.0, 2.0))
            .await
            .unwrap();
        store
            .append(&Snapshot::from_figures(100, 1.0, 1.0, 1.0))
            .await
            .unwrap();

        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].captured_at_unix, 100);

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.captured_at_unix, 200);
        // Insertion order is kept in the raw records
        assert_eq!(store.records()[0].snapshot.captured_at_unix, 200);
    }

    #[tokio::test]
    async fn test_empty_latest() {
        let store = MemorySnapshotStore::default();
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_seeded_history() {
        let store = MemorySnapshotStore::with_snapshots(vec![
            Snapshot::from_figures(300, 3.0, 3.0, 3.0),
            Snapshot::from_figures(100, 1.0, 1.0, 1.0),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.read_all().await.unwrap()[0].captured_at_unix, 100);
    }
}
