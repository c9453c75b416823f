//! # Pointscope Storage
//!
//! Append-only snapshot persistence.
//!
//! ## Backends
//!
//! - `memory` - in-process vector, for tests and dry runs
//! - `jsonl` - local file, one JSON record per line
//! - `rest` - hosted relational table over HTTP (PostgREST-style)
//!
//! Every backend supports exactly three operations: append, read all
//! (ascending by `capturedAtUnix`) and read latest. There is no update or delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pointscope_core::Snapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod jsonl;
pub mod memory;
pub mod rest;

pub use jsonl::JsonlSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use rest::{RestSnapshotStore, RestStoreConfig};

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Store answered with a non-success status
    #[error("Store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Write attempted without the shared write secret
    #[error("Write secret not configured")]
    Unauthorized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Snapshot plus the store-assigned insertion time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub created_at: DateTime<Utc>,
}

/// Append-only snapshot store
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert one snapshot; `createdAt` is assigned by the store
    async fn append(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Every snapshot, ascending by `captured_at_unix`
    async fn read_all(&self) -> Result<Vec<Snapshot>, StoreError>;

    /// Most recent snapshot, if any
    async fn latest(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.read_all().await?.pop())
    }

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Stable ascending order by capture time
pub(crate) fn sort_ascending(snapshots: &mut [Snapshot]) {
    snapshots.sort_by_key(|s| s.captured_at_unix);
}
