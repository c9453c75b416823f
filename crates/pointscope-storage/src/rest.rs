//! Hosted relational table accessed over HTTP (PostgREST-style)
//!
//! ```text
//! POST /rest/v1/<table>                                       append
//! GET  /rest/v1/<table>?select=*&order=captured_at_unix.asc   read all
//! GET  /rest/v1/<table>?select=*&order=captured_at_unix.desc&limit=1
//! ```
//!
//! Columns: `captured_at`, `captured_at_unix`, `summary` (json),
//! `table_condensed` (json), `created_at` (server default).

use crate::{sort_ascending, SnapshotStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pointscope_core::{CategoryResult, Snapshot, SummaryAggregate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the hosted table
#[derive(Clone, Debug)]
pub struct RestStoreConfig {
    /// Project base URL, e.g. `https://xyz.example.co`
    pub base_url: String,
    pub table: String,
    /// Public key used for reads
    pub api_key: String,
    /// Shared secret required for writes
    pub write_secret: Option<String>,
    pub timeout: Duration,
}

impl RestStoreConfig {
    pub fn new(base_url: impl Into<String>, table: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            table: table.into(),
            api_key: api_key.into(),
            write_secret: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_write_secret(mut self, secret: impl Into<String>) -> Self {
        self.write_secret = Some(secret.into());
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

#[derive(Serialize)]
struct SnapshotInsert<'a> {
    captured_at: &'a DateTime<Utc>,
    captured_at_unix: i64,
    summary: &'a SummaryAggregate,
    table_condensed: &'a [CategoryResult],
}

#[derive(Deserialize)]
struct SnapshotRow {
    captured_at: DateTime<Utc>,
    captured_at_unix: i64,
    summary: SummaryAggregate,
    table_condensed: Vec<CategoryResult>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Snapshot {
            captured_at: row.captured_at,
            captured_at_unix: row.captured_at_unix,
            summary: row.summary,
            table_condensed: row.table_condensed,
        }
    }
}

pub struct RestSnapshotStore {
    config: RestStoreConfig,
    client: reqwest::Client,
}

impl RestSnapshotStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("pointscope-storage/0.1")
            .build()?;
        Ok(Self { config, client })
    }

    async fn select(&self, order: &str, limit: Option<u32>) -> Result<Vec<Snapshot>, StoreError> {
        let mut query = vec![("select", "*".to_string()), ("order", order.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .client
            .get(self.config.endpoint())
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<SnapshotRow> = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(rows.into_iter().map(Snapshot::from).collect())
    }
}

#[async_trait]
impl SnapshotStore for RestSnapshotStore {
    async fn append(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let secret = self
            .config
            .write_secret
            .as_deref()
            .ok_or(StoreError::Unauthorized)?;

        let body = SnapshotInsert {
            captured_at: &snapshot.captured_at,
            captured_at_unix: snapshot.captured_at_unix,
            summary: &snapshot.summary,
            table_condensed: &snapshot.table_condensed,
        };

        let response = self
            .client
            .post(self.config.endpoint())
            .header("apikey", secret)
            .bearer_auth(secret)
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Snapshot insert rejected");
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            table = %self.config.table,
            captured_at_unix = snapshot.captured_at_unix,
            "Snapshot inserted"
        );
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots = self.select("captured_at_unix.asc", None).await?;
        sort_ascending(&mut snapshots);
        Ok(snapshots)
    }

    async fn latest(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .select("captured_at_unix.desc", Some(1))
            .await?
            .into_iter()
            .next())
    }

    fn name(&self) -> &str {
        "rest"
    }
}
