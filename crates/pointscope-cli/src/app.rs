//! Wiring from configuration to stores, sources and the orchestrator

use crate::config::{AppConfig, StoreBackend};
use anyhow::Context;
use pointscope_capture::{
    build_client, CaptureError, CaptureOrchestrator, HttpPointsSource, HttpTvlSource,
};
use pointscope_core::{RowTable, Snapshot};
use pointscope_storage::{
    JsonlSnapshotStore, MemorySnapshotStore, RestSnapshotStore, RestStoreConfig, SnapshotStore,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix('~') {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest.trim_start_matches('/'));
            }
        }
    }
    path.to_path_buf()
}

/// Built-in row table, or the configured override
pub fn load_table(config: &AppConfig) -> anyhow::Result<RowTable> {
    let Some(path) = &config.rows.table_path else {
        return Ok(RowTable::builtin());
    };
    let path = expand_path(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading row table {}", path.display()))?;
    let table = RowTable::from_toml_str(&content)?;
    tracing::info!(path = %path.display(), rows = table.len(), "Loaded row table override");
    Ok(table)
}

pub fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    let store = &config.store;
    match store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Memory store selected, snapshots are discarded on exit");
            Ok(Arc::new(MemorySnapshotStore::new()))
        }
        StoreBackend::Jsonl => {
            let path = expand_path(&store.path);
            tracing::debug!(path = %path.display(), "Opening JSON-lines store");
            Ok(Arc::new(JsonlSnapshotStore::new(path)))
        }
        StoreBackend::Rest => {
            let base_url = store
                .rest_url
                .clone()
                .context("store.rest_url is required for the rest backend")?;
            let secret = std::env::var(&store.secret_env).ok();
            if secret.is_none() {
                tracing::warn!(env = %store.secret_env, "Write secret not set, appends will be rejected");
            }
            let api_key = store
                .api_key
                .clone()
                .or_else(|| secret.clone())
                .unwrap_or_default();

            let mut rest = RestStoreConfig::new(base_url, store.table.clone(), api_key);
            rest.timeout = Duration::from_secs(config.sources.timeout_secs);
            if let Some(secret) = secret {
                rest = rest.with_write_secret(secret);
            }
            Ok(Arc::new(RestSnapshotStore::new(rest)?))
        }
    }
}

pub fn build_orchestrator(
    config: &AppConfig,
    store: Arc<dyn SnapshotStore>,
) -> anyhow::Result<CaptureOrchestrator> {
    let sources = &config.sources;
    let client = build_client(Duration::from_secs(sources.timeout_secs), &sources.user_agent)?;

    let tvl = HttpTvlSource::new(client.clone(), sources.tvl_url.clone());
    let mut points = HttpPointsSource::new(
        client,
        sources.points_url.clone(),
        sources.points_program.clone(),
    );
    if let Some(url) = &sources.warmup_url {
        points = points.with_warmup_url(url.clone());
    }

    Ok(CaptureOrchestrator::new(
        Arc::new(tvl),
        Arc::new(points),
        store,
        Arc::new(load_table(config)?),
        config.capture_settings(),
    ))
}

/// Append a snapshot to a spill file, one JSON record per line
pub fn spill(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", serde_json::to_string(snapshot)?)?;
    Ok(())
}

/// Spill the unsaved snapshot carried by a persistence failure, if any
pub fn spill_unsaved(err: &CaptureError, path: Option<&Path>) {
    let (Some(snapshot), Some(path)) = (err.unsaved_snapshot(), path) else {
        return;
    };
    match spill(path, snapshot) {
        Ok(()) => tracing::warn!(
            path = %path.display(),
            captured_at_unix = snapshot.captured_at_unix,
            "Unsaved snapshot written to spill file"
        ),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to write spill file"),
    }
}

pub fn read_spill(path: &Path) -> anyhow::Result<Vec<Snapshot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading spill file {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid snapshot", path.display(), i + 1))
        })
        .collect()
}

/// Replace the spill file with the snapshots still unsaved, or remove it
pub fn rewrite_spill(path: &Path, remaining: &[Snapshot]) -> anyhow::Result<()> {
    if remaining.is_empty() {
        std::fs::remove_file(path)?;
        return Ok(());
    }
    let mut body = String::new();
    for snapshot in remaining {
        body.push_str(&serde_json::to_string(snapshot)?);
        body.push('\n');
    }
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        let expanded = expand_path(Path::new("~/.pointscope/snapshots.jsonl"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".pointscope/snapshots.jsonl"));
        }
        assert_eq!(expand_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_spill_round_trip_and_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill/unsaved.jsonl");

        spill(&path, &Snapshot::from_figures(100, 1.0, 2.0, 3.0)).unwrap();
        spill(&path, &Snapshot::from_figures(200, 4.0, 5.0, 6.0)).unwrap();

        let spilled = read_spill(&path).unwrap();
        assert_eq!(spilled.len(), 2);
        assert_eq!(spilled[1].summary.cumulative_points, 6.0);

        rewrite_spill(&path, &spilled[1..]).unwrap();
        assert_eq!(read_spill(&path).unwrap().len(), 1);

        rewrite_spill(&path, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_memory_backend_opens() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        assert_eq!(open_store(&config).unwrap().name(), "memory");
    }

    #[test]
    fn test_rest_backend_requires_url() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Rest;
        assert!(open_store(&config).is_err());
    }
}
