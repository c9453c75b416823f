//! # Snapshot Capture Orchestrator
//!
//! ```text
//! Idle → Warmup? → FetchingTvl{1..n} → FetchingPoints → Valuating → Persisting → Done
//!                        │                  (may fail, never aborts)        │
//!                        └──────────────▶ Aborted ◀──────────────────────────┘
//! ```
//!
//! The TVL source is required: exhausting its retries aborts the capture and
//! nothing is written. The points source is optional: a failure degrades to
//! zero points with `PointsStatus::Unavailable`, or to the last cached figures
//! with `PointsStatus::Stale`.

use crate::cache::TtlCache;
use crate::error::{CaptureError, RetryFailure};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sources::{PointsReport, PointsSource, TvlSource};
use chrono::Utc;
use parking_lot::RwLock;
use pointscope_core::{
    evaluate, resolve_raw_amounts, Evaluation, PointsStatus, RowTable, Snapshot, TvlReport,
};
use pointscope_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const TVL_CACHE_KEY: &str = "tvl";

/// Where a capture currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturePhase {
    Idle,
    Warmup,
    FetchingTvl { attempt: u32 },
    FetchingPoints,
    Valuating,
    Persisting,
    Done,
    Aborted,
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Warmup => write!(f, "warmup"),
            Self::FetchingTvl { attempt } => write!(f, "fetching_tvl(attempt {attempt})"),
            Self::FetchingPoints => write!(f, "fetching_points"),
            Self::Valuating => write!(f, "valuating"),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Retry and cache settings for the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSettings {
    pub tvl_retry: RetryPolicy,
    pub points_retry: RetryPolicy,
    pub points_ttl: Duration,
    pub tvl_ttl: Duration,
    /// Ping the points service before fetching
    pub warmup: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            tvl_retry: RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(30), 4),
            points_retry: RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(60), 3),
            points_ttl: Duration::from_secs(300),
            tvl_ttl: Duration::from_secs(60),
            warmup: false,
        }
    }
}

/// Valuation of a live (or recently cached) TVL pull
#[derive(Clone, Debug, PartialEq)]
pub struct LiveValuation {
    pub evaluation: Evaluation,
    /// Rows whose upstream inputs were absent
    pub missing: Vec<String>,
    /// Served from an expired cache entry after a failed fetch
    pub stale: bool,
}

/// Counters from a `run_periodic` session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub captured: u64,
    pub failed: u64,
}

pub struct CaptureOrchestrator {
    tvl: Arc<dyn TvlSource>,
    points: Arc<dyn PointsSource>,
    store: Arc<dyn SnapshotStore>,
    table: Arc<RowTable>,
    settings: CaptureSettings,
    points_cache: TtlCache<String, PointsReport, RetryFailure>,
    tvl_cache: TtlCache<&'static str, TvlReport, RetryFailure>,
    phase: RwLock<CapturePhase>,
}

impl CaptureOrchestrator {
    pub fn new(
        tvl: Arc<dyn TvlSource>,
        points: Arc<dyn PointsSource>,
        store: Arc<dyn SnapshotStore>,
        table: Arc<RowTable>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            tvl,
            points,
            store,
            table,
            settings,
            points_cache: TtlCache::new(),
            tvl_cache: TtlCache::new(),
            phase: RwLock::new(CapturePhase::Idle),
        }
    }

    /// Share a points cache with other orchestrators
    pub fn with_points_cache(mut self, cache: TtlCache<String, PointsReport, RetryFailure>) -> Self {
        self.points_cache = cache;
        self
    }

    pub fn points_cache(&self) -> &TtlCache<String, PointsReport, RetryFailure> {
        &self.points_cache
    }

    pub fn phase(&self) -> CapturePhase {
        *self.phase.read()
    }

    pub fn table(&self) -> &RowTable {
        &self.table
    }

    fn set_phase(&self, phase: CapturePhase) {
        tracing::info!(%phase, "Capture phase");
        *self.phase.write() = phase;
    }

    fn abort(&self, error: CaptureError) -> CaptureError {
        self.set_phase(CapturePhase::Aborted);
        tracing::error!(%error, exit_code = error.exit_code(), "Capture aborted");
        error
    }

    /// Run one full capture and append the snapshot to the store
    pub async fn capture_once(&self) -> Result<Snapshot, CaptureError> {
        if self.settings.warmup {
            self.set_phase(CapturePhase::Warmup);
            let points = Arc::clone(&self.points);
            let warmed = retry_with_backoff(&self.settings.points_retry, "points-warmup", |_| {
                points.warmup()
            })
            .await;
            if let Err(failure) = warmed {
                tracing::warn!(error = %failure, "Points warmup failed, continuing");
            }
        }

        let report = match self.fetch_tvl().await {
            Ok(report) => report,
            Err(failure) => return Err(self.abort(CaptureError::from_retry("tvl", failure))),
        };
        self.tvl_cache
            .put(TVL_CACHE_KEY, report.clone(), self.settings.tvl_ttl);

        self.set_phase(CapturePhase::FetchingPoints);
        let points = self.fetch_points().await;

        self.set_phase(CapturePhase::Valuating);
        let resolved = resolve_raw_amounts(&self.table, &report);
        if resolved.amounts.is_empty() && self.table.reads_tvl() {
            return Err(self.abort(CaptureError::UpstreamShapeChanged {
                upstream: "tvl",
                detail: "no row amount could be resolved from the tvl response".into(),
            }));
        }
        if !resolved.missing.is_empty() {
            tracing::warn!(
                count = resolved.missing.len(),
                rows = ?resolved.missing,
                "TVL inputs missing for rows, valued at zero"
            );
        }

        let evaluation = evaluate(self.table.rows(), &resolved.amounts);
        let summary = match points {
            Some((report, status)) => evaluation.summary(Some(report.figures()), status),
            None => evaluation.summary(None, PointsStatus::Unavailable),
        };
        let snapshot = Snapshot::new(Utc::now(), summary, evaluation.condensed(&self.table));

        self.set_phase(CapturePhase::Persisting);
        if let Err(reason) = self.store.append(&snapshot).await {
            return Err(self.abort(CaptureError::PersistenceFailure {
                snapshot: Box::new(snapshot),
                reason,
            }));
        }

        self.set_phase(CapturePhase::Done);
        tracing::info!(
            store = self.store.name(),
            captured_at_unix = snapshot.captured_at_unix,
            total_raw_tvl = snapshot.summary.total_raw_tvl,
            total_weighted_tvl = snapshot.summary.total_weighted_tvl,
            cumulative_points = snapshot.summary.cumulative_points,
            points_status = ?snapshot.summary.points_status,
            "Snapshot captured"
        );
        Ok(snapshot)
    }

    async fn fetch_tvl(&self) -> Result<TvlReport, RetryFailure> {
        retry_with_backoff(&self.settings.tvl_retry, "tvl", |attempt| {
            self.set_phase(CapturePhase::FetchingTvl { attempt });
            self.tvl.fetch_tvl()
        })
        .await
    }

    /// Points figures and their freshness, or `None` when unavailable
    async fn fetch_points(&self) -> Option<(PointsReport, PointsStatus)> {
        let source = Arc::clone(&self.points);
        let policy = self.settings.points_retry.clone();
        let key = source.program().to_string();

        let fetched = self
            .points_cache
            .single_flight(key, self.settings.points_ttl, move || async move {
                retry_with_backoff(&policy, "points", |_| source.fetch_points()).await
            })
            .await;

        match fetched {
            Ok(fetched) if fetched.stale => {
                tracing::warn!("Points source failed, using stale cached figures");
                Some((fetched.value, PointsStatus::Stale))
            }
            Ok(fetched) => Some((fetched.value, PointsStatus::Fresh)),
            Err(failure) => {
                tracing::warn!(
                    error = %failure,
                    "Points unavailable, recording zero points and participants"
                );
                None
            }
        }
    }

    /// Value the table against a live TVL pull, sharing one fetch across callers
    ///
    /// A cached report younger than the TVL TTL is reused. If the fetch fails
    /// and an older report exists, it is used and the result flagged stale.
    pub async fn live_evaluation(&self) -> Result<LiveValuation, CaptureError> {
        let source = Arc::clone(&self.tvl);
        let policy = self.settings.tvl_retry.clone();

        let fetched = self
            .tvl_cache
            .single_flight(TVL_CACHE_KEY, self.settings.tvl_ttl, move || async move {
                retry_with_backoff(&policy, "tvl", |_| source.fetch_tvl()).await
            })
            .await
            .map_err(|failure| CaptureError::from_retry("tvl", failure))?;

        let resolved = resolve_raw_amounts(&self.table, &fetched.value);
        Ok(LiveValuation {
            evaluation: evaluate(self.table.rows(), &resolved.amounts),
            missing: resolved.missing,
            stale: fetched.stale,
        })
    }

    /// Capture every `every` until `shutdown` resolves
    ///
    /// Failures are logged and handed to `on_error`; they never stop the loop.
    /// A capture in progress when `shutdown` fires runs to completion.
    pub async fn run_periodic<S, H>(&self, every: Duration, shutdown: S, mut on_error: H) -> WatchStats
    where
        S: Future<Output = ()>,
        H: FnMut(&CaptureError),
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = WatchStats::default();

        tracing::info!(interval_secs = every.as_secs(), "Periodic capture started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(captured = stats.captured, failed = stats.failed, "Periodic capture stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.capture_once().await {
                        Ok(_) => stats.captured += 1,
                        Err(err) => {
                            stats.failed += 1;
                            on_error(&err);
                        }
                    }
                }
            }
        }
        stats
    }
}
