//! # Pointscope Capture
//!
//! Pulls the two upstream aggregates, values the row table and appends a
//! snapshot to the store.
//!
//! ## Components
//!
//! - **Sources**: `TvlSource` (required) and `PointsSource` (slow, optional),
//!   with HTTP implementations in [`http`].
//! - **Retry**: exponential backoff on timeouts, network failures and warmup
//!   signals. 404-class and shape errors are never retried.
//! - **Cache**: TTL cache with a single-flight guard, so concurrent callers
//!   share one outstanding points fetch.
//! - **Orchestrator**: the capture state machine and the periodic watch loop.

pub mod cache;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod retry;
pub mod sources;

pub use cache::{CacheEntry, Fetched, TtlCache};
pub use error::{CaptureError, RetryFailure, SourceError};
pub use http::{build_client, HttpPointsSource, HttpTvlSource};
pub use orchestrator::{
    CaptureOrchestrator, CapturePhase, CaptureSettings, LiveValuation, WatchStats,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sources::{PointsReport, PointsSource, TvlSource};
