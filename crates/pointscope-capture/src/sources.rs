//! Upstream data source traits

use crate::error::SourceError;
use async_trait::async_trait;
use pointscope_core::{PointsFigures, TvlReport};
use serde::{Deserialize, Serialize};

/// Cumulative points for one named program
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointsReport {
    pub program: String,
    pub cumulative_points: f64,
    pub participant_count: u64,
}

impl PointsReport {
    pub fn figures(&self) -> PointsFigures {
        PointsFigures {
            cumulative_points: self.cumulative_points,
            participant_count: self.participant_count,
        }
    }
}

/// Primary source: per-market supply, prices and lock buckets
#[async_trait]
pub trait TvlSource: Send + Sync {
    async fn fetch_tvl(&self) -> Result<TvlReport, SourceError>;

    fn name(&self) -> &str;
}

/// Secondary source: slow and unreliable, never required for a capture
#[async_trait]
pub trait PointsSource: Send + Sync {
    /// Wake a cold-starting upstream before the real fetch
    async fn warmup(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn fetch_points(&self) -> Result<PointsReport, SourceError>;

    /// Program the figures are reported for
    fn program(&self) -> &str;
}
