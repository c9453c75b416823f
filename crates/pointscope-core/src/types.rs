//! Core data model: row definitions, row values and snapshots

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a row is a top-level position or a breakdown of one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Row,
    Subrow,
}

/// Per-row flag controlling whether a row contributes to totals
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionStatus {
    /// Earns points and counts toward totals
    Active,
    /// Time-locked position, counts toward totals
    Locked,
    /// Never counted, weighted value forced to zero
    Excluded,
    /// Shown for breakdown only (e.g. gross before fee), never counted
    DisplayOnly,
}

impl InclusionStatus {
    /// Rows that enter `totalRawTvl` / `totalWeightedTvl` and share computation
    pub fn counts_toward_total(self) -> bool {
        matches!(self, Self::Active | Self::Locked)
    }
}

/// Boost multiplier applied to a row's raw amount
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boost {
    /// Single multiplier
    Simple(f64),
    /// Category boost scaled by a position-specific (lock-duration) multiplier
    Compound { base: f64, multiplier: f64 },
}

impl Boost {
    /// `base × multiplier` for compound boosts, the plain value otherwise
    pub fn effective(&self) -> f64 {
        match *self {
            Self::Simple(boost) => boost,
            Self::Compound { base, multiplier } => base * multiplier,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    /// All factors finite and non-negative
    pub fn is_valid(&self) -> bool {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        match *self {
            Self::Simple(boost) => ok(boost),
            Self::Compound { base, multiplier } => ok(base) && ok(multiplier),
        }
    }
}

/// How a row's raw amount is derived from an upstream TVL report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmountSource {
    /// `supply × price` for a token kind in a market
    Supply { market: String, kind: String },
    /// `locked amount × price` for a lock-duration bucket
    LockBucket {
        market: String,
        kind: String,
        bucket: String,
    },
    /// Fraction of another row's raw amount (fee/net children of a gross row)
    Split { parent: String, fraction: f64 },
    /// Only fed by explicitly supplied amounts
    #[default]
    Manual,
}

/// Static row configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowDefinition {
    /// Unique across the whole table
    pub id: String,
    pub display_name: String,
    pub kind: RowKind,
    pub inclusion: InclusionStatus,
    pub boost: Boost,
    #[serde(default)]
    pub source: AmountSource,
}

impl RowDefinition {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        kind: RowKind,
        inclusion: InclusionStatus,
        boost: Boost,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            inclusion,
            boost,
            source: AmountSource::Manual,
        }
    }

    pub fn with_source(mut self, source: AmountSource) -> Self {
        self.source = source;
        self
    }

    pub fn effective_multiplier(&self) -> f64 {
        self.boost.effective()
    }
}

/// Named, ordered group of row definitions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub rows: Vec<RowDefinition>,
}

/// Per-row result of one evaluation pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowValue {
    pub definition_id: String,
    pub raw_amount: f64,
    pub effective_multiplier: f64,
    pub weighted_value: f64,
    /// Percentage in `[0, 100]`
    pub share_of_total: f64,
}

/// Row entry persisted inside `tableCondensed`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CondensedRow {
    pub id: String,
    pub raw_amount: f64,
    pub weighted_value: f64,
    pub share_of_total: f64,
}

/// Category entry persisted inside `tableCondensed`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: String,
    pub rows: Vec<CondensedRow>,
}

/// Freshness of the points figures recorded in a summary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointsStatus {
    #[default]
    Fresh,
    /// Served from an expired cache entry after a failed fetch
    Stale,
    /// Points source failed; figures are recorded as zero
    Unavailable,
}

/// Human-formatted mirrors of the summary figures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDisplay {
    pub cumulative_points: String,
    pub participant_count: String,
    pub total_raw_tvl: String,
    pub total_weighted_tvl: String,
}

/// Aggregates persisted with every snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAggregate {
    pub cumulative_points: f64,
    pub participant_count: u64,
    pub total_raw_tvl: f64,
    pub total_weighted_tvl: f64,
    #[serde(default)]
    pub points_status: PointsStatus,
    #[serde(default)]
    pub display: SummaryDisplay,
}

/// Immutable timestamped aggregate record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub captured_at_unix: i64,
    pub summary: SummaryAggregate,
    pub table_condensed: Vec<CategoryResult>,
}

impl Snapshot {
    pub fn new(
        captured_at: DateTime<Utc>,
        summary: SummaryAggregate,
        table_condensed: Vec<CategoryResult>,
    ) -> Self {
        Self {
            captured_at_unix: captured_at.timestamp(),
            captured_at,
            summary,
            table_condensed,
        }
    }

    /// Bare snapshot carrying only the three projected metrics
    pub fn from_figures(captured_at_unix: i64, tvl: f64, weighted_tvl: f64, points: f64) -> Self {
        let captured_at = Utc
            .timestamp_opt(captured_at_unix, 0)
            .single()
            .unwrap_or_default();
        Self {
            captured_at,
            captured_at_unix,
            summary: SummaryAggregate {
                cumulative_points: points,
                participant_count: 0,
                total_raw_tvl: tvl,
                total_weighted_tvl: weighted_tvl,
                points_status: PointsStatus::Fresh,
                display: SummaryDisplay::default(),
            },
            table_condensed: Vec::new(),
        }
    }

    pub fn metric_value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Tvl => self.summary.total_raw_tvl,
            Metric::WeightedTvl => self.summary.total_weighted_tvl,
            Metric::Points => self.summary.cumulative_points,
        }
    }
}

/// Upstream TVL figures for one tracked market
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MarketTvl {
    pub market: String,
    /// Token supply by kind (`yt`, `lp`, `pt`, ...)
    #[serde(default)]
    pub token_supply_by_kind: BTreeMap<String, f64>,
    /// USD price by kind
    #[serde(default)]
    pub price_by_kind: BTreeMap<String, f64>,
    /// Locked token amounts by kind, then duration bucket (`3mo`, `6mo`, ...)
    #[serde(default)]
    pub lock_bucket_totals: BTreeMap<String, BTreeMap<String, f64>>,
}

impl MarketTvl {
    pub fn price(&self, kind: &str) -> Option<f64> {
        self.price_by_kind.get(kind).copied()
    }

    pub fn supply(&self, kind: &str) -> Option<f64> {
        self.token_supply_by_kind.get(kind).copied()
    }

    pub fn locked(&self, kind: &str, bucket: &str) -> Option<f64> {
        self.lock_bucket_totals
            .get(kind)
            .and_then(|buckets| buckets.get(bucket))
            .copied()
    }
}

/// Full upstream TVL response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct TvlReport {
    pub markets: Vec<MarketTvl>,
}

impl TvlReport {
    pub fn market(&self, name: &str) -> Option<&MarketTvl> {
        self.markets.iter().find(|m| m.market == name)
    }
}

/// Snapshot metric a growth rate is computed over
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Tvl,
    WeightedTvl,
    Points,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Tvl, Metric::WeightedTvl, Metric::Points];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tvl => write!(f, "tvl"),
            Self::WeightedTvl => write!(f, "weighted_tvl"),
            Self::Points => write!(f, "points"),
        }
    }
}
