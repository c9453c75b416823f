//! # Pointscope Core - TVL Valuation & Points Emission
//!
//! Pure arithmetic over upstream TVL figures for the two tokenized-yield markets.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   resolve    ┌──────────────┐  evaluate   ┌──────────────┐
//! │  TvlReport   │ ───────────▶ │ raw amounts  │ ──────────▶ │  Evaluation  │
//! │ (per market) │              │  (by row id) │             │ (RowValues)  │
//! └──────────────┘              └──────────────┘             └──────┬───────┘
//!                                                                   │ summary
//!                      ┌──────────────┐  compute_growth    ┌────────▼───────┐
//!                      │  GrowthRate  │ ◀───────────────── │    Snapshot    │
//!                      └──────┬───────┘   (history)        └────────────────┘
//!                             │ project
//!                      ┌──────▼───────┐
//!                      │ future points│
//!                      └──────────────┘
//! ```
//!
//! ## Emission convention
//!
//! One unit of weighted TVL emits one point per day. Weighted TVL is raw TVL
//! multiplied by the row's effective boost; only `Active` and `Locked` rows
//! count toward totals.

pub mod display;
pub mod error;
pub mod position;
pub mod projection;
pub mod table;
pub mod types;
pub mod valuation;

// Re-exports
pub use error::{ProjectionError, TableError};
pub use position::{estimate_position, PositionEstimate};
pub use projection::{
    average_exponential_multiplier, compute_growth, forecast, project, window, Forecast,
    ForecastPoint, GrowthRate, ProjectionModel,
};
pub use table::{resolve_raw_amounts, BoostMismatch, ResolvedAmounts, RowTable};
pub use types::*;
pub use valuation::{evaluate, Evaluation, PointsFigures};

/// Emission and projection constants
pub mod constants {
    /// Points emitted per weighted TVL unit per day
    pub const POINTS_PER_WEIGHTED_UNIT_PER_DAY: f64 = 1.0;

    /// Minimum interval used when normalising growth to a daily rate
    pub const MIN_CALENDAR_DAYS: i64 = 1;

    /// Seconds per day
    pub const SECONDS_PER_DAY: i64 = 86_400;

    /// Default forecast horizons (days)
    pub const DEFAULT_HORIZONS: [u32; 4] = [7, 30, 90, 180];

    /// Tolerance for share normalisation checks
    pub const SHARE_EPSILON: f64 = 1e-9;
}

pub use constants::*;
