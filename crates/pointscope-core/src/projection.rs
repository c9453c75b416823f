//! # Emission Projection Engine
//!
//! Calendar-day-normalised compound growth between the oldest and newest
//! snapshot, and two extrapolation models for cumulative points.
//!
//! ## Models
//!
//! | Model | Future total |
//! |-------|--------------|
//! | `DirectCompound` | `P × (1 + r)^H` |
//! | `TvlScaledEmission` | `P + E × avg(g) × H`, `g = (1 + r)^H`, `avg(g) = (g - 1) / ln g` |
//!
//! `avg(g)` is the exact mean of an exponential over `[0, H]`; at `g == 1` it is
//! exactly `1` (linear emission). It is evaluated from `ln g = H × ln(1 + r)` so
//! long horizons never form `g` itself, and results past `f64::MAX` surface as
//! `ProjectionError::Overflow`.

use crate::constants::{MIN_CALENDAR_DAYS, SECONDS_PER_DAY};
use crate::error::ProjectionError;
use crate::types::{Metric, PointsStatus, Snapshot};
use serde::{Deserialize, Serialize};

/// Per-calendar-day compound rate for one metric
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    pub metric: Metric,
    pub daily_rate_percent: f64,
    /// Interval the rate was normalised over (at least one day)
    pub calendar_days: i64,
    pub from_unix: i64,
    pub to_unix: i64,
}

impl GrowthRate {
    /// Rate with no interval attached, for what-if projections
    pub fn flat(metric: Metric, daily_rate_percent: f64) -> Self {
        Self {
            metric,
            daily_rate_percent,
            calendar_days: MIN_CALENDAR_DAYS,
            from_unix: 0,
            to_unix: 0,
        }
    }

    /// `1 + r/100`, floored at zero
    pub fn daily_factor(&self) -> f64 {
        (1.0 + self.daily_rate_percent / 100.0).max(0.0)
    }

    /// `(1 + r/100)^days`
    pub fn total_multiplier(&self, days: u32) -> f64 {
        self.daily_factor().powf(f64::from(days))
    }

    /// `ln` of the total multiplier over `days`
    pub fn log_multiplier(&self, days: u32) -> f64 {
        f64::from(days) * self.daily_factor().ln()
    }
}

/// Extrapolation model for cumulative points
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionModel {
    /// Points compound at their own historical rate
    DirectCompound,
    /// Daily emission tracks weighted TVL, which grows at the given rate
    TvlScaledEmission { daily_emission: f64 },
}

/// Compound daily growth of `metric` between the oldest and newest snapshot
///
/// Snapshots are ordered by `captured_at_unix` first. For `Metric::Points`,
/// only snapshots with freshly fetched points count: an unavailable zero is not
/// a real figure, and stale figures repeat an older reading at a newer time.
pub fn compute_growth(history: &[Snapshot], metric: Metric) -> Result<GrowthRate, ProjectionError> {
    let mut ordered: Vec<&Snapshot> = history
        .iter()
        .filter(|s| metric != Metric::Points || s.summary.points_status == PointsStatus::Fresh)
        .collect();

    if ordered.len() < 2 {
        return Err(ProjectionError::InsufficientHistory {
            available: ordered.len(),
        });
    }
    ordered.sort_by_key(|s| s.captured_at_unix);

    let oldest = ordered[0];
    let newest = ordered[ordered.len() - 1];
    let start = oldest.metric_value(metric);
    let end = newest.metric_value(metric);

    if !start.is_finite() || !end.is_finite() || start < 0.0 || end < 0.0 {
        return Err(ProjectionError::InvalidInput(format!(
            "{metric} values must be finite and non-negative (got {start} → {end})"
        )));
    }
    if start == 0.0 {
        return Err(ProjectionError::UndefinedGrowth { metric });
    }

    let calendar_days = calendar_days_between(oldest.captured_at_unix, newest.captured_at_unix);
    let daily_rate_percent = ((end / start).powf(1.0 / calendar_days as f64) - 1.0) * 100.0;

    Ok(GrowthRate {
        metric,
        daily_rate_percent,
        calendar_days,
        from_unix: oldest.captured_at_unix,
        to_unix: newest.captured_at_unix,
    })
}

/// Whole days between two instants, rounded, with a one-day floor
///
/// Sub-day intervals are treated as a single day.
pub fn calendar_days_between(from_unix: i64, to_unix: i64) -> i64 {
    let elapsed = (to_unix - from_unix) as f64 / SECONDS_PER_DAY as f64;
    (elapsed.round() as i64).max(MIN_CALENDAR_DAYS)
}

/// Project `current_total` forward `horizon_days` under `model`
///
/// Fails with `Overflow` when the projected total is not a finite `f64`.
pub fn project(
    current_total: f64,
    rate: &GrowthRate,
    horizon_days: u32,
    model: ProjectionModel,
) -> Result<f64, ProjectionError> {
    if horizon_days == 0 {
        return Ok(current_total);
    }
    let future = match model {
        ProjectionModel::DirectCompound => current_total * rate.total_multiplier(horizon_days),
        ProjectionModel::TvlScaledEmission { daily_emission } => {
            let avg = average_exponential_multiplier(rate.log_multiplier(horizon_days));
            current_total + daily_emission * avg * f64::from(horizon_days)
        }
    };
    if !future.is_finite() {
        return Err(ProjectionError::Overflow { horizon_days });
    }
    Ok(future)
}

/// Mean of `e^(kt)` over `[0, H]`, given `ln g = kH` for the total multiplier `g`
///
/// Exactly `1` when `g == 1`.
pub fn average_exponential_multiplier(ln_g: f64) -> f64 {
    if ln_g == 0.0 {
        1.0
    } else {
        ln_g.exp_m1() / ln_g
    }
}

/// Snapshots inside the trailing `days` window ending at the newest one, ordered
pub fn window(history: &[Snapshot], days: u32) -> Vec<Snapshot> {
    let Some(newest) = history.iter().map(|s| s.captured_at_unix).max() else {
        return Vec::new();
    };
    let cutoff = newest - days as i64 * SECONDS_PER_DAY;
    let mut selected: Vec<Snapshot> = history
        .iter()
        .filter(|s| s.captured_at_unix >= cutoff)
        .cloned()
        .collect();
    selected.sort_by_key(|s| s.captured_at_unix);
    selected
}

/// Projections at one horizon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub horizon_days: u32,
    /// `None` when points growth is undefined
    pub direct_compound: Option<f64>,
    pub tvl_scaled: f64,
}

/// Growth rates and both projections across horizons
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub current_points: f64,
    pub current_weighted_tvl: f64,
    pub tvl_growth: GrowthRate,
    pub weighted_growth: GrowthRate,
    pub points_growth: Option<GrowthRate>,
    pub points: Vec<ForecastPoint>,
}

/// Build a forecast from history plus a live weighted-TVL figure
///
/// Undefined points growth degrades to a TVL-scaled-only forecast; every
/// other error propagates.
pub fn forecast(
    history: &[Snapshot],
    current_points: f64,
    current_weighted_tvl: f64,
    horizons: &[u32],
) -> Result<Forecast, ProjectionError> {
    let tvl_growth = compute_growth(history, Metric::Tvl)?;
    let weighted_growth = compute_growth(history, Metric::WeightedTvl)?;
    let points_growth = match compute_growth(history, Metric::Points) {
        Ok(rate) => Some(rate),
        Err(err @ ProjectionError::UndefinedGrowth { .. })
        | Err(err @ ProjectionError::InsufficientHistory { .. }) => {
            tracing::warn!(error = %err, "Points growth unavailable, direct projection skipped");
            None
        }
        Err(err) => return Err(err),
    };

    let daily_emission = current_weighted_tvl * crate::POINTS_PER_WEIGHTED_UNIT_PER_DAY;
    let points = horizons
        .iter()
        .map(|&horizon_days| {
            let direct_compound = points_growth
                .as_ref()
                .map(|rate| {
                    project(current_points, rate, horizon_days, ProjectionModel::DirectCompound)
                })
                .transpose()?;
            Ok(ForecastPoint {
                horizon_days,
                direct_compound,
                tvl_scaled: project(
                    current_points,
                    &weighted_growth,
                    horizon_days,
                    ProjectionModel::TvlScaledEmission { daily_emission },
                )?,
            })
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;

    Ok(Forecast {
        current_points,
        current_weighted_tvl,
        tvl_growth,
        weighted_growth,
        points_growth,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;

    fn snap(day: i64, points: f64) -> Snapshot {
        Snapshot::from_figures(1_700_000_000 + day * DAY, points, points, points)
    }

    #[test]
    fn test_two_snapshot_growth() {
        let history = vec![snap(0, 1_000_000.0), snap(10, 1_100_000.0)];
        let rate = compute_growth(&history, Metric::Points).unwrap();

        assert_eq!(rate.calendar_days, 10);
        assert!((rate.daily_rate_percent - 0.9577).abs() < 1e-3);

        let future = project(1_100_000.0, &rate, 10, ProjectionModel::DirectCompound).unwrap();
        assert!((future - 1_210_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_growth_round_trip() {
        let history = vec![snap(3, 250.0), snap(0, 100.0), snap(17, 900.0)];
        let rate = compute_growth(&history, Metric::Tvl).unwrap();

        assert_eq!(rate.calendar_days, 17);
        let back = project(100.0, &rate, 17, ProjectionModel::DirectCompound).unwrap();
        assert!((back - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_unsorted_history_is_ordered() {
        let history = vec![snap(10, 1_100_000.0), snap(0, 1_000_000.0)];
        let rate = compute_growth(&history, Metric::Points).unwrap();
        assert!(rate.daily_rate_percent > 0.0);
        assert_eq!(rate.from_unix, 1_700_000_000);
    }

    #[test]
    fn test_sub_day_interval_floors_to_one_day() {
        let a = Snapshot::from_figures(1_700_000_000, 100.0, 100.0, 100.0);
        let b = Snapshot::from_figures(1_700_000_000 + 3_600, 110.0, 110.0, 110.0);
        let rate = compute_growth(&[a, b], Metric::Tvl).unwrap();

        assert_eq!(rate.calendar_days, 1);
        assert!((rate.daily_rate_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_baseline_is_undefined() {
        let history = vec![snap(0, 0.0), snap(5, 100.0)];
        assert_eq!(
            compute_growth(&history, Metric::WeightedTvl),
            Err(ProjectionError::UndefinedGrowth {
                metric: Metric::WeightedTvl
            })
        );
    }

    #[test]
    fn test_insufficient_history() {
        assert_eq!(
            compute_growth(&[snap(0, 1.0)], Metric::Tvl),
            Err(ProjectionError::InsufficientHistory { available: 1 })
        );
        assert!(matches!(
            compute_growth(&[], Metric::Tvl),
            Err(ProjectionError::InsufficientHistory { available: 0 })
        ));
    }

    #[test]
    fn test_unavailable_points_skipped() {
        let mut missing = snap(0, 0.0);
        missing.summary.points_status = PointsStatus::Unavailable;
        let history = vec![missing, snap(1, 1_000.0), snap(11, 2_000.0)];

        let rate = compute_growth(&history, Metric::Points).unwrap();
        assert_eq!(rate.calendar_days, 10);
        // TVL still uses every snapshot and sees the zero baseline
        assert!(matches!(
            compute_growth(&history, Metric::Tvl),
            Err(ProjectionError::UndefinedGrowth { .. })
        ));
    }

    #[test]
    fn test_negative_values_rejected() {
        let history = vec![snap(0, -5.0), snap(2, 10.0)];
        assert!(matches!(
            compute_growth(&history, Metric::Tvl),
            Err(ProjectionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_tvl_scaled_zero_growth_is_linear() {
        let rate = GrowthRate::flat(Metric::WeightedTvl, 0.0);
        let future = project(
            500.0,
            &rate,
            30,
            ProjectionModel::TvlScaledEmission {
                daily_emission: 1_000.0,
            },
        )
        .unwrap();
        assert_eq!(future, 500.0 + 1_000.0 * 30.0);
        assert_eq!(average_exponential_multiplier(0.0), 1.0);
    }

    #[test]
    fn test_tvl_scaled_uses_exponential_average() {
        let rate = GrowthRate::flat(Metric::WeightedTvl, 1.0);
        let horizon = 365;
        let g = 1.01f64.powi(horizon as i32);
        let future = project(
            0.0,
            &rate,
            horizon,
            ProjectionModel::TvlScaledEmission { daily_emission: 1.0 },
        )
        .unwrap();

        let expected = (g - 1.0) / g.ln() * horizon as f64;
        assert!((future - expected).abs() < 1e-6);

        // Endpoint averaging overshoots the exact mean for strong growth
        let endpoint = (1.0 + g) / 2.0 * horizon as f64;
        assert!(endpoint > future * 1.5);
        // Emission grows, so the total exceeds the flat case
        assert!(future > horizon as f64);
    }

    #[test]
    fn test_direct_compound_zero_growth() {
        let rate = GrowthRate::flat(Metric::Points, 0.0);
        assert_eq!(project(42.0, &rate, 90, ProjectionModel::DirectCompound), Ok(42.0));
    }

    #[test]
    fn test_stale_points_skipped() {
        let mut stale = snap(20, 2_000.0);
        stale.summary.points_status = PointsStatus::Stale;
        let history = vec![snap(0, 1_000.0), snap(10, 2_000.0), stale];

        let rate = compute_growth(&history, Metric::Points).unwrap();
        assert_eq!(rate.calendar_days, 10);
        assert_eq!(rate.to_unix, 1_700_000_000 + 10 * DAY);
        assert!((rate.daily_rate_percent - 7.1773).abs() < 1e-3);

        // TVL figures in a stale-points snapshot are still live
        assert_eq!(compute_growth(&history, Metric::Tvl).unwrap().calendar_days, 20);
    }

    #[test]
    fn test_long_horizon_stays_finite() {
        let rate = GrowthRate::flat(Metric::WeightedTvl, 0.01);
        let horizon = 3_000_000;
        let future = project(
            0.0,
            &rate,
            horizon,
            ProjectionModel::TvlScaledEmission { daily_emission: 1.0 },
        )
        .unwrap();
        let k = f64::from(horizon) * 1.0001f64.ln();
        assert!(future.is_finite());
        assert!((future / (k.exp_m1() / k * f64::from(horizon)) - 1.0).abs() < 1e-6);

        // Beyond i32::MAX days the exponent must not wrap
        let shrinking = GrowthRate::flat(Metric::Points, -0.5);
        let decayed = project(
            100.0,
            &shrinking,
            3_000_000_000,
            ProjectionModel::DirectCompound,
        )
        .unwrap();
        assert_eq!(decayed, 0.0);
    }

    #[test]
    fn test_unrepresentable_projection_is_an_error() {
        let rate = GrowthRate::flat(Metric::WeightedTvl, 1.0);
        assert_eq!(
            project(
                100.0,
                &rate,
                80_000,
                ProjectionModel::TvlScaledEmission { daily_emission: 1.0 },
            ),
            Err(ProjectionError::Overflow {
                horizon_days: 80_000
            })
        );

        let rate = GrowthRate::flat(Metric::Points, 0.5);
        assert_eq!(
            project(100.0, &rate, 3_000_000_000, ProjectionModel::DirectCompound),
            Err(ProjectionError::Overflow {
                horizon_days: 3_000_000_000
            })
        );
    }

    #[test]
    fn test_zero_horizon_returns_current_total() {
        let rate = GrowthRate::flat(Metric::WeightedTvl, -100.0);
        let model = ProjectionModel::TvlScaledEmission { daily_emission: 5.0 };
        assert_eq!(project(7.0, &rate, 0, model), Ok(7.0));
    }

    #[test]
    fn test_window() {
        let history = vec![snap(0, 1.0), snap(20, 2.0), snap(25, 3.0), snap(30, 4.0)];
        let recent = window(&history, 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].captured_at_unix, 1_700_000_000 + 20 * DAY);
        assert!(window(&[], 10).is_empty());
    }

    #[test]
    fn test_forecast() {
        let history = vec![snap(0, 1_000_000.0), snap(10, 1_100_000.0)];
        let result = forecast(&history, 1_100_000.0, 50_000.0, &[10, 30]).unwrap();

        assert_eq!(result.points.len(), 2);
        let ten = &result.points[0];
        assert!((ten.direct_compound.unwrap() - 1_210_000.0).abs() < 1e-3);
        assert!(ten.tvl_scaled > 1_100_000.0 + 50_000.0 * 10.0);
    }

    #[test]
    fn test_forecast_without_points_growth() {
        let mut a = snap(0, 100.0);
        a.summary.cumulative_points = 0.0;
        let b = snap(10, 200.0);
        let result = forecast(&[a, b], 200.0, 10.0, &[5]).unwrap();

        assert!(result.points_growth.is_none());
        assert!(result.points[0].direct_compound.is_none());
        assert!(result.points[0].tvl_scaled > 200.0);
    }
}
