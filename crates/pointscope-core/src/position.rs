//! Points accrual estimate for a hypothetical deposit into one row

use crate::types::RowDefinition;
use crate::valuation::Evaluation;
use crate::POINTS_PER_WEIGHTED_UNIT_PER_DAY;
use serde::{Deserialize, Serialize};

/// Calculator output for a single position
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub row_id: String,
    pub deposit: f64,
    pub effective_multiplier: f64,
    pub weighted_value: f64,
    pub daily_points: f64,
    pub points_over_horizon: f64,
    /// Share of weighted TVL once the deposit is added
    pub share_of_total_percent: f64,
}

/// Estimate points earned by depositing `deposit` (USD) into `row` for `horizon_days`
pub fn estimate_position(
    row: &RowDefinition,
    deposit: f64,
    evaluation: &Evaluation,
    horizon_days: u32,
) -> PositionEstimate {
    let deposit = deposit.max(0.0);
    let effective_multiplier = row.effective_multiplier();
    let weighted_value = if row.inclusion.counts_toward_total() {
        deposit * effective_multiplier
    } else {
        0.0
    };
    let daily_points = weighted_value * POINTS_PER_WEIGHTED_UNIT_PER_DAY;
    let new_total = evaluation.total_weighted + weighted_value;
    let share_of_total_percent = if new_total > 0.0 {
        100.0 * weighted_value / new_total
    } else {
        0.0
    };

    PositionEstimate {
        row_id: row.id.clone(),
        deposit,
        effective_multiplier,
        weighted_value,
        daily_points,
        points_over_horizon: daily_points * horizon_days as f64,
        share_of_total_percent,
    }
}
