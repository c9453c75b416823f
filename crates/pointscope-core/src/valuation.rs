//! # Row Valuation Engine
//!
//! Computes per-row weighted values and share-of-total for one evaluation pass.
//!
//! 1. Rows absent from the raw amounts are valued at zero.
//! 2. `effective multiplier = base × multiplier` (compound) or `boost` (simple).
//! 3. `weighted = raw × effective`, forced to zero for `Excluded` rows.
//! 4. Totals sum `Active` and `Locked` rows only.
//! 5. `share = 100 × weighted / total` for counted rows, zero otherwise or when the
//!    total is zero.
//!
//! Gross rows and their fee/net children are valued independently; only the
//! inclusion status keeps a `DisplayOnly` gross row out of the totals.

use crate::display::{format_compact, format_count, format_usd};
use crate::table::RowTable;
use crate::types::{
    CategoryResult, CondensedRow, InclusionStatus, PointsStatus, RowDefinition, RowValue,
    SummaryAggregate, SummaryDisplay,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative points figures from the points source
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointsFigures {
    pub cumulative_points: f64,
    pub participant_count: u64,
}

/// Result of one evaluation pass, in table order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub values: IndexMap<String, RowValue>,
    /// Σ raw amount over counted rows
    pub total_raw: f64,
    /// Σ weighted value over counted rows
    pub total_weighted: f64,
}

/// Value every row against the supplied raw amounts
pub fn evaluate<'a, I>(rows: I, raw_amounts: &BTreeMap<String, f64>) -> Evaluation
where
    I: IntoIterator<Item = &'a RowDefinition>,
{
    let mut values = IndexMap::new();
    let mut counted = Vec::new();
    let mut total_raw = 0.0;
    let mut total_weighted = 0.0;

    for row in rows {
        let raw_amount = raw_amounts.get(&row.id).copied().unwrap_or(0.0);
        let effective_multiplier = row.effective_multiplier();
        let weighted_value = if row.inclusion == InclusionStatus::Excluded {
            0.0
        } else {
            raw_amount * effective_multiplier
        };

        if row.inclusion.counts_toward_total() {
            total_raw += raw_amount;
            total_weighted += weighted_value;
            counted.push(row.id.clone());
        }

        values.insert(
            row.id.clone(),
            RowValue {
                definition_id: row.id.clone(),
                raw_amount,
                effective_multiplier,
                weighted_value,
                share_of_total: 0.0,
            },
        );
    }

    if total_weighted > 0.0 {
        for id in &counted {
            if let Some(value) = values.get_mut(id) {
                value.share_of_total = 100.0 * value.weighted_value / total_weighted;
            }
        }
    }

    tracing::debug!(
        rows = values.len(),
        counted = counted.len(),
        total_weighted,
        "Evaluation pass complete"
    );

    Evaluation {
        values,
        total_raw,
        total_weighted,
    }
}

impl Evaluation {
    pub fn get(&self, id: &str) -> Option<&RowValue> {
        self.values.get(id)
    }

    /// Σ share over the given rows
    pub fn share_sum<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> f64 {
        ids.into_iter()
            .filter_map(|id| self.values.get(id))
            .map(|v| v.share_of_total)
            .sum()
    }

    /// Per-category rows for the persisted `tableCondensed`
    pub fn condensed(&self, table: &RowTable) -> Vec<CategoryResult> {
        table
            .categories
            .iter()
            .map(|category| CategoryResult {
                category: category.name.clone(),
                rows: category
                    .rows
                    .iter()
                    .filter_map(|row| self.values.get(&row.id))
                    .map(|value| CondensedRow {
                        id: value.definition_id.clone(),
                        raw_amount: value.raw_amount,
                        weighted_value: value.weighted_value,
                        share_of_total: value.share_of_total,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Summary aggregate; `None` points are recorded as zero with the given status
    pub fn summary(&self, points: Option<PointsFigures>, status: PointsStatus) -> SummaryAggregate {
        let (cumulative_points, participant_count, points_status) = match points {
            Some(p) => (p.cumulative_points, p.participant_count, status),
            None => (0.0, 0, PointsStatus::Unavailable),
        };

        SummaryAggregate {
            cumulative_points,
            participant_count,
            total_raw_tvl: self.total_raw,
            total_weighted_tvl: self.total_weighted,
            points_status,
            display: SummaryDisplay {
                cumulative_points: format_compact(cumulative_points),
                participant_count: format_count(participant_count),
                total_raw_tvl: format_usd(self.total_raw),
                total_weighted_tvl: format_compact(self.total_weighted),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Boost, RowKind};
    use crate::SHARE_EPSILON;

    fn row(id: &str, inclusion: InclusionStatus, boost: Boost) -> RowDefinition {
        RowDefinition::new(id, id, RowKind::Row, inclusion, boost)
    }

    fn amounts(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_basic_valuation() {
        let rows = vec![row("hold-x", InclusionStatus::Active, Boost::Simple(5.0))];
        let eval = evaluate(&rows, &amounts(&[("hold-x", 1_000.0)]));

        let value = eval.get("hold-x").unwrap();
        assert_eq!(value.weighted_value, 5_000.0);
        assert_eq!(value.share_of_total, 100.0);
    }

    #[test]
    fn test_locked_subrow() {
        let rows = vec![RowDefinition::new(
            "lock-x-3mo",
            "Lock X 3mo",
            RowKind::Subrow,
            InclusionStatus::Locked,
            Boost::Compound {
                base: 5.0,
                multiplier: 6.0,
            },
        )];
        let eval = evaluate(&rows, &amounts(&[("lock-x-3mo", 200.0)]));

        let value = eval.get("lock-x-3mo").unwrap();
        assert_eq!(value.effective_multiplier, 30.0);
        assert_eq!(value.weighted_value, 6_000.0);
    }

    #[test]
    fn test_excluded_rows_never_count() {
        let rows = vec![
            row("pt", InclusionStatus::Excluded, Boost::Simple(50.0)),
            row("yt", InclusionStatus::Active, Boost::Simple(1.0)),
        ];
        let eval = evaluate(&rows, &amounts(&[("pt", 1e9), ("yt", 10.0)]));

        let pt = eval.get("pt").unwrap();
        assert_eq!(pt.weighted_value, 0.0);
        assert_eq!(pt.share_of_total, 0.0);
        assert_eq!(pt.raw_amount, 1e9);
        assert_eq!(eval.total_raw, 10.0);
        assert_eq!(eval.total_weighted, 10.0);
    }

    #[test]
    fn test_display_only_valued_but_not_counted() {
        let rows = vec![
            row("gross", InclusionStatus::DisplayOnly, Boost::Simple(3.0)),
            row("fee", InclusionStatus::Active, Boost::Simple(3.0)),
            row("net", InclusionStatus::Active, Boost::Simple(3.0)),
        ];
        let eval = evaluate(
            &rows,
            &amounts(&[("gross", 1_000.0), ("fee", 100.0), ("net", 900.0)]),
        );

        let gross = eval.get("gross").unwrap();
        assert_eq!(gross.weighted_value, 3_000.0);
        assert_eq!(gross.share_of_total, 0.0);
        assert_eq!(eval.total_weighted, 3_000.0);
        assert!((eval.get("net").unwrap().share_of_total - 90.0).abs() < SHARE_EPSILON);
    }

    #[test]
    fn test_shares_sum_to_hundred() {
        let table = RowTable::builtin();
        let raw: BTreeMap<String, f64> = table
            .rows()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), 100.0 * (i as f64 + 1.0)))
            .collect();
        let eval = evaluate(table.rows(), &raw);

        let counted: Vec<&str> = table
            .rows()
            .filter(|r| r.inclusion.counts_toward_total())
            .map(|r| r.id.as_str())
            .collect();
        assert!((eval.share_sum(counted) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_total_safety() {
        let table = RowTable::builtin();
        let eval = evaluate(table.rows(), &BTreeMap::new());

        assert_eq!(eval.total_weighted, 0.0);
        for value in eval.values.values() {
            assert_eq!(value.share_of_total, 0.0);
            assert!(value.share_of_total.is_finite());
        }
    }

    #[test]
    fn test_condensed_follows_table_order() {
        let table = RowTable::builtin();
        let eval = evaluate(table.rows(), &amounts(&[("usd-yt-hold", 10.0)]));
        let condensed = eval.condensed(&table);

        assert_eq!(condensed.len(), table.categories.len());
        assert_eq!(condensed[0].category, "USD Yield Market");
        assert_eq!(condensed[0].rows[0].id, "usd-yt-hold");
        assert_eq!(condensed[0].rows[0].weighted_value, 50.0);
    }

    #[test]
    fn test_summary_without_points() {
        let rows = vec![row("a", InclusionStatus::Active, Boost::Simple(2.0))];
        let eval = evaluate(&rows, &amounts(&[("a", 1_500_000.0)]));
        let summary = eval.summary(None, PointsStatus::Fresh);

        assert_eq!(summary.cumulative_points, 0.0);
        assert_eq!(summary.participant_count, 0);
        assert_eq!(summary.points_status, PointsStatus::Unavailable);
        assert_eq!(summary.total_weighted_tvl, 3_000_000.0);
        assert_eq!(summary.display.total_raw_tvl, "$1.50M");
    }

    #[test]
    fn test_summary_with_points() {
        let rows = vec![row("a", InclusionStatus::Active, Boost::Simple(1.0))];
        let eval = evaluate(&rows, &amounts(&[("a", 1.0)]));
        let summary = eval.summary(
            Some(PointsFigures {
                cumulative_points: 2_000_000.0,
                participant_count: 12_345,
            }),
            PointsStatus::Stale,
        );

        assert_eq!(summary.points_status, PointsStatus::Stale);
        assert_eq!(summary.display.participant_count, "12,345");
        assert_eq!(summary.display.cumulative_points, "2.00M");
    }
}
