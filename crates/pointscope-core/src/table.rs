//! # Row Table
//!
//! Strongly-typed, immutable row configuration loaded once at startup.
//!
//! ## Built-in layout
//!
//! ```text
//! USD / ETH market     yt hold (5x)  lp gross (display)  ├ lp fee (3x)
//!                                                        └ lp net (3x)
//!                      pt hold (excluded)
//! USD / ETH locks      yt 3/6/9/12mo (5x × lock)   lp 3/6/9/12mo (3x × lock)
//! Governance locks     gov 3/6mo (2x × lock)
//! ```

use crate::error::TableError;
use crate::types::{
    AmountSource, Boost, Category, InclusionStatus, RowDefinition, RowKind, TvlReport,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Tracked markets: (key, display name)
pub const MARKETS: [(&str, &str); 2] = [("usd", "USD Yield Market"), ("eth", "ETH Yield Market")];

/// Lock buckets for yield and LP tokens with their duration multipliers
pub const LONG_LOCK_BUCKETS: [(&str, f64); 4] =
    [("3mo", 1.25), ("6mo", 1.5), ("9mo", 2.0), ("12mo", 3.0)];

/// Lock buckets for the governance token
pub const SHORT_LOCK_BUCKETS: [(&str, f64); 2] = [("3mo", 1.5), ("6mo", 2.0)];

/// Market carrying governance-token locks
pub const GOVERNANCE_MARKET: &str = "usd";

/// Protocol fee taken from LP positions
pub const LP_FEE_FRACTION: f64 = 0.1;

const YT_BOOST: f64 = 5.0;
const LP_BOOST: f64 = 3.0;
const GOV_BOOST: f64 = 2.0;

/// Ordered set of categories
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowTable {
    pub categories: Vec<Category>,
}

/// A split child whose boost differs from its parent's
#[derive(Clone, Debug, PartialEq)]
pub struct BoostMismatch {
    pub id: String,
    pub parent: String,
    pub child_boost: f64,
    pub parent_boost: f64,
}

/// Raw amounts resolved from a TVL report
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedAmounts {
    pub amounts: BTreeMap<String, f64>,
    /// Rows whose upstream inputs were absent or malformed
    pub missing: Vec<String>,
}

impl RowTable {
    /// Build and validate a table
    pub fn new(categories: Vec<Category>) -> Result<Self, TableError> {
        let table = Self { categories };
        table.validate()?;
        Ok(table)
    }

    /// Parse a TOML override (`[[categories]]` with nested `[[categories.rows]]`)
    pub fn from_toml_str(content: &str) -> Result<Self, TableError> {
        let table: RowTable =
            toml::from_str(content).map_err(|e| TableError::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Built-in table for the two tracked markets
    pub fn builtin() -> Self {
        let mut categories = Vec::new();

        for (market, label) in MARKETS {
            let gross_id = format!("{market}-lp-gross");
            let supply = |kind: &str| AmountSource::Supply {
                market: market.to_string(),
                kind: kind.to_string(),
            };

            categories.push(Category {
                name: label.to_string(),
                rows: vec![
                    RowDefinition::new(
                        format!("{market}-yt-hold"),
                        "YT holdings",
                        RowKind::Row,
                        InclusionStatus::Active,
                        Boost::Simple(YT_BOOST),
                    )
                    .with_source(supply("yt")),
                    RowDefinition::new(
                        gross_id.clone(),
                        "LP position (gross, before fee)",
                        RowKind::Row,
                        InclusionStatus::DisplayOnly,
                        Boost::Simple(LP_BOOST),
                    )
                    .with_source(supply("lp")),
                    RowDefinition::new(
                        format!("{market}-lp-fee"),
                        "LP protocol fee",
                        RowKind::Subrow,
                        InclusionStatus::Active,
                        Boost::Simple(LP_BOOST),
                    )
                    .with_source(AmountSource::Split {
                        parent: gross_id.clone(),
                        fraction: LP_FEE_FRACTION,
                    }),
                    RowDefinition::new(
                        format!("{market}-lp-net"),
                        "LP position (net of fee)",
                        RowKind::Subrow,
                        InclusionStatus::Active,
                        Boost::Simple(LP_BOOST),
                    )
                    .with_source(AmountSource::Split {
                        parent: gross_id,
                        fraction: 1.0 - LP_FEE_FRACTION,
                    }),
                    RowDefinition::new(
                        format!("{market}-pt-hold"),
                        "PT holdings (no rewards)",
                        RowKind::Row,
                        InclusionStatus::Excluded,
                        Boost::Simple(1.0),
                    )
                    .with_source(supply("pt")),
                ],
            });

            let mut locks = lock_rows(market, "yt", YT_BOOST, &LONG_LOCK_BUCKETS);
            locks.extend(lock_rows(market, "lp", LP_BOOST, &LONG_LOCK_BUCKETS));
            categories.push(Category {
                name: format!("{label} locks"),
                rows: locks,
            });
        }

        categories.push(Category {
            name: "Governance locks".to_string(),
            rows: lock_rows(GOVERNANCE_MARKET, "gov", GOV_BOOST, &SHORT_LOCK_BUCKETS),
        });

        Self { categories }
    }

    /// Check id uniqueness, boosts and split references
    pub fn validate(&self) -> Result<(), TableError> {
        let mut seen = HashSet::new();
        let mut sources: HashMap<&str, &AmountSource> = HashMap::new();

        for category in &self.categories {
            if category.rows.is_empty() {
                return Err(TableError::EmptyCategory(category.name.clone()));
            }
            for row in &category.rows {
                if !seen.insert(row.id.as_str()) {
                    return Err(TableError::DuplicateId(row.id.clone()));
                }
                if !row.boost.is_valid() {
                    return Err(TableError::InvalidBoost { id: row.id.clone() });
                }
                sources.insert(row.id.as_str(), &row.source);
            }
        }

        for row in self.rows() {
            if let AmountSource::Split { parent, fraction } = &row.source {
                match sources.get(parent.as_str()) {
                    None | Some(AmountSource::Split { .. }) => {
                        return Err(TableError::UnknownParent {
                            id: row.id.clone(),
                            parent: parent.clone(),
                        });
                    }
                    Some(_) => {}
                }
                if !(0.0..=1.0).contains(fraction) {
                    return Err(TableError::InvalidFraction {
                        id: row.id.clone(),
                        fraction: *fraction,
                    });
                }
            }
        }

        Ok(())
    }

    /// All rows in table order
    pub fn rows(&self) -> impl Iterator<Item = &RowDefinition> {
        self.categories.iter().flat_map(|c| c.rows.iter())
    }

    pub fn get(&self, id: &str) -> Option<&RowDefinition> {
        self.rows().find(|row| row.id == id)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any row reads its amount directly from a TVL report
    pub fn reads_tvl(&self) -> bool {
        self.rows().any(|row| {
            matches!(
                row.source,
                AmountSource::Supply { .. } | AmountSource::LockBucket { .. }
            )
        })
    }

    /// Split children whose effective boost drifted from their parent's
    pub fn boost_mismatches(&self) -> Vec<BoostMismatch> {
        self.rows()
            .filter_map(|row| {
                let AmountSource::Split { parent, .. } = &row.source else {
                    return None;
                };
                let parent_row = self.get(parent)?;
                let child_boost = row.effective_multiplier();
                let parent_boost = parent_row.effective_multiplier();
                (child_boost != parent_boost).then(|| BoostMismatch {
                    id: row.id.clone(),
                    parent: parent.clone(),
                    child_boost,
                    parent_boost,
                })
            })
            .collect()
    }
}

impl Default for RowTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn lock_rows(market: &str, kind: &str, base: f64, buckets: &[(&str, f64)]) -> Vec<RowDefinition> {
    buckets
        .iter()
        .map(|(bucket, multiplier)| {
            RowDefinition::new(
                format!("lock-{market}-{kind}-{bucket}"),
                format!("{} locked {bucket}", kind.to_uppercase()),
                RowKind::Subrow,
                InclusionStatus::Locked,
                Boost::Compound {
                    base,
                    multiplier: *multiplier,
                },
            )
            .with_source(AmountSource::LockBucket {
                market: market.to_string(),
                kind: kind.to_string(),
                bucket: bucket.to_string(),
            })
        })
        .collect()
}

/// Derive per-row raw amounts (USD) from an upstream TVL report
pub fn resolve_raw_amounts(table: &RowTable, report: &TvlReport) -> ResolvedAmounts {
    let mut resolved = ResolvedAmounts::default();

    for row in table.rows() {
        let amount = match &row.source {
            AmountSource::Supply { market, kind } => report
                .market(market)
                .and_then(|m| Some(m.supply(kind)? * m.price(kind)?)),
            AmountSource::LockBucket {
                market,
                kind,
                bucket,
            } => report
                .market(market)
                .and_then(|m| Some(m.locked(kind, bucket)? * m.price(kind)?)),
            AmountSource::Split { .. } | AmountSource::Manual => continue,
        };
        record(&mut resolved, &row.id, amount);
    }

    for row in table.rows() {
        if let AmountSource::Split { parent, fraction } = &row.source {
            let amount = resolved.amounts.get(parent).map(|p| p * fraction);
            record(&mut resolved, &row.id, amount);
        }
    }

    resolved
}

fn record(resolved: &mut ResolvedAmounts, id: &str, amount: Option<f64>) {
    match amount.filter(|v| v.is_finite() && *v >= 0.0) {
        Some(value) => {
            resolved.amounts.insert(id.to_string(), value);
        }
        None => resolved.missing.push(id.to_string()),
    }
}
