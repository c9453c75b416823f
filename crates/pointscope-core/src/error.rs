//! Error types for valuation and projection

use crate::types::Metric;
use thiserror::Error;

/// Errors from growth-rate and projection arithmetic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// Fewer than two snapshots to compare
    #[error("Insufficient history: need at least 2 snapshots, have {available}")]
    InsufficientHistory { available: usize },

    /// Baseline metric is zero, growth is undefined (distinct from 0% growth)
    #[error("Undefined growth for {metric}: baseline value is zero")]
    UndefinedGrowth { metric: Metric },

    /// Non-finite or negative figures
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Projected total exceeds the `f64` range
    #[error("Projection over {horizon_days} days is too large to represent")]
    Overflow { horizon_days: u32 },
}

/// Row table validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Duplicate row id: {0}")]
    DuplicateId(String),

    #[error("Row {id} has an invalid boost (must be finite and non-negative)")]
    InvalidBoost { id: String },

    #[error("Row {id} splits from unknown parent {parent}")]
    UnknownParent { id: String, parent: String },

    #[error("Row {id} has split fraction {fraction} outside [0, 1]")]
    InvalidFraction { id: String, fraction: f64 },

    #[error("Category {0} has no rows")]
    EmptyCategory(String),

    #[error("Table parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProjectionError::UndefinedGrowth {
            metric: Metric::Points,
        };
        assert!(err.to_string().contains("points"));

        let err = ProjectionError::InsufficientHistory { available: 1 };
        assert!(err.to_string().contains("have 1"));
    }
}
