//! Error types for the partial computation, dispatch and aggregation.
//!
//! Per-column problems (unknown, non-numeric, undefined) are not errors;
//! they travel as [`crate::models::ColumnOutcome`] values instead.

use crate::models::OrganizationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of an organization's partial computation as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialError {
    /// The privacy guard refused to release any summary.
    #[error("insufficient records: have {have}, need at least {need}")]
    InsufficientRecords { have: u64, need: u64 },

    /// The local dataset could not be read.
    #[error("dataset unavailable: {message}")]
    Dataset { message: String },
}

/// Failure of a single dispatch call to an organization.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("rejected by organization: {0}")]
    Rejected(#[from] PartialError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no response within {0}s")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Fatal errors of the central aggregation.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Not exactly two distinct organizations. No dispatch occurs.
    #[error("exactly two distinct organizations are required, got {got} ({distinct} distinct)")]
    InvalidOrganizationCount { got: usize, distinct: usize },

    #[error("partial computation failed at organization {organization_id}: {cause}")]
    PartialComputationFailed {
        organization_id: OrganizationId,
        #[source]
        cause: NodeError,
    },
}

/// Errors raised while loading a local dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset has no header row")]
    Empty,

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("column {column} has {got} values, expected {expected}")]
    RaggedColumn {
        column: String,
        got: usize,
        expected: usize,
    },
}

/// Raised by the formatter when an upstream value is not finite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("non-finite {field} for column {column}")]
    NonFinite { column: String, field: &'static str },

    #[error("column name {0:?} collides with a report field")]
    ReservedColumnName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_error_display() {
        let err = PartialError::InsufficientRecords { have: 2, need: 3 };
        assert_eq!(
            err.to_string(),
            "insufficient records: have 2, need at least 3"
        );
    }

    #[test]
    fn test_invalid_count_reports_what_was_given() {
        let err = AggregationError::InvalidOrganizationCount { got: 3, distinct: 2 };
        assert_eq!(
            err.to_string(),
            "exactly two distinct organizations are required, got 3 (2 distinct)"
        );
    }

    #[test]
    fn test_aggregation_error_names_organization() {
        let err = AggregationError::PartialComputationFailed {
            organization_id: 7,
            cause: NodeError::Rejected(PartialError::InsufficientRecords { have: 1, need: 3 }),
        };
        let message = err.to_string();
        assert!(message.contains("organization 7"));
        assert!(message.contains("insufficient records"));
    }
}
