//! Data models for the federated t-test.
//!
//! This module contains the request, summary and result structures that
//! flow between the aggregator and the organizations, including the wire
//! types of the partial computation call.

use crate::error::PartialError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an organization (data station).
pub type OrganizationId = u64;

/// Statistical test used to compare the two organizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestMethod {
    /// Welch's unequal-variances t-test
    #[default]
    Welch,
    /// Student's pooled-variance t-test
    Student,
}

impl fmt::Display for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestMethod::Welch => write!(f, "Welch"),
            TestMethod::Student => write!(f, "Student (pooled)"),
        }
    }
}

/// A single invocation of the central aggregation.
///
/// Immutable once built. The organization count is checked by the
/// aggregator, not here, so that malformed requests can still be
/// represented and rejected with a typed error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Ordered organizations to compare; the first is group A.
    pub organizations_to_include: Vec<OrganizationId>,
    /// Requested columns. Empty means "all numeric columns" at each organization.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl AggregationRequest {
    /// Build a request, dropping duplicate column names while keeping order.
    pub fn new(organizations_to_include: Vec<OrganizationId>, columns: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !unique.contains(&column) {
                unique.push(column);
            }
        }

        Self {
            organizations_to_include,
            columns: unique,
        }
    }

    /// The sub-request sent identically to both organizations.
    pub fn partial_request(&self) -> PartialRequest {
        PartialRequest {
            columns: if self.columns.is_empty() {
                None
            } else {
                Some(self.columns.clone())
            },
        }
    }
}

/// Sufficient statistics of one column at one organization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialSummary {
    pub mean: f64,
    pub count: u64,
    /// Bessel-corrected (divisor `count - 1`).
    pub sample_variance: f64,
}

impl PartialSummary {
    /// At least two values, so the variance is defined.
    pub fn is_defined(&self) -> bool {
        self.count >= 2
    }

    /// Reject values no honest computation can produce.
    pub fn check(&self) -> Result<(), String> {
        if !self.mean.is_finite() {
            return Err(format!("non-finite mean {}", self.mean));
        }
        if !self.sample_variance.is_finite() || self.sample_variance < 0.0 {
            return Err(format!("invalid sample variance {}", self.sample_variance));
        }
        Ok(())
    }
}

/// What an organization reports for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ColumnOutcome {
    /// Summary computed from at least two values.
    Summary(PartialSummary),
    /// Fewer than two non-missing values; variance is undefined.
    Undefined,
    /// The column does not exist in the local dataset.
    UnknownColumn,
    /// The column exists but is not numeric.
    NonNumericColumn,
}

impl ColumnOutcome {
    /// Returns the summary if one was computed.
    pub fn summary(&self) -> Option<&PartialSummary> {
        match self {
            ColumnOutcome::Summary(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Outcome of the privacy guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardDecision {
    pub passed: bool,
    pub reason: GuardReason,
}

/// Why the guard passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardReason {
    SufficientRecords { have: u64, need: u64 },
    InsufficientRecords { have: u64, need: u64 },
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardReason::SufficientRecords { have, need } => {
                write!(f, "sufficient records (have {}, need {})", have, need)
            }
            GuardReason::InsufficientRecords { have, need } => {
                write!(f, "insufficient records (have {}, need {})", have, need)
            }
        }
    }
}

/// Request body of the partial computation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// Successful body of the partial computation call: one outcome per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResponseBody {
    pub columns: BTreeMap<String, ColumnOutcome>,
}

/// Response of the partial computation call as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartialResponse {
    Ok(PartialResponseBody),
    Error { error: PartialError },
}

impl From<Result<PartialResponseBody, PartialError>> for PartialResponse {
    fn from(result: Result<PartialResponseBody, PartialError>) -> Self {
        match result {
            Ok(body) => PartialResponse::Ok(body),
            Err(error) => PartialResponse::Error { error },
        }
    }
}

impl From<PartialResponse> for Result<PartialResponseBody, PartialError> {
    fn from(response: PartialResponse) -> Self {
        match response {
            PartialResponse::Ok(body) => Ok(body),
            PartialResponse::Error { error } => Err(error),
        }
    }
}

/// Result of comparing one column across the two organizations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseTTestResult {
    /// `None` when the comparison is degenerate.
    pub t_statistic: Option<f64>,
    /// `None` when the comparison is degenerate.
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
    pub mean_difference: f64,
    pub count_a: u64,
    pub count_b: u64,
    /// Zero standard error; no statistic could be formed.
    pub degenerate: bool,
}

impl PairwiseTTestResult {
    /// Whether the difference is significant at `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        !self.degenerate && self.p_value < alpha
    }
}

/// Why a column did not make it into the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    Undefined,
    UnknownColumn,
    NonNumericColumn,
    /// The organization did not report the column at all.
    MissingAtOrganization,
}

impl fmt::Display for ExclusionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionKind::Undefined => write!(f, "fewer than two values"),
            ExclusionKind::UnknownColumn => write!(f, "unknown column"),
            ExclusionKind::NonNumericColumn => write!(f, "non-numeric column"),
            ExclusionKind::MissingAtOrganization => write!(f, "not reported"),
        }
    }
}

/// An excluded column, attributed to the organization that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionReason {
    pub reason: ExclusionKind,
    pub organization_id: OrganizationId,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at organization {}", self.reason, self.organization_id)
    }
}

/// Internal result of a full aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutcome {
    pub organization_a: OrganizationId,
    pub organization_b: OrganizationId,
    pub method: TestMethod,
    pub results: BTreeMap<String, PairwiseTTestResult>,
    pub excluded: BTreeMap<String, ExclusionReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_dedupes_columns() {
        let request = AggregationRequest::new(
            vec![1, 2],
            vec!["age".to_string(), "bmi".to_string(), "age".to_string()],
        );
        assert_eq!(request.columns, vec!["age", "bmi"]);
    }

    #[test]
    fn test_partial_request_omits_empty_columns() {
        let request = AggregationRequest::new(vec![1, 2], vec![]);
        assert_eq!(request.partial_request().columns, None);
        assert_eq!(serde_json::to_string(&request.partial_request()).unwrap(), "{}");
    }

    #[test]
    fn test_column_outcome_wire_format() {
        let outcome = ColumnOutcome::Summary(PartialSummary {
            mean: 5.0,
            count: 8,
            sample_variance: 4.5,
        });
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["status"], "summary");
        assert_eq!(json["mean"], 5.0);
        assert_eq!(json["count"], 8);

        let undefined = serde_json::to_value(ColumnOutcome::Undefined).unwrap();
        assert_eq!(undefined, serde_json::json!({ "status": "undefined" }));
    }

    #[test]
    fn test_partial_response_error_payload() {
        let response = PartialResponse::from(Err::<PartialResponseBody, _>(
            PartialError::InsufficientRecords { have: 2, need: 3 },
        ));
        let json = serde_json::to_string(&response).unwrap();
        let back: PartialResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
        assert!(json.contains("\"status\":\"error\""));
    }

    #[test]
    fn test_summary_checks() {
        let summary = |mean: f64, count: u64, sample_variance: f64| PartialSummary {
            mean,
            count,
            sample_variance,
        };

        assert!(summary(30.0, 10, 25.0).check().is_ok());
        assert!(summary(30.0, 10, 0.0).check().is_ok());
        assert!(summary(30.0, 10, -1.0).check().is_err());
        assert!(summary(f64::NAN, 10, 1.0).check().is_err());
        assert!(summary(30.0, 10, f64::INFINITY).check().is_err());

        assert!(summary(30.0, 2, 1.0).is_defined());
        assert!(!summary(30.0, 1, 0.0).is_defined());
        assert!(!summary(0.0, 0, 0.0).is_defined());
    }

    #[test]
    fn test_degenerate_is_never_significant() {
        let result = PairwiseTTestResult {
            t_statistic: None,
            degrees_of_freedom: None,
            p_value: 1.0,
            mean_difference: 0.0,
            count_a: 5,
            count_b: 5,
            degenerate: true,
        };
        assert!(!result.is_significant(0.05));
    }
}
