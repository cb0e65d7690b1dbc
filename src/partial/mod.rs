//! Partial statistics computation.
//!
//! Runs inside an organization's boundary and turns its local dataset into
//! per-column sufficient statistics (mean, count, sample variance). Only the
//! output of [`compute`] ever leaves the organization.

use crate::dataset::LocalDataset;
use crate::error::PartialError;
use crate::models::{ColumnOutcome, PartialResponseBody, PartialSummary};
use crate::privacy;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Compute one outcome per effective column.
///
/// The privacy guard runs first on the total record count; when it fails no
/// column is touched. An empty `requested_columns` selects every numeric
/// column of the dataset.
pub fn compute(
    dataset: &LocalDataset,
    requested_columns: &[String],
    minimum_records: u64,
) -> Result<PartialResponseBody, PartialError> {
    let decision = privacy::evaluate(dataset.record_count(), minimum_records);
    if !decision.passed {
        warn!("Privacy guard refused release: {}", decision.reason);
    } else {
        debug!("Privacy guard passed: {}", decision.reason);
    }
    decision.into_result()?;

    let mut columns = BTreeMap::new();

    for name in resolve_columns(dataset, requested_columns) {
        let outcome = summarize_column(dataset, &name);
        match outcome {
            ColumnOutcome::Undefined => info!("Skipping {} due to insufficient data", name),
            ColumnOutcome::UnknownColumn => info!("Column {} does not exist", name),
            ColumnOutcome::NonNumericColumn => info!("Column {} is not numeric", name),
            ColumnOutcome::Summary(_) => debug!("Computed summary for {}", name),
        }
        columns.insert(name, outcome);
    }

    Ok(PartialResponseBody { columns })
}

/// The effective column list: explicit request, or every numeric column.
fn resolve_columns(dataset: &LocalDataset, requested_columns: &[String]) -> Vec<String> {
    if requested_columns.is_empty() {
        dataset.numeric_columns()
    } else {
        requested_columns.to_vec()
    }
}

fn summarize_column(dataset: &LocalDataset, name: &str) -> ColumnOutcome {
    let Some(column) = dataset.column(name) else {
        return ColumnOutcome::UnknownColumn;
    };
    let Some(values) = column.numeric_values() else {
        return ColumnOutcome::NonNumericColumn;
    };

    let values: Vec<f64> = values.collect();
    match sample_statistics(&values) {
        Some(summary) => ColumnOutcome::Summary(summary),
        None => ColumnOutcome::Undefined,
    }
}

/// Mean and unbiased sample variance. `None` with fewer than two values.
pub fn sample_statistics(values: &[f64]) -> Option<PartialSummary> {
    let count = values.len();
    if count < 2 {
        return None;
    }

    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();

    Some(PartialSummary {
        mean,
        count: count as u64,
        sample_variance: sum_squares / (n - 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn dataset() -> LocalDataset {
        LocalDataset::with_rows(8)
            .with_numeric(
                "score",
                [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().map(Some).collect(),
            )
            .unwrap()
            .with_numeric(
                "sparse",
                vec![None, None, Some(3.0), None, None, None, None, None],
            )
            .unwrap()
            .with_text("site", vec![Some("x".to_string()); 8])
            .unwrap()
    }

    #[test]
    fn test_sample_variance_fixture() {
        let summary = sample_statistics(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(approx_eq(summary.mean, 5.0));
        assert_eq!(summary.count, 8);
        assert!(approx_eq(summary.sample_variance, 32.0 / 7.0));
    }

    #[test]
    fn test_sample_statistics_needs_two_values() {
        assert!(sample_statistics(&[]).is_none());
        assert!(sample_statistics(&[1.0]).is_none());
        assert!(sample_statistics(&[1.0, 1.0]).is_some());
    }

    #[test]
    fn test_default_columns_are_numeric_only() {
        let body = compute(&dataset(), &[], 3).unwrap();

        let names: Vec<&String> = body.columns.keys().collect();
        assert_eq!(names, vec!["score", "sparse"]);
        assert_eq!(body.columns["sparse"], ColumnOutcome::Undefined);
        assert!(body.columns["score"].summary().is_some());
    }

    #[test]
    fn test_requested_column_resolution() {
        let requested = vec![
            "score".to_string(),
            "site".to_string(),
            "height".to_string(),
        ];
        let body = compute(&dataset(), &requested, 3).unwrap();

        assert_eq!(body.columns.len(), 3);
        assert_eq!(body.columns["site"], ColumnOutcome::NonNumericColumn);
        assert_eq!(body.columns["height"], ColumnOutcome::UnknownColumn);
        assert!(approx_eq(body.columns["score"].summary().unwrap().mean, 5.0));
    }

    #[test]
    fn test_guard_short_circuits() {
        let small = LocalDataset::with_rows(2)
            .with_numeric("x", vec![Some(1.0), Some(2.0)])
            .unwrap();

        assert_eq!(
            compute(&small, &[], 3),
            Err(PartialError::InsufficientRecords { have: 2, need: 3 })
        );
        // Requested columns that do not exist are never inspected.
        assert!(compute(&small, &["nope".to_string()], 3).is_err());
        assert!(compute(&small, &[], 2).is_ok());
    }

    #[test]
    fn test_guard_uses_total_records_not_column_count() {
        // 8 rows pass the guard even though "sparse" has a single value.
        let body = compute(&dataset(), &["sparse".to_string()], 8).unwrap();
        assert_eq!(body.columns["sparse"], ColumnOutcome::Undefined);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let first = compute(&dataset(), &[], 3).unwrap();
        let second = compute(&dataset(), &[], 3).unwrap();
        assert_eq!(first, second);
    }
}
