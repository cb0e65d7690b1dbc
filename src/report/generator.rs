//! Result formatting.
//!
//! Shapes the aggregator's outcome into the externally reported structure
//! and renders it as JSON or Markdown. No statistics are computed here.

use crate::error::FormatError;
use crate::models::{ExclusionReason, OrganizationId, PairwiseTTestResult, TestMethod};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Report key of the excluded columns, next to the compared columns.
pub const EXCLUDED_COLUMNS_KEY: &str = "excluded_columns";

/// Reported statistics for one compared column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReport {
    pub t_statistic: Option<f64>,
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
    pub mean_difference: f64,
    pub count_a: u64,
    pub count_b: u64,
    pub degenerate: bool,
}

/// The externally reported result: one entry per compared column plus the
/// excluded columns with their reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TTestReport {
    #[serde(flatten)]
    pub columns: BTreeMap<String, ColumnReport>,
    pub excluded_columns: BTreeMap<String, ExclusionReason>,
}

/// Context shown alongside the results in the Markdown report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub organization_a: OrganizationId,
    pub organization_b: OrganizationId,
    pub method: TestMethod,
    pub alpha: f64,
    pub analysis_date: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Build the reported structure.
///
/// Every numeric field must be finite; anything else is an upstream bug and
/// is returned as an error rather than written out. A compared column named
/// like [`EXCLUDED_COLUMNS_KEY`] cannot be represented and is refused.
pub fn format(
    results: &BTreeMap<String, PairwiseTTestResult>,
    excluded: &BTreeMap<String, ExclusionReason>,
) -> Result<TTestReport, FormatError> {
    let mut columns = BTreeMap::new();

    for (name, result) in results {
        if name == EXCLUDED_COLUMNS_KEY {
            return Err(FormatError::ReservedColumnName(name.clone()));
        }

        let finite = |field: &'static str, value: f64| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(FormatError::NonFinite {
                    column: name.clone(),
                    field,
                })
            }
        };

        let report = ColumnReport {
            t_statistic: result
                .t_statistic
                .map(|v| finite("t_statistic", v))
                .transpose()?,
            degrees_of_freedom: result
                .degrees_of_freedom
                .map(|v| finite("degrees_of_freedom", v))
                .transpose()?,
            p_value: finite("p_value", result.p_value)?,
            mean_difference: finite("mean_difference", result.mean_difference)?,
            count_a: result.count_a,
            count_b: result.count_b,
            degenerate: result.degenerate,
        };
        columns.insert(name.clone(), report);
    }

    Ok(TTestReport {
        columns,
        excluded_columns: excluded.clone(),
    })
}

/// Generate a JSON report.
pub fn generate_json_report(report: &TTestReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &TTestReport, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Federated t-test Report\n\n");
    output.push_str(&generate_metadata_section(metadata));
    output.push_str(&generate_results_section(report, metadata.alpha));
    output.push_str(&generate_excluded_section(&report.excluded_columns));
    output.push_str("---\n\n");
    output.push_str("*Only per-column mean, count and sample variance left each organization.*\n");

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Organizations:** {} (A) vs {} (B)\n",
        metadata.organization_a, metadata.organization_b
    ));
    section.push_str(&format!("- **Method:** {}\n", metadata.method));
    section.push_str(&format!("- **Significance Level:** {}\n", metadata.alpha));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_results_section(report: &TTestReport, alpha: f64) -> String {
    let mut section = String::new();

    section.push_str("## Results\n\n");

    if report.columns.is_empty() {
        section.push_str("No column could be compared across both organizations.\n\n");
        return section;
    }

    section.push_str("| Column | Mean Difference | t | df | p-value | n (A) | n (B) | Significant |\n");
    section.push_str("|:---|---:|---:|---:|---:|---:|---:|:---:|\n");

    for (name, column) in &report.columns {
        let optional = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
        let significant = if column.degenerate {
            "degenerate"
        } else if column.p_value < alpha {
            "yes"
        } else {
            "no"
        };

        section.push_str(&format!(
            "| `{}` | {:.4} | {} | {} | {:.4} | {} | {} | {} |\n",
            name,
            column.mean_difference,
            optional(column.t_statistic),
            optional(column.degrees_of_freedom),
            column.p_value,
            column.count_a,
            column.count_b,
            significant
        ));
    }
    section.push('\n');

    section
}

fn generate_excluded_section(excluded: &BTreeMap<String, ExclusionReason>) -> String {
    if excluded.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Excluded Columns\n\n");
    section.push_str("| Column | Reason | Organization |\n");
    section.push_str("|:---|:---|:---:|\n");

    for (name, reason) in excluded {
        section.push_str(&format!(
            "| `{}` | {} | {} |\n",
            name, reason.reason, reason.organization_id
        ));
    }
    section.push('\n');

    section
}
