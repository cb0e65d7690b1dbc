//! Central aggregation.
//!
//! This module validates a request, dispatches the partial computation to
//! exactly two organizations, joins their summaries and turns each column
//! available at both into a two-sample t-test.

use crate::analysis::distribution::two_tailed_p_value;
use crate::error::{AggregationError, NodeError};
use crate::models::{
    AggregationOutcome, AggregationRequest, ColumnOutcome, ExclusionKind, ExclusionReason,
    OrganizationId, PairwiseTTestResult, PartialRequest, PartialResponseBody, PartialSummary,
    TestMethod,
};
use crate::node::OrganizationNode;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coordinates the two organizations of a comparison.
pub struct Aggregator {
    nodes: HashMap<OrganizationId, Arc<dyn OrganizationNode>>,
    method: TestMethod,
}

impl Aggregator {
    /// Create an aggregator with no organizations registered.
    pub fn new(method: TestMethod) -> Self {
        Self {
            nodes: HashMap::new(),
            method,
        }
    }

    /// Register a node; replaces any node with the same id.
    pub fn register(&mut self, node: Arc<dyn OrganizationNode>) {
        self.nodes.insert(node.id(), node);
    }

    /// Builder form of [`Aggregator::register`].
    #[allow(dead_code)] // Builder utility
    pub fn with_node(mut self, node: Arc<dyn OrganizationNode>) -> Self {
        self.register(node);
        self
    }

    /// Run the full aggregation for `request`.
    pub async fn aggregate(
        &self,
        request: &AggregationRequest,
    ) -> Result<AggregationOutcome, AggregationError> {
        let (org_a, org_b) = validate(request)?;

        let node_a = self.node(org_a)?;
        let node_b = self.node(org_b)?;

        let partial_request = request.partial_request();
        info!(
            "Dispatching partial computation to organizations {} and {} ({} columns requested)",
            org_a,
            org_b,
            request.columns.len()
        );

        let (body_a, body_b) = futures::future::try_join(
            dispatch(node_a, &partial_request),
            dispatch(node_b, &partial_request),
        )
        .await?;
        info!("Received summaries from both organizations");

        let (results, excluded) =
            reconcile(&request.columns, (org_a, &body_a), (org_b, &body_b), self.method);

        Ok(AggregationOutcome {
            organization_a: org_a,
            organization_b: org_b,
            method: self.method,
            results,
            excluded,
        })
    }

    fn node(&self, id: OrganizationId) -> Result<&Arc<dyn OrganizationNode>, AggregationError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AggregationError::PartialComputationFailed {
                organization_id: id,
                cause: NodeError::Transport("organization is not configured".to_string()),
            })
    }
}

/// Check the request names exactly two distinct organizations.
pub fn validate(
    request: &AggregationRequest,
) -> Result<(OrganizationId, OrganizationId), AggregationError> {
    match request.organizations_to_include.as_slice() {
        [a, b] if a != b => Ok((*a, *b)),
        orgs => {
            let distinct: BTreeSet<_> = orgs.iter().collect();
            warn!(
                "Rejecting request with {} organizations ({} distinct)",
                orgs.len(),
                distinct.len()
            );
            Err(AggregationError::InvalidOrganizationCount {
                got: orgs.len(),
                distinct: distinct.len(),
            })
        }
    }
}

async fn dispatch(
    node: &Arc<dyn OrganizationNode>,
    request: &PartialRequest,
) -> Result<PartialResponseBody, AggregationError> {
    let organization_id = node.id();
    let failed = |cause: NodeError| {
        warn!("Organization {} failed: {}", organization_id, cause);
        AggregationError::PartialComputationFailed {
            organization_id,
            cause,
        }
    };

    let body = node.partial(request).await.map_err(failed)?;
    check_summaries(&body).map_err(failed)?;
    Ok(body)
}

/// Reject a response carrying a summary no honest computation can produce.
fn check_summaries(body: &PartialResponseBody) -> Result<(), NodeError> {
    for (column, outcome) in &body.columns {
        if let Some(summary) = outcome.summary() {
            summary
                .check()
                .map_err(|e| NodeError::Protocol(format!("column {}: {}", column, e)))?;
        }
    }
    Ok(())
}

/// Match the two organizations' outcomes column by column.
///
/// With no requested columns the candidates are every column either
/// organization reported. Columns not summarised at both organizations are
/// excluded, attributed to the first organization (in request order) that
/// could not provide them.
pub fn reconcile(
    requested: &[String],
    (org_a, body_a): (OrganizationId, &PartialResponseBody),
    (org_b, body_b): (OrganizationId, &PartialResponseBody),
    method: TestMethod,
) -> (
    BTreeMap<String, PairwiseTTestResult>,
    BTreeMap<String, ExclusionReason>,
) {
    let candidates: BTreeSet<&String> = if requested.is_empty() {
        body_a.columns.keys().chain(body_b.columns.keys()).collect()
    } else {
        requested.iter().collect()
    };

    let mut results = BTreeMap::new();
    let mut excluded = BTreeMap::new();

    for column in candidates {
        let outcome_a = body_a.columns.get(column);
        let outcome_b = body_b.columns.get(column);

        match (defined_summary(outcome_a), defined_summary(outcome_b)) {
            (Some(a), Some(b)) => {
                let result = compare(a, b, method);
                if result.degenerate {
                    info!("Column {}: degenerate comparison (zero standard error)", column);
                } else {
                    debug!("Column {}: p = {:.6}", column, result.p_value);
                }
                results.insert(column.clone(), result);
            }
            _ => {
                let reason = exclusion_kind(outcome_a)
                    .map(|reason| ExclusionReason {
                        reason,
                        organization_id: org_a,
                    })
                    .or_else(|| {
                        exclusion_kind(outcome_b).map(|reason| ExclusionReason {
                            reason,
                            organization_id: org_b,
                        })
                    });

                if let Some(reason) = reason {
                    info!("Excluding column {}: {}", column, reason);
                    excluded.insert(column.clone(), reason);
                }
            }
        }
    }

    (results, excluded)
}

fn defined_summary(outcome: Option<&ColumnOutcome>) -> Option<&PartialSummary> {
    outcome
        .and_then(ColumnOutcome::summary)
        .filter(|summary| summary.is_defined())
}

fn exclusion_kind(outcome: Option<&ColumnOutcome>) -> Option<ExclusionKind> {
    match outcome {
        None => Some(ExclusionKind::MissingAtOrganization),
        Some(ColumnOutcome::Summary(summary)) if !summary.is_defined() => {
            Some(ExclusionKind::Undefined)
        }
        Some(ColumnOutcome::Summary(_)) => None,
        Some(ColumnOutcome::Undefined) => Some(ExclusionKind::Undefined),
        Some(ColumnOutcome::UnknownColumn) => Some(ExclusionKind::UnknownColumn),
        Some(ColumnOutcome::NonNumericColumn) => Some(ExclusionKind::NonNumericColumn),
    }
}

/// Two-sample t-test from the summaries of group A and group B.
///
/// Both summaries must be defined and pass [`PartialSummary::check`].
pub fn compare(a: &PartialSummary, b: &PartialSummary, method: TestMethod) -> PairwiseTTestResult {
    let n_a = a.count as f64;
    let n_b = b.count as f64;
    let mean_difference = a.mean - b.mean;

    let (standard_error, degrees_of_freedom) = match method {
        TestMethod::Welch => {
            let share_a = a.sample_variance / n_a;
            let share_b = b.sample_variance / n_b;
            let combined = share_a + share_b;
            let dof = combined.powi(2)
                / (share_a.powi(2) / (n_a - 1.0) + share_b.powi(2) / (n_b - 1.0));
            (combined.sqrt(), dof)
        }
        TestMethod::Student => {
            let dof = n_a + n_b - 2.0;
            let pooled =
                ((n_a - 1.0) * a.sample_variance + (n_b - 1.0) * b.sample_variance) / dof;
            ((pooled * (1.0 / n_a + 1.0 / n_b)).sqrt(), dof)
        }
    };

    if standard_error == 0.0 {
        return PairwiseTTestResult {
            t_statistic: None,
            degrees_of_freedom: None,
            p_value: 1.0,
            mean_difference,
            count_a: a.count,
            count_b: b.count,
            degenerate: true,
        };
    }

    let t_statistic = mean_difference / standard_error;

    PairwiseTTestResult {
        t_statistic: Some(t_statistic),
        degrees_of_freedom: Some(degrees_of_freedom),
        p_value: two_tailed_p_value(t_statistic, degrees_of_freedom),
        mean_difference,
        count_a: a.count,
        count_b: b.count,
        degenerate: false,
    }
}
