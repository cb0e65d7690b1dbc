//! Organization nodes.
//!
//! The aggregator reaches each organization through [`OrganizationNode`].
//! [`LocalNode`] runs the partial computation in-process against a dataset
//! the organization owns; [`HttpNode`] forwards the call to a remote data
//! station over HTTP.

use crate::dataset::LocalDataset;
use crate::error::{NodeError, PartialError};
use crate::models::{OrganizationId, PartialRequest, PartialResponse, PartialResponseBody};
use crate::partial;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A party that can answer partial computation calls.
#[async_trait]
pub trait OrganizationNode: Send + Sync {
    /// Identifier of the organization behind this node.
    fn id(&self) -> OrganizationId;

    /// Run the partial computation for `request`.
    async fn partial(&self, request: &PartialRequest) -> Result<PartialResponseBody, NodeError>;
}

/// In-process node holding an organization's dataset.
pub struct LocalNode {
    id: OrganizationId,
    dataset: Arc<LocalDataset>,
    minimum_records: u64,
    timeout: Duration,
}

impl LocalNode {
    pub fn new(
        id: OrganizationId,
        dataset: LocalDataset,
        minimum_records: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            dataset: Arc::new(dataset),
            minimum_records,
            timeout,
        }
    }
}

#[async_trait]
impl OrganizationNode for LocalNode {
    fn id(&self) -> OrganizationId {
        self.id
    }

    async fn partial(&self, request: &PartialRequest) -> Result<PartialResponseBody, NodeError> {
        debug!("Organization {}: running local partial computation", self.id);

        let dataset = Arc::clone(&self.dataset);
        let columns = request.columns.clone().unwrap_or_default();
        let minimum = self.minimum_records;

        let task = tokio::task::spawn_blocking(move || partial::compute(&dataset, &columns, minimum));

        let joined = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| NodeError::Timeout(self.timeout.as_secs()))?;
        let result = joined.map_err(|e| NodeError::Transport(format!("worker failed: {}", e)))?;

        Ok(result?)
    }
}

/// Remote data station reached over HTTP.
pub struct HttpNode {
    id: OrganizationId,
    endpoint: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl HttpNode {
    /// Create a node for `endpoint`; calls go to `{endpoint}/partial`.
    pub fn new(id: OrganizationId, endpoint: &str, timeout_seconds: u64) -> Result<Self, NodeError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| NodeError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            id,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout_seconds,
            http_client,
        })
    }

    fn url(&self) -> String {
        format!("{}/partial", self.endpoint)
    }
}

#[async_trait]
impl OrganizationNode for HttpNode {
    fn id(&self) -> OrganizationId {
        self.id
    }

    async fn partial(&self, request: &PartialRequest) -> Result<PartialResponseBody, NodeError> {
        let url = self.url();
        info!("Organization {}: dispatching partial computation to {}", self.id, url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NodeError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    NodeError::Transport(format!("cannot connect to {}", self.endpoint))
                } else {
                    NodeError::Transport(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Transport(format!("failed to read response: {}", e)))?;

        parse_response(status, &body)
    }
}

/// Decode a partial computation response.
///
/// Guard and dataset errors arrive as a typed payload, whatever the status.
fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<PartialResponseBody, NodeError> {
    match serde_json::from_str::<PartialResponse>(body) {
        Ok(parsed) => {
            let result: Result<PartialResponseBody, PartialError> = parsed.into();
            Ok(result?)
        }
        Err(_) if !status.is_success() => Err(NodeError::Transport(format!(
            "organization returned {}: {}",
            status, body
        ))),
        Err(e) => Err(NodeError::Protocol(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnOutcome;

    fn dataset(rows: usize) -> LocalDataset {
        LocalDataset::with_rows(rows)
            .with_numeric("age", (0..rows).map(|i| Some(20.0 + i as f64)).collect())
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_node_computes_summary() {
        let node = LocalNode::new(1, dataset(5), 3, Duration::from_secs(5));
        let body = node.partial(&PartialRequest::default()).await.unwrap();

        let summary = body.columns["age"].summary().copied().unwrap();
        assert_eq!(summary.count, 5);
        assert!((summary.mean - 22.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_local_node_reports_guard_failure() {
        let node = LocalNode::new(4, dataset(2), 3, Duration::from_secs(5));
        let err = node.partial(&PartialRequest::default()).await.unwrap_err();

        assert!(matches!(
            err,
            NodeError::Rejected(PartialError::InsufficientRecords { have: 2, need: 3 })
        ));
    }

    #[tokio::test]
    async fn test_local_node_honours_requested_columns() {
        let node = LocalNode::new(1, dataset(5), 3, Duration::from_secs(5));
        let request = PartialRequest {
            columns: Some(vec!["bmi".to_string()]),
        };
        let body = node.partial(&request).await.unwrap();

        assert_eq!(body.columns.len(), 1);
        assert_eq!(body.columns["bmi"], ColumnOutcome::UnknownColumn);
    }

    #[test]
    fn test_http_node_url() {
        let node = HttpNode::new(2, "http://station-b:8080/", 30).unwrap();
        assert_eq!(node.id(), 2);
        assert_eq!(node.url(), "http://station-b:8080/partial");
    }

    #[test]
    fn test_parse_response_variants() {
        let ok = r#"{"status":"ok","columns":{"age":{"status":"summary","mean":30.0,"count":10,"sample_variance":25.0}}}"#;
        let body = parse_response(reqwest::StatusCode::OK, ok).unwrap();
        assert_eq!(body.columns["age"].summary().unwrap().count, 10);

        let rejected = r#"{"status":"error","error":{"kind":"insufficient_records","have":1,"need":3}}"#;
        let err = parse_response(reqwest::StatusCode::UNPROCESSABLE_ENTITY, rejected).unwrap_err();
        assert!(matches!(err, NodeError::Rejected(_)));

        let err = parse_response(reqwest::StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(matches!(err, NodeError::Transport(_)));

        let err = parse_response(reqwest::StatusCode::OK, "{}").unwrap_err();
        assert!(matches!(err, NodeError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_http_node_unreachable_is_transport_error() {
        // Reserve a free port, then release it so nothing listens there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let node = HttpNode::new(2, &format!("http://127.0.0.1:{}", port), 2).unwrap();
        let err = node.partial(&PartialRequest::default()).await.unwrap_err();
        assert!(matches!(err, NodeError::Transport(_) | NodeError::Timeout(_)));
    }
}
