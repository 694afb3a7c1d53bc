/// Read-only client for the fleet-inventory service: healthy nodes filtered
/// by service type and staleness, and the set of active clusters.
use crate::error::{NavigatorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub cluster_id: String,
    pub cluster_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub node_id: String,
    pub cluster_id: String,
    #[serde(default)]
    pub external_ip: Option<String>,
}

impl Node {
    pub fn has_ip(&self) -> bool {
        self.external_ip.as_deref().is_some_and(|ip| !ip.is_empty())
    }
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Healthy nodes of `service_type`, excluding any last seen more than
    /// `staleness` ago.
    async fn healthy_nodes(&self, service_type: &str, staleness: Duration) -> Result<Vec<Node>>;

    /// All known clusters. Callers must filter on `is_active` themselves -
    /// "active == true" is the single source of truth (§9).
    async fn clusters(&self) -> Result<Vec<Cluster>>;
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct ClustersResponse {
    clusters: Vec<Cluster>,
}

/// HTTP-backed inventory client.
pub struct HttpInventoryClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn healthy_nodes(&self, service_type: &str, staleness: Duration) -> Result<Vec<Node>> {
        let url = format!("{}/nodes", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("service_type", service_type),
                ("max_age_secs", &staleness.as_secs().to_string()),
                ("healthy", "true"),
            ])
            .send()
            .await
            .map_err(|e| NavigatorError::inventory(format!("Failed to fetch nodes: {}", e)))?;

        if !response.status().is_success() {
            return Err(NavigatorError::inventory(format!(
                "Inventory returned HTTP {}",
                response.status()
            )));
        }

        let parsed: NodesResponse = response
            .json()
            .await
            .map_err(|e| NavigatorError::inventory(format!("Invalid nodes response: {}", e)))?;
        Ok(parsed.nodes.into_iter().filter(Node::has_ip).collect())
    }

    async fn clusters(&self) -> Result<Vec<Cluster>> {
        let url = format!("{}/clusters", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| NavigatorError::inventory(format!("Failed to fetch clusters: {}", e)))?;

        if !response.status().is_success() {
            return Err(NavigatorError::inventory(format!(
                "Inventory returned HTTP {}",
                response.status()
            )));
        }

        let parsed: ClustersResponse = response
            .json()
            .await
            .map_err(|e| NavigatorError::inventory(format!("Invalid clusters response: {}", e)))?;
        Ok(parsed.clusters)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;

    #[derive(Default)]
    pub struct FakeInventoryClient {
        pub nodes: Vec<Node>,
        pub clusters: Vec<Cluster>,
    }

    #[async_trait]
    impl InventoryClient for FakeInventoryClient {
        async fn healthy_nodes(&self, service_type: &str, _staleness: Duration) -> Result<Vec<Node>> {
            let _ = service_type;
            Ok(self.nodes.iter().filter(|n| n.has_ip()).cloned().collect())
        }

        async fn clusters(&self) -> Result<Vec<Cluster>> {
            Ok(self.clusters.clone())
        }
    }
}
