/// Cluster Reconciler: expands the Smart-Record policy across active clusters
/// and, for edge-like service types, adds per-node leaf records (§4.1 step 4).
use super::manager::{DnsManager, PartialErrors};
use super::sanitize::cluster_slug;
use crate::config::Config;
use crate::error::{NavigatorError, Result};
use crate::inventory::InventoryClient;
use crate::provider::{ProviderGateway, Record};
use crate::types::{cluster_scoped_service_types, is_edge_like};
use std::sync::Arc;

pub struct ClusterReconciler {
    inventory: Arc<dyn InventoryClient>,
    provider: Arc<dyn ProviderGateway>,
    dns_manager: Arc<DnsManager>,
    config: Arc<Config>,
}

impl ClusterReconciler {
    pub fn new(
        inventory: Arc<dyn InventoryClient>,
        provider: Arc<dyn ProviderGateway>,
        dns_manager: Arc<DnsManager>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            inventory,
            provider,
            dns_manager,
            config,
        }
    }

    /// Reconcile every cluster-scoped service type across every active cluster.
    /// Fatal only if the inventory itself is unreachable; per-cluster and
    /// per-record failures accumulate into the returned map instead.
    pub async fn reconcile(&self) -> Result<PartialErrors> {
        let clusters = self
            .inventory
            .clusters()
            .await
            .map_err(|e| NavigatorError::inventory(format!("fetch clusters: {e}")))?;
        let active: Vec<_> = clusters.into_iter().filter(|c| c.is_active).collect();

        let mut partial = PartialErrors::new();
        for cluster in &active {
            let slug = cluster_slug(&cluster.cluster_id, &cluster.cluster_name);
            let cluster_root = format!("{}.{}", slug, self.config.root_domain);

            for service_type in cluster_scoped_service_types() {
                if let Err(e) = self
                    .reconcile_cluster_service(service_type, &cluster.cluster_id, &cluster_root)
                    .await
                {
                    partial.insert(format!("{}:{}", cluster.cluster_id, service_type), e.to_string());
                }
            }
        }

        Ok(partial)
    }

    async fn reconcile_cluster_service(
        &self,
        service_type: &str,
        cluster_id: &str,
        cluster_root: &str,
    ) -> Result<()> {
        let nodes = self
            .inventory
            .healthy_nodes(service_type, self.config.scheduling.stale_age)
            .await
            .map_err(|e| NavigatorError::inventory(format!("fetch nodes for {service_type}: {e}")))?;
        let cluster_nodes: Vec<_> = nodes.into_iter().filter(|n| n.cluster_id == cluster_id).collect();

        let ips: Vec<String> = cluster_nodes
            .iter()
            .filter_map(|n| n.external_ip.clone())
            .collect();

        let aggregate_errors = self.dns_manager.sync(service_type, cluster_root, &ips).await?;
        for (target, detail) in aggregate_errors {
            tracing::warn!(cluster_id, service_type, target = %target, detail = %detail, "partial DNS sync failure");
        }

        if is_edge_like(service_type) {
            self.sync_node_records(service_type, cluster_root, &cluster_nodes)
                .await?;
        }

        Ok(())
    }

    /// Per-node leaf records: `edge-<sanitized-node-id>.<cluster_root>` -> node IP.
    /// Orphaned leaf records for nodes no longer present are removed.
    async fn sync_node_records(
        &self,
        _service_type: &str,
        cluster_root: &str,
        nodes: &[crate::inventory::Node],
    ) -> Result<()> {
        let prefix = "edge-";
        let suffix = format!(".{}", cluster_root);

        let all_records = self
            .provider
            .list_records(None)
            .await
            .map_err(|e| NavigatorError::provider(format!("list records: {e}")))?;
        let leaf_records: Vec<&Record> = all_records
            .iter()
            .filter(|r| r.record_type == "A" && r.name.starts_with(prefix) && r.name.ends_with(&suffix))
            .collect();

        let mut desired_names = Vec::new();
        for node in nodes {
            let Some(ip) = node.external_ip.as_ref() else {
                continue;
            };
            let node_slug = super::sanitize::sanitize(&node.node_id);
            let fqdn = format!("edge-{}.{}", node_slug, cluster_root);
            desired_names.push(fqdn.clone());

            match leaf_records.iter().find(|r| r.name == fqdn) {
                Some(existing) if existing.content == *ip => {}
                Some(existing) => {
                    let mut updated = (*existing).clone();
                    updated.content = ip.clone();
                    self.provider
                        .update_record(&existing.id, &updated)
                        .await
                        .map_err(|e| NavigatorError::provider(format!("update node record {fqdn}: {e}")))?;
                }
                None => {
                    let record = Record {
                        id: String::new(),
                        record_type: "A".to_string(),
                        name: fqdn.clone(),
                        content: ip.clone(),
                        ttl: self.config.scheduling.record_ttl,
                        proxied: false,
                    };
                    self.provider
                        .create_record(&record)
                        .await
                        .map_err(|e| NavigatorError::provider(format!("create node record {fqdn}: {e}")))?;
                }
            }
        }

        for stale in leaf_records.iter().filter(|r| !desired_names.contains(&r.name)) {
            self.provider
                .delete_record(&stale.id)
                .await
                .map_err(|e| NavigatorError::provider(format!("delete stale node record {}: {e}", stale.name)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AcmeEnvironment, ProviderSettings, SchedulingSettings, StorageSettings};
    use crate::inventory::fake::FakeInventoryClient;
    use crate::inventory::{Cluster, Node};
    use crate::provider::fake::FakeProviderGateway;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            service_token: "token".into(),
            root_domain: "example.com".into(),
            cert_allowed_suffixes: vec![],
            proxy_services: vec![],
            acme_env: AcmeEnvironment::Staging,
            brand_contact_email: "a@example.com".into(),
            inventory_endpoint: "http://inventory".into(),
            http_port: 8080,
            grpc_port: 9090,
            storage: StorageSettings {
                database_url: "postgres://x".into(),
                pool_size: 10,
                master_key: vec![0u8; 32],
            },
            provider: ProviderSettings {
                api_token: String::new(),
                zone_id: String::new(),
                account_id: String::new(),
                dns_api_token: String::new(),
            },
            scheduling: SchedulingSettings {
                reconcile_interval: Duration::from_secs(60),
                renewal_interval: Duration::from_secs(86400),
                stale_age: Duration::from_secs(300),
                record_ttl: 60,
                lb_ttl: 60,
                monitor_interval: 60,
                monitor_timeout: 5,
                monitor_retries: 2,
            },
        }
    }

    #[tokio::test]
    async fn per_cluster_sync_creates_cluster_scoped_record_and_node_leaf_records() {
        let inventory = Arc::new(FakeInventoryClient {
            clusters: vec![Cluster {
                cluster_id: "us-east-1".into(),
                cluster_name: "US East".into(),
                is_active: true,
            }],
            nodes: vec![Node {
                node_id: "node-1".into(),
                cluster_id: "us-east-1".into(),
                external_ip: Some("1.2.3.4".into()),
            }],
        });
        let provider = Arc::new(FakeProviderGateway::default());
        let config = Arc::new(test_config());
        let manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
        let reconciler = ClusterReconciler::new(inventory, provider.clone(), manager, config);

        let partial = reconciler.reconcile().await.unwrap();
        assert!(partial.is_empty());

        let records = provider.records.lock().unwrap();
        assert!(records.iter().any(|r| r.name == "edge.us-east-1.example.com"));
        assert!(records.iter().any(|r| r.name == "edge-node-1.us-east-1.example.com"));
    }

    #[tokio::test]
    async fn inactive_clusters_are_skipped() {
        let inventory = Arc::new(FakeInventoryClient {
            clusters: vec![Cluster {
                cluster_id: "stale".into(),
                cluster_name: "Stale".into(),
                is_active: false,
            }],
            nodes: vec![Node {
                node_id: "node-1".into(),
                cluster_id: "stale".into(),
                external_ip: Some("9.9.9.9".into()),
            }],
        });
        let provider = Arc::new(FakeProviderGateway::default());
        let config = Arc::new(test_config());
        let manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
        let reconciler = ClusterReconciler::new(inventory, provider.clone(), manager, config);

        reconciler.reconcile().await.unwrap();
        assert!(provider.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_node_drops_its_leaf_record() {
        let inventory = Arc::new(FakeInventoryClient {
            clusters: vec![Cluster {
                cluster_id: "us-east-1".into(),
                cluster_name: "US East".into(),
                is_active: true,
            }],
            nodes: vec![],
        });
        let provider = Arc::new(FakeProviderGateway::default());
        provider.records.lock().unwrap().push(Record {
            id: "stale-1".into(),
            record_type: "A".into(),
            name: "edge-node-9.us-east-1.example.com".into(),
            content: "5.5.5.5".into(),
            ttl: 60,
            proxied: false,
        });
        let config = Arc::new(test_config());
        let manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
        let reconciler = ClusterReconciler::new(inventory, provider.clone(), manager, config);

        reconciler.reconcile().await.unwrap();
        assert!(provider.records.lock().unwrap().is_empty());
    }
}
