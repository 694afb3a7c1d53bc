/// Reconciliation Worker: on a fixed tick, flat-syncs every configured
/// service type and expands cluster-scoped ones per cluster (§4.4).
use crate::certificate::CertificateManager;
use crate::config::Config;
use crate::dns::sanitize::cluster_slug;
use crate::dns::{ClusterReconciler, DnsManager, PartialErrors};
use crate::inventory::{InventoryClient, Node};
use crate::metrics::SharedMetrics;
use crate::types::all_service_types;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ReconciliationWorker {
    inventory: Arc<dyn InventoryClient>,
    dns_manager: Arc<DnsManager>,
    cluster_reconciler: Arc<ClusterReconciler>,
    certificate_manager: Option<Arc<CertificateManager>>,
    config: Arc<Config>,
    metrics: SharedMetrics,
}

impl ReconciliationWorker {
    pub fn new(
        inventory: Arc<dyn InventoryClient>,
        dns_manager: Arc<DnsManager>,
        cluster_reconciler: Arc<ClusterReconciler>,
        certificate_manager: Option<Arc<CertificateManager>>,
        config: Arc<Config>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            inventory,
            dns_manager,
            cluster_reconciler,
            certificate_manager,
            config,
            metrics,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.tick().await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("reconciliation worker stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.scheduling.reconcile_interval) => {}
            }
        }
    }

    pub async fn tick(&self) {
        tracing::info!("reconciliation tick started");
        self.metrics.reconciliations_total.inc();

        for service_type in all_service_types() {
            self.sync_flat(service_type).await;
        }

        match self.cluster_reconciler.reconcile().await {
            Ok(partial) if !partial.is_empty() => {
                tracing::warn!(service = "cluster", ?partial, "cluster reconciliation had partial failures");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "cluster reconciliation failed"),
        }

        self.ensure_cluster_wildcard_certs().await;

        tracing::info!("reconciliation tick finished");
    }

    async fn sync_flat(&self, service_type: &str) {
        let nodes = match self
            .inventory
            .healthy_nodes(service_type, self.config.scheduling.stale_age)
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::error!(service_type, error = %e, "failed to list healthy nodes for flat sync");
                return;
            }
        };
        let ips: Vec<String> = nodes
            .into_iter()
            .filter(Node::has_ip)
            .filter_map(|n| n.external_ip)
            .collect();

        match self
            .dns_manager
            .sync(service_type, &self.config.root_domain, &ips)
            .await
        {
            Ok(partial) => {
                if !partial.is_empty() {
                    self.metrics.dns_sync_errors_total.inc_by(partial.len() as u64);
                }
                log_partial(service_type, &partial)
            }
            Err(e) => {
                self.metrics.dns_sync_errors_total.inc();
                tracing::error!(service_type, error = %e, "flat sync failed")
            }
        }
    }

    /// Ensure a wildcard certificate exists for each active cluster, skipping
    /// the `default` sentinel slug and any empty slug (§4.4).
    async fn ensure_cluster_wildcard_certs(&self) {
        let Some(certificate_manager) = &self.certificate_manager else {
            return;
        };

        let clusters = match self.inventory.clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                tracing::error!(error = %e, "failed to list clusters for wildcard cert sweep");
                return;
            }
        };

        for cluster in clusters.into_iter().filter(|c| c.is_active) {
            let slug = cluster_slug(&cluster.cluster_id, &cluster.cluster_name);
            if slug.is_empty() || slug == "default" {
                continue;
            }
            let domain = format!("*.{slug}.{}", self.config.root_domain);
            if let Err(e) = certificate_manager
                .issue_certificate(None, &domain, &self.config.brand_contact_email)
                .await
            {
                tracing::warn!(domain, error = %e, "failed to ensure cluster wildcard certificate");
            }
        }
    }
}

fn log_partial(service_type: &str, partial: &PartialErrors) {
    if !partial.is_empty() {
        tracing::warn!(service_type, ?partial, "flat sync had partial failures");
    }
}
