/// DNS Manager: the Smart-Record reconciliation engine (§4.1).
use crate::config::Config;
use crate::error::{NavigatorError, Result};
use crate::keyed_lock::KeyedLocks;
use crate::provider::{LoadBalancer, Monitor, Origin, Pool, ProviderGateway, Record};
use crate::types::service_type_def;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-target failures accumulated alongside a successful top-level result.
/// Keyed by `fqdn` for record/LB-level failures, `fqdn:ip` for origin-level ones.
pub type PartialErrors = HashMap<String, String>;

pub struct DnsManager {
    provider: Arc<dyn ProviderGateway>,
    config: Arc<Config>,
    fqdn_locks: KeyedLocks<String>,
}

impl DnsManager {
    pub fn new(provider: Arc<dyn ProviderGateway>, config: Arc<Config>) -> Self {
        Self {
            provider,
            config,
            fqdn_locks: KeyedLocks::new(),
        }
    }

    /// Converge the provider toward the desired IP set for `service_type` at
    /// `root` (the caller-supplied zone root, already including any cluster prefix).
    pub async fn sync(
        &self,
        service_type: &str,
        root: &str,
        ips: &[String],
    ) -> Result<PartialErrors> {
        let def = service_type_def(service_type)
            .ok_or_else(|| NavigatorError::invalid_input(format!("unknown service type: {service_type}")))?;

        let fqdn = if def.subdomain == "@" {
            root.to_string()
        } else {
            format!("{}.{}", def.subdomain, root)
        };

        // Belt-and-braces: serialise concurrent syncs of the same fqdn so two
        // overlapping reconciliation passes can't race each other's read-then-act steps.
        let _guard = self.fqdn_locks.lock(fqdn.clone()).await;

        let proxied = self.config.is_proxied(service_type);
        let mut distinct: Vec<String> = ips.to_vec();
        distinct.sort();
        distinct.dedup();

        match distinct.len() {
            0 => self.clear(&fqdn).await,
            1 => self.single_node(&fqdn, &distinct[0], proxied).await,
            _ => self.multi_node(service_type, &fqdn, &distinct, def.health_port, proxied).await,
        }
    }

    async fn clear(&self, fqdn: &str) -> Result<PartialErrors> {
        tracing::warn!(fqdn, "no healthy IPs, clearing DNS state");
        let mut partial = PartialErrors::new();

        if let Some(lb) = self.find_lb(fqdn).await? {
            if let Err(e) = self.provider.delete_load_balancer(&lb.id).await {
                partial.insert(fqdn.to_string(), e.to_string());
            }
        }

        let records = self
            .provider
            .list_records(Some(fqdn))
            .await
            .map_err(|e| NavigatorError::provider(format!("list records for {fqdn}: {e}")))?;
        for record in records.iter().filter(|r| r.record_type == "A" || r.record_type == "CNAME") {
            if let Err(e) = self.provider.delete_record(&record.id).await {
                partial.insert(fqdn.to_string(), e.to_string());
            }
        }

        Ok(partial)
    }

    async fn single_node(&self, fqdn: &str, ip: &str, proxied: bool) -> Result<PartialErrors> {
        let records = self
            .provider
            .list_records(Some(fqdn))
            .await
            .map_err(|e| NavigatorError::provider(format!("list records for {fqdn}: {e}")))?;

        let desired = Record {
            id: String::new(),
            record_type: "A".to_string(),
            name: fqdn.to_string(),
            content: ip.to_string(),
            ttl: self.config.scheduling.record_ttl,
            proxied,
        };

        let mut a_records: Vec<&Record> = records.iter().filter(|r| r.record_type == "A").collect();
        let keep = a_records.pop();

        match keep {
            None => {
                self.provider
                    .create_record(&desired)
                    .await
                    .map_err(|e| NavigatorError::provider(format!("create record {fqdn}: {e}")))?;
            }
            Some(existing)
                if existing.content != desired.content
                    || existing.proxied != desired.proxied
                    || existing.ttl != desired.ttl =>
            {
                self.provider
                    .update_record(&existing.id, &desired)
                    .await
                    .map_err(|e| NavigatorError::provider(format!("update record {fqdn}: {e}")))?;
            }
            _ => {}
        }

        let mut partial = PartialErrors::new();
        for extra in a_records {
            if let Err(e) = self.provider.delete_record(&extra.id).await {
                partial.insert(fqdn.to_string(), e.to_string());
            }
        }
        for cname in records.iter().filter(|r| r.record_type == "CNAME") {
            if let Err(e) = self.provider.delete_record(&cname.id).await {
                partial.insert(fqdn.to_string(), e.to_string());
            }
        }

        if let Some(lb) = self.find_lb(fqdn).await? {
            if let Err(e) = self.provider.delete_load_balancer(&lb.id).await {
                tracing::warn!(fqdn, error = %e, "failed to remove stale load balancer");
            }
        }

        Ok(partial)
    }

    async fn multi_node(
        &self,
        service_type: &str,
        fqdn: &str,
        ips: &[String],
        health_port: u16,
        proxied: bool,
    ) -> Result<PartialErrors> {
        let mut partial = PartialErrors::new();

        let monitor_id = self.ensure_monitor(service_type, health_port).await;
        let pool_name = format!("nav-{}-{}", service_type, fqdn.replace('.', "-"));
        let pool_id = self.ensure_pool(&pool_name, &monitor_id, ips).await?;
        self.diff_origins(fqdn, &pool_id, ips, &mut partial).await;
        self.ensure_load_balancer(fqdn, &pool_id, proxied).await?;

        let records = self
            .provider
            .list_records(Some(fqdn))
            .await
            .map_err(|e| NavigatorError::provider(format!("list records for {fqdn}: {e}")))?;
        for record in records.iter().filter(|r| r.record_type == "A" || r.record_type == "CNAME") {
            if let Err(e) = self.provider.delete_record(&record.id).await {
                partial.insert(format!("{fqdn}:{}", record.content), e.to_string());
            }
        }

        Ok(partial)
    }

    async fn ensure_monitor(&self, service_type: &str, health_port: u16) -> String {
        let description = format!("nav-{}-health", service_type);
        let existing = self.provider.list_monitors().await.ok();
        if let Some(m) = existing
            .as_ref()
            .and_then(|ms| ms.iter().find(|m| m.description == description))
        {
            return m.id.clone();
        }

        let monitor = Monitor {
            id: String::new(),
            description: description.clone(),
            monitor_type: "http".to_string(),
            method: "GET".to_string(),
            path: "/health".to_string(),
            port: health_port,
            interval: self.config.scheduling.monitor_interval,
            timeout: self.config.scheduling.monitor_timeout,
            retries: self.config.scheduling.monitor_retries,
            expected_codes: "200".to_string(),
        };

        match self.provider.create_monitor(&monitor).await {
            Ok(created) => created.id,
            Err(e) => {
                tracing::warn!(description = %description, error = %e, "failed to create health monitor, proceeding without one");
                String::new()
            }
        }
    }

    async fn ensure_pool(&self, pool_name: &str, monitor_id: &str, ips: &[String]) -> Result<String> {
        let pools = self
            .provider
            .list_pools()
            .await
            .map_err(|e| NavigatorError::provider(format!("list pools: {e}")))?;

        if let Some(existing) = pools.iter().find(|p| p.name == pool_name) {
            if !monitor_id.is_empty() && existing.monitor != monitor_id {
                let mut updated = existing.clone();
                updated.monitor = monitor_id.to_string();
                if let Err(e) = self.provider.update_pool(&existing.id, &updated).await {
                    tracing::warn!(pool = pool_name, error = %e, "failed to attach monitor to pool");
                }
            }
            return Ok(existing.id.clone());
        }

        let pool = Pool {
            id: String::new(),
            name: pool_name.to_string(),
            description: format!("origins for {}", pool_name),
            enabled: true,
            minimum_origins: 1,
            origins: ips.iter().map(|ip| Origin::for_ip(ip)).collect(),
            monitor: monitor_id.to_string(),
        };
        let created = self
            .provider
            .create_pool(&pool)
            .await
            .map_err(|e| NavigatorError::provider(format!("create pool {pool_name}: {e}")))?;
        Ok(created.id)
    }

    async fn diff_origins(&self, fqdn: &str, pool_id: &str, desired_ips: &[String], partial: &mut PartialErrors) {
        let pool = match self.provider.get_pool(pool_id).await {
            Ok(p) => p,
            Err(e) => {
                partial.insert(fqdn.to_string(), e.to_string());
                return;
            }
        };

        for origin in &pool.origins {
            if !desired_ips.contains(&origin.address) {
                if let Err(e) = self.provider.remove_origin(pool_id, &origin.name).await {
                    partial.insert(format!("{}:{}", fqdn, origin.address), e.to_string());
                }
            }
        }

        let live: Vec<&String> = pool.origins.iter().map(|o| &o.address).collect();
        for ip in desired_ips {
            if !live.contains(&ip) {
                if let Err(e) = self.provider.add_origin(pool_id, &Origin::for_ip(ip)).await {
                    partial.insert(format!("{}:{}", fqdn, ip), e.to_string());
                }
            }
        }
    }

    async fn ensure_load_balancer(&self, fqdn: &str, pool_id: &str, proxied: bool) -> Result<()> {
        match self.find_lb(fqdn).await? {
            None => {
                let lb = LoadBalancer {
                    id: String::new(),
                    name: fqdn.to_string(),
                    ttl: self.config.scheduling.lb_ttl,
                    fallback_pool: pool_id.to_string(),
                    default_pools: vec![pool_id.to_string()],
                    proxied,
                    enabled: true,
                    steering_policy: "geo".to_string(),
                };
                self.provider
                    .create_load_balancer(&lb)
                    .await
                    .map_err(|e| NavigatorError::provider(format!("create lb {fqdn}: {e}")))?;
            }
            Some(existing) => {
                let needs_update = existing.fallback_pool != pool_id
                    || existing.default_pools != vec![pool_id.to_string()]
                    || existing.ttl != self.config.scheduling.lb_ttl
                    || existing.proxied != proxied;
                if needs_update {
                    let mut updated = existing.clone();
                    updated.fallback_pool = pool_id.to_string();
                    updated.default_pools = vec![pool_id.to_string()];
                    updated.ttl = self.config.scheduling.lb_ttl;
                    updated.proxied = proxied;
                    self.provider
                        .update_load_balancer(&existing.id, &updated)
                        .await
                        .map_err(|e| NavigatorError::provider(format!("update lb {fqdn}: {e}")))?;
                }
            }
        }
        Ok(())
    }

    async fn find_lb(&self, fqdn: &str) -> Result<Option<LoadBalancer>> {
        let lbs = self
            .provider
            .list_load_balancers()
            .await
            .map_err(|e| NavigatorError::provider(format!("list load balancers: {e}")))?;
        Ok(lbs.into_iter().find(|lb| lb.name == fqdn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, SchedulingSettings, StorageSettings};
    use crate::provider::fake::FakeProviderGateway;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            service_token: "token".into(),
            root_domain: "example.com".into(),
            cert_allowed_suffixes: vec![],
            proxy_services: vec![],
            acme_env: crate::config::AcmeEnvironment::Staging,
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
    async fn empty_desired_set_clears_records_and_lb() {
        let provider = Arc::new(FakeProviderGateway::default());
        provider.records.lock().unwrap().push(Record {
            id: "r1".into(),
            record_type: "A".into(),
            name: "edge.example.com".into(),
            content: "1.2.3.4".into(),
            ttl: 60,
            proxied: false,
        });
        provider.load_balancers.lock().unwrap().push(LoadBalancer {
            id: "lb1".into(),
            name: "edge.example.com".into(),
            ttl: 60,
            fallback_pool: "p1".into(),
            default_pools: vec!["p1".into()],
            proxied: false,
            enabled: true,
            steering_policy: "geo".into(),
        });

        let manager = DnsManager::new(provider.clone(), Arc::new(test_config()));
        let partial = manager.sync("edge", "example.com", &[]).await.unwrap();

        assert!(partial.is_empty());
        assert!(provider.records.lock().unwrap().is_empty());
        assert!(provider.load_balancers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_ip_creates_one_a_record() {
        let provider = Arc::new(FakeProviderGateway::default());
        let manager = DnsManager::new(provider.clone(), Arc::new(test_config()));

        manager
            .sync("edge", "example.com", &["1.2.3.4".to_string()])
            .await
            .unwrap();

        let records = provider.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "1.2.3.4");
        assert_eq!(records[0].name, "edge.example.com");
    }

    #[tokio::test]
    async fn scale_up_to_two_creates_pool_and_lb_and_removes_a_record() {
        let provider = Arc::new(FakeProviderGateway::default());
        provider.records.lock().unwrap().push(Record {
            id: "r1".into(),
            record_type: "A".into(),
            name: "edge.example.com".into(),
            content: "1.2.3.4".into(),
            ttl: 60,
            proxied: false,
        });

        let manager = DnsManager::new(provider.clone(), Arc::new(test_config()));
        let partial = manager
            .sync(
                "edge",
                "example.com",
                &["1.2.3.4".to_string(), "5.6.7.8".to_string()],
            )
            .await
            .unwrap();

        assert!(partial.is_empty());
        assert!(provider.records.lock().unwrap().is_empty());
        assert_eq!(provider.pools.lock().unwrap().len(), 1);
        assert_eq!(provider.pools.lock().unwrap()[0].origins.len(), 2);
        assert_eq!(provider.load_balancers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn partial_origin_failures_are_reported_without_failing_the_sync() {
        let provider = Arc::new(FakeProviderGateway::default());
        let pool = Pool {
            id: "p1".into(),
            name: "nav-edge-edge-example-com".into(),
            description: String::new(),
            enabled: true,
            minimum_origins: 1,
            origins: vec![Origin::for_ip("1.1.1.1"), Origin::for_ip("2.2.2.2")],
            monitor: String::new(),
        };
        provider.pools.lock().unwrap().push(pool);
        provider
            .load_balancers
            .lock()
            .unwrap()
            .push(LoadBalancer {
                id: "lb1".into(),
                name: "edge.example.com".into(),
                ttl: 60,
                fallback_pool: "p1".into(),
                default_pools: vec!["p1".into()],
                proxied: false,
                enabled: true,
                steering_policy: "geo".into(),
            });
        provider
            .fail_remove_origin
            .lock()
            .unwrap()
            .push(("p1".into(), "1-1-1-1".into()));
        provider
            .fail_add_origin
            .lock()
            .unwrap()
            .push(("p1".into(), "3.3.3.3".into()));

        let manager = DnsManager::new(provider.clone(), Arc::new(test_config()));
        let partial = manager
            .sync(
                "edge",
                "example.com",
                &["2.2.2.2".to_string(), "3.3.3.3".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(partial.len(), 2);
        assert!(partial.contains_key("edge.example.com:1.1.1.1"));
        assert!(partial.contains_key("edge.example.com:3.3.3.3"));
    }

    #[tokio::test]
    async fn second_sync_with_same_inputs_is_idempotent() {
        let provider = Arc::new(FakeProviderGateway::default());
        let manager = DnsManager::new(provider.clone(), Arc::new(test_config()));
        let ips = vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()];

        manager.sync("edge", "example.com", &ips).await.unwrap();
        let pools_after_first = provider.pools.lock().unwrap().clone();
        let lbs_after_first = provider.load_balancers.lock().unwrap().clone();

        manager.sync("edge", "example.com", &ips).await.unwrap();

        assert_eq!(*provider.pools.lock().unwrap(), pools_after_first);
        assert_eq!(*provider.load_balancers.lock().unwrap(), lbs_after_first);
    }
}
