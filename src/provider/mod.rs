/// Provider Gateway: typed operations over the external DNS/LB/monitor API.
///
/// A single trait fronts every provider-side entity the control plane touches
/// (records, monitors, pools, load balancers), so the DNS Manager and the
/// DNS-01 challenge solver can both be tested against an in-memory fake
/// without talking to a real backend.
pub mod cloudflare;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A DNS resource record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

/// A health monitor attached to a pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Monitor {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub method: String,
    pub path: String,
    pub port: u16,
    pub interval: u32,
    pub timeout: u32,
    pub retries: u32,
    pub expected_codes: String,
}

/// A backend origin registered in a pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Origin {
    pub name: String,
    pub address: String,
    pub enabled: bool,
    pub weight: f64,
}

impl Origin {
    /// Origin name is the IP with dots replaced by dashes (§3).
    pub fn for_ip(ip: &str) -> Self {
        Self {
            name: ip.replace('.', "-"),
            address: ip.to_string(),
            enabled: true,
            weight: 1.0,
        }
    }
}

/// A pool of origins, optionally monitored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub minimum_origins: u32,
    pub origins: Vec<Origin>,
    #[serde(default)]
    pub monitor: String,
}

/// A load balancer fronting one or more pools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub ttl: u32,
    pub fallback_pool: String,
    pub default_pools: Vec<String>,
    pub proxied: bool,
    pub enabled: bool,
    pub steering_policy: String,
}

/// Everything the DNS Manager and DNS-01 solver need from the external
/// DNS/LB/monitor backend.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn list_records(&self, name_filter: Option<&str>) -> Result<Vec<Record>>;
    async fn create_record(&self, record: &Record) -> Result<Record>;
    async fn update_record(&self, id: &str, record: &Record) -> Result<Record>;
    async fn delete_record(&self, id: &str) -> Result<()>;

    async fn list_monitors(&self) -> Result<Vec<Monitor>>;
    async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor>;

    async fn list_pools(&self) -> Result<Vec<Pool>>;
    async fn get_pool(&self, id: &str) -> Result<Pool>;
    async fn create_pool(&self, pool: &Pool) -> Result<Pool>;
    async fn update_pool(&self, id: &str, pool: &Pool) -> Result<Pool>;
    async fn add_origin(&self, pool_id: &str, origin: &Origin) -> Result<()>;
    async fn remove_origin(&self, pool_id: &str, origin_name: &str) -> Result<()>;

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>>;
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer>;
    async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer>;
    async fn update_load_balancer(&self, id: &str, lb: &LoadBalancer) -> Result<LoadBalancer>;
    async fn delete_load_balancer(&self, id: &str) -> Result<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory fake satisfying `ProviderGateway`, used by the DNS Manager test suite.
    #[derive(Default)]
    pub struct FakeProviderGateway {
        pub records: Mutex<Vec<Record>>,
        pub monitors: Mutex<Vec<Monitor>>,
        pub pools: Mutex<Vec<Pool>>,
        pub load_balancers: Mutex<Vec<LoadBalancer>>,
        pub next_id: Mutex<u64>,
        pub fail_remove_origin: Mutex<Vec<(String, String)>>,
        pub fail_add_origin: Mutex<Vec<(String, String)>>,
    }

    impl FakeProviderGateway {
        fn gen_id(&self) -> String {
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            format!("id-{}", n)
        }
    }

    #[async_trait]
    impl ProviderGateway for FakeProviderGateway {
        async fn list_records(&self, name_filter: Option<&str>) -> Result<Vec<Record>> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| name_filter.is_none_or(|n| r.name == n))
                .cloned()
                .collect())
        }

        async fn create_record(&self, record: &Record) -> Result<Record> {
            let mut r = record.clone();
            r.id = self.gen_id();
            self.records.lock().unwrap().push(r.clone());
            Ok(r)
        }

        async fn update_record(&self, id: &str, record: &Record) -> Result<Record> {
            let mut records = self.records.lock().unwrap();
            if let Some(existing) = records.iter_mut().find(|r| r.id == id) {
                let mut updated = record.clone();
                updated.id = id.to_string();
                *existing = updated.clone();
                Ok(updated)
            } else {
                Err(crate::error::NavigatorError::not_found("record"))
            }
        }

        async fn delete_record(&self, id: &str) -> Result<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn list_monitors(&self) -> Result<Vec<Monitor>> {
            Ok(self.monitors.lock().unwrap().clone())
        }

        async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
            let mut m = monitor.clone();
            m.id = self.gen_id();
            self.monitors.lock().unwrap().push(m.clone());
            Ok(m)
        }

        async fn list_pools(&self) -> Result<Vec<Pool>> {
            Ok(self.pools.lock().unwrap().clone())
        }

        async fn get_pool(&self, id: &str) -> Result<Pool> {
            self.pools
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| crate::error::NavigatorError::not_found("pool"))
        }

        async fn create_pool(&self, pool: &Pool) -> Result<Pool> {
            let mut p = pool.clone();
            p.id = self.gen_id();
            self.pools.lock().unwrap().push(p.clone());
            Ok(p)
        }

        async fn update_pool(&self, id: &str, pool: &Pool) -> Result<Pool> {
            let mut pools = self.pools.lock().unwrap();
            if let Some(existing) = pools.iter_mut().find(|p| p.id == id) {
                let mut updated = pool.clone();
                updated.id = id.to_string();
                *existing = updated.clone();
                Ok(updated)
            } else {
                Err(crate::error::NavigatorError::not_found("pool"))
            }
        }

        async fn add_origin(&self, pool_id: &str, origin: &Origin) -> Result<()> {
            if self
                .fail_add_origin
                .lock()
                .unwrap()
                .iter()
                .any(|(p, ip)| p == pool_id && ip == &origin.address)
            {
                return Err(crate::error::NavigatorError::provider("simulated add failure"));
            }
            let mut pools = self.pools.lock().unwrap();
            if let Some(pool) = pools.iter_mut().find(|p| p.id == pool_id) {
                pool.origins.push(origin.clone());
            }
            Ok(())
        }

        async fn remove_origin(&self, pool_id: &str, origin_name: &str) -> Result<()> {
            if self
                .fail_remove_origin
                .lock()
                .unwrap()
                .iter()
                .any(|(p, n)| p == pool_id && n == origin_name)
            {
                return Err(crate::error::NavigatorError::provider(
                    "simulated remove failure",
                ));
            }
            let mut pools = self.pools.lock().unwrap();
            if let Some(pool) = pools.iter_mut().find(|p| p.id == pool_id) {
                pool.origins.retain(|o| o.name != origin_name);
            }
            Ok(())
        }

        async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
            Ok(self.load_balancers.lock().unwrap().clone())
        }

        async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
            self.load_balancers
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or_else(|| crate::error::NavigatorError::not_found("lb"))
        }

        async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer> {
            let mut l = lb.clone();
            l.id = self.gen_id();
            self.load_balancers.lock().unwrap().push(l.clone());
            Ok(l)
        }

        async fn update_load_balancer(&self, id: &str, lb: &LoadBalancer) -> Result<LoadBalancer> {
            let mut lbs = self.load_balancers.lock().unwrap();
            if let Some(existing) = lbs.iter_mut().find(|l| l.id == id) {
                let mut updated = lb.clone();
                updated.id = id.to_string();
                *existing = updated.clone();
                Ok(updated)
            } else {
                Err(crate::error::NavigatorError::not_found("lb"))
            }
        }

        async fn delete_load_balancer(&self, id: &str) -> Result<()> {
            self.load_balancers.lock().unwrap().retain(|l| l.id != id);
            Ok(())
        }
    }
}
