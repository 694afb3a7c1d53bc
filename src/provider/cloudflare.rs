/// Cloudflare-backed `ProviderGateway`: DNS records are zone-scoped, load
/// balancers/pools/monitors are account-scoped, matching Cloudflare's own
/// API layout.
use super::{LoadBalancer, Monitor, Origin, Pool, ProviderGateway, Record};
use crate::config::ProviderSettings;
use crate::error::{NavigatorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Back-off schedule for the safe verbs (`list`, `get`) on transient failure:
/// request timeouts, connect errors, 429, and 5xx (§4.6).
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFFS: [Duration; 2] = [Duration::from_millis(200), Duration::from_millis(800)];

pub struct CloudflareProvider {
    settings: ProviderSettings,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    message: String,
}

impl CloudflareProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            http_client: reqwest::Client::new(),
        }
    }

    fn zone_url(&self, path: &str) -> String {
        format!("{}/zones/{}{}", API_BASE, self.settings.zone_id, path)
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}{}", API_BASE, self.settings.account_id, path)
    }

    /// Sends the request built by `build` (a fresh `RequestBuilder` per
    /// attempt, since a builder is consumed on send), retrying on timeouts,
    /// connect failures, 429, and 5xx with capped back-off.
    async fn send_with_retry(
        &self,
        url: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if attempt < RETRY_ATTEMPTS && (status.is_server_error() || status.as_u16() == 429) {
                        let backoff = RETRY_BACKOFFS[(attempt - 1) as usize];
                        tracing::warn!(url, %status, attempt, backoff_ms = backoff.as_millis() as u64, "provider request failed, retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if attempt < RETRY_ATTEMPTS && (e.is_timeout() || e.is_connect()) => {
                    let backoff = RETRY_BACKOFFS[(attempt - 1) as usize];
                    tracing::warn!(url, error = %e, attempt, backoff_ms = backoff.as_millis() as u64, "provider request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(NavigatorError::transport(format!("GET {} failed: {}", url, e))),
            }
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .send_with_retry(url, || self.http_client.get(url).bearer_auth(&self.settings.api_token))
            .await?;
        Self::unwrap_response(response).await
    }

    async fn get_many<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let response = self
                .send_with_retry(url, || {
                    self.http_client
                        .get(url)
                        .bearer_auth(&self.settings.api_token)
                        .query(&[("page", page.to_string()), ("per_page", "100".to_string())])
                })
                .await?;
            let items: Vec<T> = Self::unwrap_response(response).await?;
            let got = items.len();
            all.extend(items);
            if got < 100 {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.settings.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| NavigatorError::transport(format!("POST {} failed: {}", url, e)))?;
        Self::unwrap_response(response).await
    }

    async fn patch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .http_client
            .patch(url)
            .bearer_auth(&self.settings.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| NavigatorError::transport(format!("PATCH {} failed: {}", url, e)))?;
        Self::unwrap_response(response).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(url)
            .bearer_auth(&self.settings.api_token)
            .send()
            .await
            .map_err(|e| NavigatorError::transport(format!("DELETE {} failed: {}", url, e)))?;
        let _: serde_json::Value = Self::unwrap_response(response).await?;
        Ok(())
    }

    async fn unwrap_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NavigatorError::provider(format!("Invalid provider response: {}", e)))?;

        if !body.success {
            let detail = body
                .errors
                .first()
                .map(|e| format!("{} ({})", e.message, e.code))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(NavigatorError::provider(detail));
        }

        body.result
            .ok_or_else(|| NavigatorError::provider("Provider response missing result"))
    }
}

#[derive(Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

#[async_trait]
impl ProviderGateway for CloudflareProvider {
    async fn list_records(&self, name_filter: Option<&str>) -> Result<Vec<Record>> {
        let url = self.zone_url("/dns_records");
        let mut records: Vec<Record> = self.get_many(&url).await?;
        if let Some(name) = name_filter {
            records.retain(|r| r.name == name);
        }
        Ok(records)
    }

    async fn create_record(&self, record: &Record) -> Result<Record> {
        let url = self.zone_url("/dns_records");
        let body = RecordBody {
            record_type: &record.record_type,
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        };
        self.post(&url, &body).await
    }

    async fn update_record(&self, id: &str, record: &Record) -> Result<Record> {
        let url = self.zone_url(&format!("/dns_records/{}", id));
        let body = RecordBody {
            record_type: &record.record_type,
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        };
        self.patch(&url, &body).await
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        self.delete(&self.zone_url(&format!("/dns_records/{}", id)))
            .await
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        self.get_many(&self.account_url("/load_balancers/monitors"))
            .await
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        let url = self.account_url("/load_balancers/monitors");
        self.post(&url, monitor).await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>> {
        self.get_many(&self.account_url("/load_balancers/pools"))
            .await
    }

    async fn get_pool(&self, id: &str) -> Result<Pool> {
        self.get(&self.account_url(&format!("/load_balancers/pools/{}", id)))
            .await
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool> {
        let url = self.account_url("/load_balancers/pools");
        self.post(&url, pool).await
    }

    async fn update_pool(&self, id: &str, pool: &Pool) -> Result<Pool> {
        let url = self.account_url(&format!("/load_balancers/pools/{}", id));
        self.patch(&url, pool).await
    }

    async fn add_origin(&self, pool_id: &str, origin: &Origin) -> Result<()> {
        let mut pool = self.get_pool(pool_id).await?;
        pool.origins.push(origin.clone());
        self.update_pool(pool_id, &pool).await?;
        Ok(())
    }

    async fn remove_origin(&self, pool_id: &str, origin_name: &str) -> Result<()> {
        let mut pool = self.get_pool(pool_id).await?;
        pool.origins.retain(|o| o.name != origin_name);
        self.update_pool(pool_id, &pool).await?;
        Ok(())
    }

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
        self.get_many(&self.zone_url("/load_balancers")).await
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        self.get(&self.zone_url(&format!("/load_balancers/{}", id)))
            .await
    }

    async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer> {
        let url = self.zone_url("/load_balancers");
        self.post(&url, &json!(lb)).await
    }

    async fn update_load_balancer(&self, id: &str, lb: &LoadBalancer) -> Result<LoadBalancer> {
        let url = self.zone_url(&format!("/load_balancers/{}", id));
        self.patch(&url, &json!(lb)).await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        self.delete(&self.zone_url(&format!("/load_balancers/{}", id)))
            .await
    }
}
