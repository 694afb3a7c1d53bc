/// Environment-driven configuration for the Navigator control plane
use crate::error::{NavigatorError, Result};
use std::time::Duration;

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_list(key: &str) -> Vec<String> {
    env_var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_u64_or(key: &str, default: u64) -> u64 {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16_or(key: &str, default: u16) -> u16 {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Which ACME directory to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmeEnvironment {
    Production,
    Staging,
}

impl AcmeEnvironment {
    pub fn directory_url(self) -> &'static str {
        match self {
            AcmeEnvironment::Production => "https://acme-v02.api.letsencrypt.org/directory",
            AcmeEnvironment::Staging => "https://acme-staging-v02.api.letsencrypt.org/directory",
        }
    }
}

/// Provider credentials (Cloudflare-shaped: account-scoped LB/pool/monitor API plus
/// a separately-scoped zone DNS API token).
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_token: String,
    pub zone_id: String,
    pub account_id: String,
    pub dns_api_token: String,
}

/// Storage/persistence settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub database_url: String,
    pub pool_size: u32,
    pub master_key: Vec<u8>,
}

/// Reconciliation/renewal scheduling settings.
#[derive(Debug, Clone)]
pub struct SchedulingSettings {
    pub reconcile_interval: Duration,
    pub renewal_interval: Duration,
    pub stale_age: Duration,
    pub record_ttl: u32,
    pub lb_ttl: u32,
    pub monitor_interval: u32,
    pub monitor_timeout: u32,
    pub monitor_retries: u32,
}

/// Top-level configuration, assembled once at startup from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_token: String,
    pub root_domain: String,
    pub cert_allowed_suffixes: Vec<String>,
    pub proxy_services: Vec<String>,
    pub acme_env: AcmeEnvironment,
    pub brand_contact_email: String,
    pub inventory_endpoint: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub storage: StorageSettings,
    pub provider: ProviderSettings,
    pub scheduling: SchedulingSettings,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let master_key_raw = env_var("NAVIGATOR_CERT_MASTER_KEY").ok_or_else(|| {
            NavigatorError::configuration("NAVIGATOR_CERT_MASTER_KEY is required")
        })?;
        let master_key = decode_master_key(&master_key_raw)?;

        let acme_env = match env_var_or("ACME_ENV", "production").as_str() {
            "staging" => AcmeEnvironment::Staging,
            _ => AcmeEnvironment::Production,
        };

        let root_domain = env_var("NAVIGATOR_ROOT_DOMAIN")
            .ok_or_else(|| NavigatorError::configuration("NAVIGATOR_ROOT_DOMAIN is required"))?;

        let config = Self {
            service_token: env_var("SERVICE_TOKEN")
                .ok_or_else(|| NavigatorError::configuration("SERVICE_TOKEN is required"))?,
            cert_allowed_suffixes: env_list("NAVIGATOR_CERT_ALLOWED_SUFFIXES"),
            root_domain,
            proxy_services: env_list("NAVIGATOR_PROXY_SERVICES"),
            acme_env,
            brand_contact_email: env_var_or("BRAND_CONTACT_EMAIL", "admin@example.com"),
            inventory_endpoint: env_var("INVENTORY_ENDPOINT")
                .ok_or_else(|| NavigatorError::configuration("INVENTORY_ENDPOINT is required"))?,
            http_port: env_u16_or("HTTP_PORT", 8080),
            grpc_port: env_u16_or("GRPC_PORT", 9090),
            storage: StorageSettings {
                database_url: env_var("DATABASE_URL")
                    .ok_or_else(|| NavigatorError::configuration("DATABASE_URL is required"))?,
                pool_size: env_u64_or("DATABASE_POOL_SIZE", 10) as u32,
                master_key,
            },
            provider: ProviderSettings {
                api_token: env_var("PROVIDER_API_TOKEN").unwrap_or_default(),
                zone_id: env_var("PROVIDER_ZONE_ID").unwrap_or_default(),
                account_id: env_var("PROVIDER_ACCOUNT_ID").unwrap_or_default(),
                dns_api_token: env_var("PROVIDER_DNS_API_TOKEN").unwrap_or_default(),
            },
            scheduling: SchedulingSettings {
                reconcile_interval: Duration::from_secs(env_u64_or(
                    "NAVIGATOR_RECONCILE_INTERVAL_SECS",
                    60,
                )),
                renewal_interval: Duration::from_secs(env_u64_or(
                    "NAVIGATOR_RENEWAL_INTERVAL_SECS",
                    24 * 60 * 60,
                )),
                stale_age: Duration::from_secs(env_u64_or("NAVIGATOR_STALE_AGE_SECS", 300)),
                record_ttl: env_u64_or("NAVIGATOR_RECORD_TTL", 60) as u32,
                lb_ttl: env_u64_or("NAVIGATOR_LB_TTL", 60) as u32,
                monitor_interval: env_u64_or("NAVIGATOR_MONITOR_INTERVAL", 60) as u32,
                monitor_timeout: env_u64_or("NAVIGATOR_MONITOR_TIMEOUT", 5) as u32,
                monitor_retries: env_u64_or("NAVIGATOR_MONITOR_RETRIES", 2) as u32,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate required invariants before the server starts accepting requests.
    pub fn validate(&self) -> Result<()> {
        if self.service_token.is_empty() {
            return Err(NavigatorError::configuration("SERVICE_TOKEN must not be empty"));
        }
        if self.root_domain.is_empty() {
            return Err(NavigatorError::configuration(
                "NAVIGATOR_ROOT_DOMAIN must not be empty",
            ));
        }
        if !self.storage.database_url.starts_with("postgres://")
            && !self.storage.database_url.starts_with("postgresql://")
        {
            return Err(NavigatorError::configuration(
                "DATABASE_URL must be a postgres:// connection string",
            ));
        }
        if self.storage.master_key.len() != 32 {
            return Err(NavigatorError::configuration(
                "NAVIGATOR_CERT_MASTER_KEY must decode to 32 bytes",
            ));
        }
        Ok(())
    }

    /// The allow-list of domain suffixes eligible for certificate issuance.
    /// Falls back to the root domain when no explicit list is configured.
    pub fn allowed_cert_suffixes(&self) -> Vec<String> {
        if !self.cert_allowed_suffixes.is_empty() {
            self.cert_allowed_suffixes.clone()
        } else {
            vec![self.root_domain.clone()]
        }
    }

    /// Whether records for a service type should be created with the proxy bit set.
    pub fn is_proxied(&self, service_type: &str) -> bool {
        self.proxy_services.iter().any(|s| s == service_type)
    }
}

fn decode_master_key(raw: &str) -> Result<Vec<u8>> {
    if let Ok(bytes) = hex::decode(raw) {
        if bytes.len() == 32 {
            return Ok(bytes);
        }
    }
    use base64::Engine;
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
        if bytes.len() == 32 {
            return Ok(bytes);
        }
    }
    Err(NavigatorError::configuration(
        "NAVIGATOR_CERT_MASTER_KEY must be 32 bytes, hex or base64 encoded",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_master_key_hex() {
        let key = decode_master_key(&hex::encode([7u8; 32])).unwrap();
        assert_eq!(key, vec![7u8; 32]);
    }

    #[test]
    fn decode_master_key_rejects_wrong_length() {
        assert!(decode_master_key(&hex::encode([7u8; 16])).is_err());
    }

    #[test]
    fn acme_directory_urls() {
        assert!(AcmeEnvironment::Production.directory_url().contains("acme-v02"));
        assert!(AcmeEnvironment::Staging.directory_url().contains("staging"));
    }
}
