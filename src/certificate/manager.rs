/// Certificate Manager: cache-first ACME DNS-01 issuance (§4.2).
use super::encryption::KeyEncryptor;
use super::store::{AcmeAccountRepository, CertificateRecord, CertificateRepository};
use crate::acme::account::EcKeyPair;
use crate::acme::client::{AcmeClient, AcmeClientConfig};
use crate::config::{AcmeEnvironment, Config};
use crate::error::{NavigatorError, Result};
use crate::keyed_lock::KeyedLocks;
use crate::provider::ProviderGateway;
use crate::types::Contact;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Certificates with less than this much validity remaining are renewed
/// rather than reused from cache (I5).
const FRESHNESS_THRESHOLD_DAYS: i64 = 30;

/// A certificate handed back to a Control API caller, cached or freshly issued.
pub struct CertificateResult {
    pub domain: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub expires_at: DateTime<Utc>,
}

pub struct CertificateManager {
    certificates: Arc<dyn CertificateRepository>,
    accounts: Arc<dyn AcmeAccountRepository>,
    encryptor: KeyEncryptor,
    provider: Arc<dyn ProviderGateway>,
    config: Arc<Config>,
    issuance_locks: KeyedLocks<(Option<String>, String)>,
}

impl CertificateManager {
    pub fn new(
        certificates: Arc<dyn CertificateRepository>,
        accounts: Arc<dyn AcmeAccountRepository>,
        encryptor: KeyEncryptor,
        provider: Arc<dyn ProviderGateway>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            certificates,
            accounts,
            encryptor,
            provider,
            config,
            issuance_locks: KeyedLocks::new(),
        }
    }

    /// Obtain a certificate for `(tenant, domain)`, serving a fresh cached one
    /// when available and issuing a new one against `email` otherwise.
    pub async fn issue_certificate(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
        email: &str,
    ) -> Result<CertificateResult> {
        if domain.is_empty() || email.is_empty() {
            return Err(NavigatorError::invalid_input(
                "domain and email are required",
            ));
        }
        let domain = normalize_domain(domain);
        self.check_allowed(&domain)?;

        // Serialise concurrent issuance for the same (tenant, domain) so we
        // never submit two ACME orders for it at once.
        let key = (tenant_id.map(str::to_string), domain.clone());
        let _guard = self.issuance_locks.lock(key).await;

        if let Some(cached) = self.certificates.find_latest(tenant_id, &domain).await? {
            if Self::is_fresh(&cached) {
                tracing::debug!(domain = %domain, "serving certificate from cache");
                return self.decrypt_record(cached);
            }
        }

        tracing::info!(domain = %domain, "no fresh cached certificate, issuing new one");
        self.issue_and_store(tenant_id, &domain, email).await
    }

    /// Return a cached certificate without triggering issuance, for the
    /// read-only `GetCertificate` RPC.
    pub async fn get_certificate(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
    ) -> Result<Option<CertificateResult>> {
        let domain = normalize_domain(domain);
        match self.certificates.find_latest(tenant_id, &domain).await? {
            Some(record) => Ok(Some(self.decrypt_record(record)?)),
            None => Ok(None),
        }
    }

    /// Certificates expiring before `cutoff`, oldest first - the renewal worker's feed.
    pub async fn find_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CertificateRecord>> {
        self.certificates.find_expiring_before(cutoff).await
    }

    fn check_allowed(&self, domain: &str) -> Result<()> {
        let allowed = self.config.allowed_cert_suffixes();
        if allowed.is_empty()
            || allowed
                .iter()
                .any(|suffix| domain == suffix || domain.ends_with(&format!(".{suffix}")))
        {
            Ok(())
        } else {
            Err(NavigatorError::invalid_input(format!(
                "domain {domain} is not covered by any allowed certificate suffix"
            )))
        }
    }

    fn is_fresh(record: &CertificateRecord) -> bool {
        record.expires_at - Utc::now() > Duration::days(FRESHNESS_THRESHOLD_DAYS)
    }

    fn decrypt_record(&self, record: CertificateRecord) -> Result<CertificateResult> {
        let private_key_pem = self.encryptor.decrypt(&record.private_key_pem)?;
        Ok(CertificateResult {
            domain: record.domain,
            certificate_pem: record.certificate_pem,
            private_key_pem,
            expires_at: record.expires_at,
        })
    }

    async fn issue_and_store(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
        email: &str,
    ) -> Result<CertificateResult> {
        let (account_key, existing_registration, encrypted_account_key) =
            self.load_or_create_account_key(tenant_id, email).await?;
        let client_config = AcmeClientConfig {
            directory_url: self.config.acme_env.directory_url().to_string(),
            contacts: vec![Contact::email(email.to_string())],
            terms_of_service_agreed: true,
        };
        let client = AcmeClient::with_account_key(client_config, account_key);

        let (issued, account_id) = client
            .issue_certificate(vec![domain.to_string()], &self.provider, existing_registration.as_deref())
            .await?;

        if existing_registration.is_none() {
            self.accounts
                .upsert(tenant_id, email, Some(&account_id), &encrypted_account_key)
                .await?;
        }

        let now = Utc::now();
        let expires_at =
            parse_certificate_expiry(&issued.certificate_pem).unwrap_or(now + Duration::days(90));
        let encrypted_key = self.encryptor.encrypt(&issued.private_key_pem)?;

        self.certificates
            .upsert(tenant_id, domain, &issued.certificate_pem, &encrypted_key, now, expires_at)
            .await?;

        Ok(CertificateResult {
            domain: domain.to_string(),
            certificate_pem: issued.certificate_pem,
            private_key_pem: issued.private_key_pem,
            expires_at,
        })
    }

    /// Returns the account key, its already-registered account id (`None` if
    /// this account has never completed ACME registration), and the encrypted
    /// PEM as stored, so a fresh registration can be persisted without a
    /// second round trip through the encryptor.
    async fn load_or_create_account_key(
        &self,
        tenant_id: Option<&str>,
        email: &str,
    ) -> Result<(EcKeyPair, Option<String>, String)> {
        if let Some(existing) = self.accounts.find(tenant_id, email).await? {
            let pem = self.encryptor.decrypt(&existing.private_key_pem)?;
            let key_pair = EcKeyPair::from_pkcs8_pem(&pem)?;
            return Ok((key_pair, existing.registration_json, existing.private_key_pem));
        }

        // Account key is persisted up front, before registration, so it
        // survives a crash mid-issuance; `registration_json` starts empty and
        // is filled in by the caller once `register()` actually succeeds.
        let key_pair = EcKeyPair::generate();
        let pem = key_pair.to_pkcs8_pem()?;
        let encrypted = self.encryptor.encrypt(&pem)?;
        self.accounts.upsert(tenant_id, email, None, &encrypted).await?;
        Ok((key_pair, None, encrypted))
    }
}

/// Normalise a domain per §4.2: trim, lowercase, strip a trailing dot and any
/// leading wildcard label.
fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim().trim_end_matches('.').to_lowercase();
    trimmed
        .strip_prefix("*.")
        .map(str::to_string)
        .unwrap_or(trimmed)
}

/// Best-effort `notAfter` extraction from the leaf certificate, used only to
/// seed `expires_at` when the ACME response doesn't carry it separately.
fn parse_certificate_expiry(cert_pem: &str) -> Option<DateTime<Utc>> {
    use x509_parser::prelude::*;

    let pem_item = pem::parse(cert_pem).ok()?;
    let (_, cert) = X509Certificate::from_der(pem_item.contents()).ok()?;
    let not_after = cert.validity().not_after;
    DateTime::from_timestamp(not_after.timestamp(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::store::fake::{FakeAcmeAccountRepository, FakeCertificateRepository};
    use crate::config::{ProviderSettings, SchedulingSettings, StorageSettings};
    use crate::provider::fake::FakeProviderGateway;

    fn test_config() -> Config {
        Config {
            service_token: "token".into(),
            root_domain: "example.com".into(),
            cert_allowed_suffixes: vec!["example.com".into()],
            proxy_services: vec![],
            acme_env: AcmeEnvironment::Staging,
            brand_contact_email: "ops@example.com".into(),
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
                reconcile_interval: std::time::Duration::from_secs(60),
                renewal_interval: std::time::Duration::from_secs(86400),
                stale_age: std::time::Duration::from_secs(300),
                record_ttl: 60,
                lb_ttl: 60,
                monitor_interval: 60,
                monitor_timeout: 5,
                monitor_retries: 2,
            },
        }
    }

    fn test_manager() -> CertificateManager {
        CertificateManager::new(
            Arc::new(FakeCertificateRepository::default()),
            Arc::new(FakeAcmeAccountRepository::default()),
            KeyEncryptor::new(&[3u8; 32]).unwrap(),
            Arc::new(FakeProviderGateway::default()),
            Arc::new(test_config()),
        )
    }

    #[test]
    fn normalize_domain_strips_dot_wildcard_and_case() {
        assert_eq!(normalize_domain("Example.COM."), "example.com");
        assert_eq!(normalize_domain("*.example.com"), "example.com");
        assert_eq!(normalize_domain("  api.example.com  "), "api.example.com");
    }

    #[test]
    fn freshness_threshold_rejects_near_expiry_certs() {
        let now = Utc::now();
        let near_expiry = CertificateRecord {
            id: 1,
            tenant_id: None,
            domain: "a.example.com".into(),
            certificate_pem: String::new(),
            private_key_pem: String::new(),
            issued_at: now - Duration::days(60),
            expires_at: now + Duration::days(10),
        };
        assert!(!CertificateManager::is_fresh(&near_expiry));

        let fresh = CertificateRecord {
            expires_at: now + Duration::days(60),
            ..near_expiry
        };
        assert!(CertificateManager::is_fresh(&fresh));
    }

    #[tokio::test]
    async fn check_allowed_rejects_domains_outside_the_suffix_list() {
        let manager = test_manager();
        let err = manager
            .issue_certificate(None, "evil.example.org", "ops@example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not covered"));
    }

    #[tokio::test]
    async fn get_certificate_returns_none_when_nothing_cached() {
        let manager = test_manager();
        let result = manager
            .get_certificate(None, "api.example.com")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cache_hit_returns_stored_certificate_without_touching_acme() {
        let manager = test_manager();
        let now = Utc::now();
        let encrypted = manager.encryptor.encrypt("fake-key-pem").unwrap();
        manager
            .certificates
            .upsert(
                None,
                "api.example.com",
                "fake-cert-pem",
                &encrypted,
                now,
                now + Duration::days(60),
            )
            .await
            .unwrap();

        let issued = manager
            .issue_certificate(None, "api.example.com", "ops@example.com")
            .await
            .unwrap();
        assert_eq!(issued.certificate_pem, "fake-cert-pem");
        assert_eq!(issued.private_key_pem, "fake-key-pem");
    }
}
