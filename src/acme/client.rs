/// ACME issuance orchestration: account registration, order creation, DNS-01
/// challenge completion against the provider gateway, finalization and
/// certificate download.
use super::account::{AccountManager, EcKeyPair};
use crate::error::{NavigatorError, Result};
use crate::order::csr::CsrGenerator;
use crate::order::{NewOrderRequest, Order, OrderManager};
use crate::protocol::{DirectoryManager, NonceManager};
use crate::provider::{ProviderGateway, Record};
use crate::types::{Contact, Identifier};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AcmeClientConfig {
    pub directory_url: String,
    pub contacts: Vec<Contact>,
    pub terms_of_service_agreed: bool,
}

/// A freshly issued certificate, ready to hand to the certificate store.
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub domains: Vec<String>,
}

/// Drives one end-to-end issuance against the configured ACME directory.
/// Holds its own account key; callers construct one per issuance (or reuse
/// across issuances sharing the same account, since `register` is idempotent
/// per RFC 8555 §7.3).
pub struct AcmeClient {
    config: AcmeClientConfig,
    http_client: reqwest::Client,
    key_pair: EcKeyPair,
}

impl AcmeClient {
    pub fn new(config: AcmeClientConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            key_pair: EcKeyPair::generate(),
        }
    }

    pub fn with_account_key(config: AcmeClientConfig, key_pair: EcKeyPair) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            key_pair,
        }
    }

    pub fn account_key_pem(&self) -> Result<String> {
        self.key_pair.to_pkcs8_pem()
    }

    /// Issue a certificate covering `domains`, completing DNS-01 challenges
    /// by creating and then removing TXT records through `provider`.
    ///
    /// `existing_account_id` skips registration when the caller already holds
    /// a registered account URL for this key (RFC 8555 §7.3 makes re-registering
    /// the same key harmless, but there's no reason to pay for it on every call).
    /// Returns the account id actually used, so the caller can persist it the
    /// first time an account is registered.
    pub async fn issue_certificate(
        &self,
        domains: Vec<String>,
        provider: &Arc<dyn ProviderGateway>,
        existing_account_id: Option<&str>,
    ) -> Result<(IssuedCertificate, String)> {
        let directory_manager =
            DirectoryManager::new(&self.config.directory_url, self.http_client.clone());
        let directory = directory_manager.get().await?;
        let nonce_manager = NonceManager::new(&directory.new_nonce, self.http_client.clone());
        let account_manager = AccountManager::new(
            &self.key_pair,
            &nonce_manager,
            &directory_manager,
            &self.http_client,
        );

        let account_id = match existing_account_id {
            Some(id) => id.to_string(),
            None => {
                account_manager
                    .register(
                        self.config.contacts.clone(),
                        self.config.terms_of_service_agreed,
                    )
                    .await?
                    .id
            }
        };

        let order_manager = OrderManager::new(
            &account_manager,
            &directory_manager,
            &nonce_manager,
            &self.http_client,
            account_id.clone(),
        );

        let identifiers: Vec<Identifier> = domains.iter().cloned().map(Identifier::dns).collect();
        let order_request = NewOrderRequest {
            identifiers,
            not_before: None,
            not_after: None,
        };
        let (order_url, order) = order_manager.create_order(&order_request).await?;

        let mut created_records: Vec<(String, String)> = Vec::new();
        let solve_result = self
            .solve_authorizations(&order, &order_manager, &account_manager, provider, &mut created_records)
            .await;

        let cleanup_result = self.cleanup_records(provider, &created_records).await;
        solve_result?;
        if let Err(e) = cleanup_result {
            tracing::warn!(error = %e, "failed to clean up one or more DNS-01 TXT records");
        }

        let order = order_manager
            .poll_order(&order_url, 30, Duration::from_secs(2))
            .await?;
        if order.status != "ready" {
            return Err(NavigatorError::order(order.status, "order not ready after authorization"));
        }

        let csr_generator = CsrGenerator::new(domains.clone());
        let (csr_der, private_key_pem) = csr_generator.generate()?;
        order_manager.finalize_order(&order.finalize, &csr_der).await?;

        let order = order_manager
            .poll_order(&order_url, 30, Duration::from_secs(2))
            .await?;
        if order.status != "valid" {
            return Err(NavigatorError::order(order.status, "order not valid after finalization"));
        }

        let certificate_url = order
            .certificate
            .ok_or_else(|| NavigatorError::certificate("no certificate URL in finalized order"))?;
        let certificate_pem = order_manager.download_certificate(&certificate_url).await?;

        Ok((
            IssuedCertificate {
                certificate_pem,
                private_key_pem,
                domains,
            },
            account_id,
        ))
    }

    async fn solve_authorizations(
        &self,
        order: &Order,
        order_manager: &OrderManager<'_>,
        account_manager: &AccountManager<'_>,
        provider: &Arc<dyn ProviderGateway>,
        created_records: &mut Vec<(String, String)>,
    ) -> Result<()> {
        for auth_url in &order.authorizations {
            let authorization = order_manager.get_authorization(auth_url).await?;
            let domain = &authorization.identifier.value;

            let challenge = authorization
                .get_challenge("dns-01")
                .ok_or_else(|| NavigatorError::challenge(domain.clone(), "no dns-01 challenge offered"))?;

            let key_authorization = account_manager.compute_key_authorization(&challenge.token)?;
            let record_value = dns01_record_value(&key_authorization);
            let record_name = format!("_acme-challenge.{}", domain);

            let record = Record {
                id: String::new(),
                record_type: "TXT".to_string(),
                name: record_name.clone(),
                content: record_value,
                ttl: 60,
                proxied: false,
            };
            let created = provider
                .create_record(&record)
                .await
                .map_err(|e| NavigatorError::provider(format!("create TXT record for {domain}: {e}")))?;
            created_records.push((created.id, record_name));

            order_manager.respond_to_challenge(&challenge.url).await?;
        }
        Ok(())
    }

    async fn cleanup_records(
        &self,
        provider: &Arc<dyn ProviderGateway>,
        records: &[(String, String)],
    ) -> Result<()> {
        let mut first_error = None;
        for (id, name) in records {
            if let Err(e) = provider.delete_record(id).await {
                tracing::warn!(record = %name, error = %e, "failed to remove DNS-01 TXT record");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// The DNS-01 TXT record value: base64url(SHA-256(key authorization)), per RFC 8555 §8.4.
fn dns01_record_value(key_authorization: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns01_record_value_is_url_safe_base64() {
        let value = dns01_record_value("token.thumbprint");
        assert!(URL_SAFE_NO_PAD.decode(&value).is_ok());
        assert!(!value.contains('='));
    }

    #[test]
    fn client_config_carries_contacts() {
        let config = AcmeClientConfig {
            directory_url: "https://acme-staging-v02.api.letsencrypt.org/directory".into(),
            contacts: vec![Contact::email("ops@example.com")],
            terms_of_service_agreed: true,
        };
        let client = AcmeClient::new(config);
        assert!(client.account_key_pem().is_ok());
    }
}
