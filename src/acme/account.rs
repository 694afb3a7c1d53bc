/// ACME account registration and lifecycle, keyed by a P-256 ECDSA key pair.
use crate::error::{NavigatorError, Result};
use crate::protocol::{DirectoryManager, Jwk, JwsSigner, NonceManager};
use crate::types::Contact;
use p256::ecdsa::SigningKey;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A P-256 ECDSA key pair used both as the ACME account key and CSR key.
pub struct EcKeyPair(pub SigningKey);

impl EcKeyPair {
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut OsRng))
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| NavigatorError::pem(format!("Invalid EC private key PEM: {}", e)))?;
        Ok(Self(key))
    }

    pub fn to_pkcs8_pem(&self) -> Result<String> {
        self.0
            .to_pkcs8_pem(Default::default())
            .map(|pem| pem.to_string())
            .map_err(|e| NavigatorError::crypto(format!("Failed to encode EC private key: {}", e)))
    }
}

/// Account information returned by the ACME server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    pub status: String,
    pub contact: Vec<String>,
    #[serde(rename = "termsOfServiceAgreed", default)]
    pub terms_of_service_agreed: bool,
    #[serde(default)]
    pub orders: Option<String>,
}

/// Drives account registration and the signed requests every other ACME
/// operation needs (order creation, challenge response, finalization).
pub struct AccountManager<'a> {
    pub(crate) signer: JwsSigner<'a>,
    pub(crate) jwk: Jwk,
    pub(crate) nonce_manager: &'a NonceManager,
    pub(crate) directory_manager: &'a DirectoryManager,
    pub(crate) http_client: &'a reqwest::Client,
}

impl<'a> AccountManager<'a> {
    pub fn new(
        key_pair: &'a EcKeyPair,
        nonce_manager: &'a NonceManager,
        directory_manager: &'a DirectoryManager,
        http_client: &'a reqwest::Client,
    ) -> Self {
        let signer = JwsSigner::new(&key_pair.0);
        let verifying_key = *key_pair.0.verifying_key();
        let jwk = Jwk::from_p256_verifying_key(&verifying_key);

        Self {
            signer,
            jwk,
            nonce_manager,
            directory_manager,
            http_client,
        }
    }

    /// Register a new account, or return the existing one if this key is already
    /// registered ("onlyReturnExisting" semantics are handled by the CA per RFC 8555 §7.3).
    pub async fn register(
        &self,
        contacts: Vec<Contact>,
        terms_of_service_agreed: bool,
    ) -> Result<Account> {
        let directory = self.directory_manager.get().await?;
        let nonce = self.nonce_manager.get_nonce().await?;

        let header = json!({
            "alg": "ES256",
            "jwk": self.jwk.to_value(),
            "nonce": nonce,
            "url": directory.new_account,
        });

        let contacts_uri: Vec<String> = contacts.iter().map(|c| c.to_uri()).collect();
        let payload = json!({
            "termsOfServiceAgreed": terms_of_service_agreed,
            "contact": contacts_uri,
        });

        let jws = self.signer.sign(&header, &payload)?;

        let response = self
            .http_client
            .post(&directory.new_account)
            .header("Content-Type", "application/jose+json")
            .body(jws)
            .send()
            .await
            .map_err(|e| NavigatorError::transport(format!("Failed to register account: {}", e)))?;

        if let Some(nonce_header) = response.headers().get("replay-nonce")
            && let Ok(nonce_str) = nonce_header.to_str()
        {
            self.nonce_manager.cache_nonce(nonce_str.to_string()).await;
        }

        let account_url = response
            .headers()
            .get("location")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                NavigatorError::account("Missing location header in account response")
            })?
            .to_string();

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NavigatorError::account(format!(
                "Failed to register account: HTTP {}: {}",
                status, error_text
            )));
        }

        let mut account: Account = response
            .json()
            .await
            .map_err(|e| NavigatorError::account(format!("Failed to parse account: {}", e)))?;
        account.id = account_url;
        tracing::info!(account_id = %account.id, "ACME account registered");
        Ok(account)
    }

    /// Compute the key authorization for a DNS-01 challenge token per RFC 8555 §8.1.
    pub fn compute_key_authorization(&self, token: &str) -> Result<String> {
        let thumbprint = self.jwk.thumbprint_sha256()?;
        Ok(format!("{}.{}", token, thumbprint))
    }

    pub fn get_jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn get_signer(&self) -> &JwsSigner<'a> {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec_keypair_pem_round_trip() {
        let key = EcKeyPair::generate();
        let pem = key.to_pkcs8_pem().expect("encode");
        let reloaded = EcKeyPair::from_pkcs8_pem(&pem).expect("decode");
        assert_eq!(key.0.to_bytes(), reloaded.0.to_bytes());
    }

    #[test]
    fn account_parsing() {
        let json = r#"{
            "status": "valid",
            "contact": ["mailto:admin@example.com"],
            "termsOfServiceAgreed": true,
            "orders": "https://example.com/acme/acct/123/orders"
        }"#;
        let account: Account = serde_json::from_str(json).expect("parse");
        assert_eq!(account.status, "valid");
        assert!(account.terms_of_service_agreed);
    }
}
