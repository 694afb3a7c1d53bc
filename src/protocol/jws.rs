/// JWS (JSON Web Signature) signing for ACME, using ECDSA P-256 per RFC 8555 §6.2.
use crate::error::{NavigatorError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey};
use serde_json::Value;

/// JWS signer bound to an account's P-256 private key.
///
/// ACME's "flattened JWS" serialization signs over `base64url(header) || "." ||
/// base64url(payload)` with the IEEE P1363 (r||s) signature encoding, not DER -
/// `rcgen::KeyPair` has no arbitrary-payload signing method, so the account key
/// lives as a `p256::ecdsa::SigningKey` instead.
pub struct JwsSigner<'a> {
    signing_key: &'a SigningKey,
}

impl<'a> JwsSigner<'a> {
    pub fn new(signing_key: &'a SigningKey) -> Self {
        Self { signing_key }
    }

    /// Sign a JWS with the given protected header and payload.
    pub fn sign(&self, header: &Value, payload: &Value) -> Result<String> {
        let payload_json = payload.to_string();
        self.sign_raw(header, payload_json.as_bytes())
    }

    /// Sign a JWS whose payload must be the literal empty string (POST-as-GET).
    pub fn sign_empty(&self, header: &Value) -> Result<String> {
        self.sign_raw(header, b"")
    }

    fn sign_raw(&self, header: &Value, payload_bytes: &[u8]) -> Result<String> {
        let header_json = header.to_string();
        let header_encoded = URL_SAFE_NO_PAD.encode(header_json.as_bytes());
        let payload_encoded = URL_SAFE_NO_PAD.encode(payload_bytes);

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);
        let signature: Signature = self
            .signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| NavigatorError::crypto(format!("Failed to sign JWS: {}", e)))?;
        let signature_encoded = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!(
            "{}.{}.{}",
            header_encoded, payload_encoded, signature_encoded
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;
    use rand::rngs::OsRng;

    fn test_key() -> SigningKey {
        SigningKey::random(&mut OsRng)
    }

    #[test]
    fn sign_produces_three_valid_base64url_parts() {
        let key = test_key();
        let signer = JwsSigner::new(&key);

        let header = serde_json::json!({
            "alg": "ES256",
            "nonce": "test-nonce",
            "url": "https://example.com/acme/new-account"
        });
        let payload = serde_json::json!({ "termsOfServiceAgreed": true });

        let jws = signer.sign(&header, &payload).expect("sign");
        let parts: Vec<&str> = jws.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(URL_SAFE_NO_PAD.decode(part).is_ok());
        }
    }

    #[test]
    fn sign_empty_has_empty_payload_segment() {
        let key = test_key();
        let signer = JwsSigner::new(&key);
        let header = serde_json::json!({
            "alg": "ES256",
            "nonce": "test-nonce",
            "url": "https://example.com/acme/new-nonce"
        });

        let jws = signer.sign_empty(&header).expect("sign_empty");
        let parts: Vec<&str> = jws.split('.').collect();
        assert_eq!(parts[1], "");
    }

    #[test]
    fn signature_verifies_against_the_signing_key() {
        let key = test_key();
        let verifying_key = VerifyingKey::from(&key);
        let signer = JwsSigner::new(&key);

        let header = serde_json::json!({"alg": "ES256", "nonce": "n", "url": "https://x/"});
        let payload = serde_json::json!({});
        let jws = signer.sign(&header, &payload).expect("sign");
        let parts: Vec<&str> = jws.split('.').collect();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let sig_bytes = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        let signature = Signature::from_slice(&sig_bytes).unwrap();

        assert!(
            verifying_key
                .verify(signing_input.as_bytes(), &signature)
                .is_ok()
        );
    }
}
