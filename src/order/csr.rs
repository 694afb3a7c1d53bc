/// Certificate Signing Request (CSR) generation
use crate::error::{NavigatorError, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};

/// CSR generator for ACME certificates
pub struct CsrGenerator {
    domains: Vec<String>,
    private_key: Option<KeyPair>,
}

impl CsrGenerator {
    /// Create a new CSR generator
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            private_key: None,
        }
    }

    /// Set a custom private key (optional)
    pub fn with_private_key(mut self, key_pair: KeyPair) -> Self {
        self.private_key = Some(key_pair);
        self
    }

    /// Generate CSR and return (CSR DER, Private Key PEM)
    pub fn generate(&self) -> Result<(Vec<u8>, String)> {
        let key_pair = if let Some(ref key) = self.private_key {
            key.clone()
        } else {
            KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|e| {
                NavigatorError::crypto(format!("Failed to generate key pair: {}", e))
            })?
        };

        let mut params = CertificateParams::new(self.domains.clone())
            .map_err(|e| NavigatorError::crypto(format!("Failed to build CSR params: {}", e)))?;

        let mut dn = DistinguishedName::new();
        if let Some(first_domain) = self.domains.first() {
            dn.push(DnType::CommonName, first_domain.clone());
        }
        params.distinguished_name = dn;

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| NavigatorError::crypto(format!("Failed to generate CSR: {}", e)))?;
        let csr_der = csr.der().to_vec();
        let private_key_pem = key_pair.serialize_pem();

        tracing::info!("CSR generated for domains: {:?}", self.domains);
        Ok((csr_der, private_key_pem))
    }
}

/// Parse certificate chain from PEM
pub fn parse_certificate_chain(pem: &str) -> Result<Vec<Vec<u8>>> {
    let mut certs = Vec::new();

    for pem_item in pem::parse_many(pem.as_bytes())
        .map_err(|e| NavigatorError::certificate(format!("Failed to parse PEM: {}", e)))?
    {
        if pem_item.tag() == "CERTIFICATE" {
            certs.push(pem_item.contents().to_vec());
        }
    }

    if certs.is_empty() {
        return Err(NavigatorError::certificate("No certificates found in PEM"));
    }

    Ok(certs)
}

/// Verify certificate matches domains
pub fn verify_certificate_domains(cert_der: &[u8], expected_domains: &[String]) -> Result<bool> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| NavigatorError::certificate(format!("Failed to parse certificate: {}", e)))?;

    let sans = cert
        .subject_alternative_name()
        .ok()
        .and_then(|ext| ext)
        .map(|ext| &ext.value.general_names)
        .unwrap_or(&vec![]);

    let mut cert_domains = Vec::new();
    for san in sans {
        if let GeneralName::DNSName(domain) = san {
            cert_domains.push(domain.to_string());
        }
    }

    for expected in expected_domains {
        if !cert_domains.contains(expected) {
            tracing::warn!("Domain {} not found in certificate", expected);
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_generation() {
        let generator = CsrGenerator::new(vec!["example.com".to_string()]);
        let result = generator.generate();
        assert!(result.is_ok());

        let (csr_der, private_key_pem) = result.unwrap();
        assert!(!csr_der.is_empty());
        assert!(private_key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_csr_multiple_domains() {
        let generator = CsrGenerator::new(vec![
            "example.com".to_string(),
            "www.example.com".to_string(),
            "api.example.com".to_string(),
        ]);
        let result = generator.generate();
        assert!(result.is_ok());
    }
}
