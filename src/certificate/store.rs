/// PostgreSQL-backed storage for issued certificates and ACME accounts,
/// behind repository traits so the Certificate Manager is testable against an
/// in-memory fake.
use crate::error::{NavigatorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// A certificate as persisted. `private_key_pem` is always the
/// encryption-layer's stored form (`enc:v1:...` once `certificate::encryption`
/// has run over it) - callers decrypt via `KeyEncryptor` after loading.
/// Empty `tenant_id` means platform-wide, tracked as `NULL` in the database.
#[derive(Debug, Clone, FromRow)]
pub struct CertificateRecord {
    pub id: i64,
    pub tenant_id: Option<String>,
    pub domain: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    async fn find_latest(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
    ) -> Result<Option<CertificateRecord>>;

    async fn upsert(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
        certificate_pem: &str,
        encrypted_private_key_pem: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<CertificateRecord>;

    /// Certificates expiring before `cutoff`, oldest first - the renewal worker's feed.
    async fn find_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CertificateRecord>>;
}

/// A registered ACME account key, one per `(tenant, email)` pair.
#[derive(Debug, Clone, FromRow)]
pub struct AcmeAccountRecord {
    pub id: i64,
    pub tenant_id: Option<String>,
    pub email: String,
    pub registration_json: Option<String>,
    pub private_key_pem: String,
}

#[async_trait]
pub trait AcmeAccountRepository: Send + Sync {
    async fn find(&self, tenant_id: Option<&str>, email: &str) -> Result<Option<AcmeAccountRecord>>;

    async fn upsert(
        &self,
        tenant_id: Option<&str>,
        email: &str,
        registration_json: Option<&str>,
        encrypted_private_key_pem: &str,
    ) -> Result<AcmeAccountRecord>;
}

pub struct PgCertificateRepository {
    pool: PgPool,
}

impl PgCertificateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| NavigatorError::storage(format!("failed to connect to database: {e}")))
    }

    pub async fn migrate(pool: &PgPool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| NavigatorError::storage(format!("failed to run database migrations: {e}")))
    }
}

#[async_trait]
impl CertificateRepository for PgCertificateRepository {
    async fn find_latest(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
    ) -> Result<Option<CertificateRecord>> {
        let record = sqlx::query_as::<_, CertificateRecord>(
            "SELECT id, tenant_id, domain, certificate_pem, private_key_pem, issued_at, expires_at
             FROM certificates
             WHERE tenant_id IS NOT DISTINCT FROM $1 AND domain = $2
             ORDER BY issued_at DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NavigatorError::storage(format!("failed to load certificate: {e}")))?;
        Ok(record)
    }

    async fn upsert(
        &self,
        tenant_id: Option<&str>,
        domain: &str,
        certificate_pem: &str,
        encrypted_private_key_pem: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<CertificateRecord> {
        let record = sqlx::query_as::<_, CertificateRecord>(
            "INSERT INTO certificates (tenant_id, domain, certificate_pem, private_key_pem, issued_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (COALESCE(tenant_id, ''), domain) DO UPDATE
             SET certificate_pem = EXCLUDED.certificate_pem,
                 private_key_pem = EXCLUDED.private_key_pem,
                 issued_at = EXCLUDED.issued_at,
                 expires_at = EXCLUDED.expires_at,
                 updated_at = now()
             RETURNING id, tenant_id, domain, certificate_pem, private_key_pem, issued_at, expires_at",
        )
        .bind(tenant_id)
        .bind(domain)
        .bind(certificate_pem)
        .bind(encrypted_private_key_pem)
        .bind(issued_at)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NavigatorError::storage(format!("failed to persist certificate: {e}")))?;
        Ok(record)
    }

    async fn find_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CertificateRecord>> {
        let records = sqlx::query_as::<_, CertificateRecord>(
            "SELECT id, tenant_id, domain, certificate_pem, private_key_pem, issued_at, expires_at
             FROM certificates
             WHERE expires_at < $1
             ORDER BY expires_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NavigatorError::storage(format!("failed to list expiring certificates: {e}")))?;
        Ok(records)
    }
}

pub struct PgAcmeAccountRepository {
    pool: PgPool,
}

impl PgAcmeAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AcmeAccountRepository for PgAcmeAccountRepository {
    async fn find(&self, tenant_id: Option<&str>, email: &str) -> Result<Option<AcmeAccountRecord>> {
        let record = sqlx::query_as::<_, AcmeAccountRecord>(
            "SELECT id, tenant_id, email, registration_json, private_key_pem
             FROM acme_accounts
             WHERE tenant_id IS NOT DISTINCT FROM $1 AND email = $2",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NavigatorError::storage(format!("failed to load acme account: {e}")))?;
        Ok(record)
    }

    async fn upsert(
        &self,
        tenant_id: Option<&str>,
        email: &str,
        registration_json: Option<&str>,
        encrypted_private_key_pem: &str,
    ) -> Result<AcmeAccountRecord> {
        let record = sqlx::query_as::<_, AcmeAccountRecord>(
            "INSERT INTO acme_accounts (tenant_id, email, registration_json, private_key_pem)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (COALESCE(tenant_id, ''), email) DO UPDATE
             SET registration_json = EXCLUDED.registration_json,
                 private_key_pem = EXCLUDED.private_key_pem
             RETURNING id, tenant_id, email, registration_json, private_key_pem",
        )
        .bind(tenant_id)
        .bind(email)
        .bind(registration_json)
        .bind(encrypted_private_key_pem)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NavigatorError::storage(format!("failed to persist acme account: {e}")))?;
        Ok(record)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct FakeCertificateRepository {
        records: RwLock<Vec<CertificateRecord>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl CertificateRepository for FakeCertificateRepository {
        async fn find_latest(
            &self,
            tenant_id: Option<&str>,
            domain: &str,
        ) -> Result<Option<CertificateRecord>> {
            let records = self.records.read().await;
            Ok(records
                .iter()
                .filter(|r| r.tenant_id.as_deref() == tenant_id && r.domain == domain)
                .max_by_key(|r| r.issued_at)
                .cloned())
        }

        async fn upsert(
            &self,
            tenant_id: Option<&str>,
            domain: &str,
            certificate_pem: &str,
            encrypted_private_key_pem: &str,
            issued_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
        ) -> Result<CertificateRecord> {
            let mut records = self.records.write().await;
            records.retain(|r| !(r.tenant_id.as_deref() == tenant_id && r.domain == domain));
            let record = CertificateRecord {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                tenant_id: tenant_id.map(str::to_string),
                domain: domain.to_string(),
                certificate_pem: certificate_pem.to_string(),
                private_key_pem: encrypted_private_key_pem.to_string(),
                issued_at,
                expires_at,
            };
            records.push(record.clone());
            Ok(record)
        }

        async fn find_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CertificateRecord>> {
            let mut records: Vec<_> = self
                .records
                .read()
                .await
                .iter()
                .filter(|r| r.expires_at < cutoff)
                .cloned()
                .collect();
            records.sort_by_key(|r| r.expires_at);
            Ok(records)
        }
    }

    #[derive(Default)]
    pub struct FakeAcmeAccountRepository {
        records: RwLock<Vec<AcmeAccountRecord>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl AcmeAccountRepository for FakeAcmeAccountRepository {
        async fn find(&self, tenant_id: Option<&str>, email: &str) -> Result<Option<AcmeAccountRecord>> {
            Ok(self
                .records
                .read()
                .await
                .iter()
                .find(|r| r.tenant_id.as_deref() == tenant_id && r.email == email)
                .cloned())
        }

        async fn upsert(
            &self,
            tenant_id: Option<&str>,
            email: &str,
            registration_json: Option<&str>,
            encrypted_private_key_pem: &str,
        ) -> Result<AcmeAccountRecord> {
            let mut records = self.records.write().await;
            records.retain(|r| !(r.tenant_id.as_deref() == tenant_id && r.email == email));
            let record = AcmeAccountRecord {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                tenant_id: tenant_id.map(str::to_string),
                email: email.to_string(),
                registration_json: registration_json.map(str::to_string),
                private_key_pem: encrypted_private_key_pem.to_string(),
            };
            records.push(record.clone());
            Ok(record)
        }
    }
}
