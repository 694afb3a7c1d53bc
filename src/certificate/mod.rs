/// Certificate lifecycle: field-level encryption at rest, persistence, and
/// the cache-first issuance algorithm.
pub mod encryption;
pub mod manager;
pub mod store;

pub use encryption::KeyEncryptor;
pub use manager::CertificateManager;
pub use store::{
    AcmeAccountRecord, AcmeAccountRepository, CertificateRecord, CertificateRepository,
    PgAcmeAccountRepository, PgCertificateRepository,
};
