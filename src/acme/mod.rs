/// ACME v2 (RFC 8555) client: account registration, order lifecycle, DNS-01
/// challenge completion and certificate download, built on the P-256 JWS
/// signer in `protocol` and the DNS-01 solver bound to the provider gateway.
pub mod account;
pub mod client;

pub use account::{Account, AccountManager, EcKeyPair};
pub use client::{AcmeClient, AcmeClientConfig, IssuedCertificate};
