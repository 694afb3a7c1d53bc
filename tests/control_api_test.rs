use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use navigator::certificate::store::fake::{FakeAcmeAccountRepository, FakeCertificateRepository};
use navigator::certificate::{CertificateManager, CertificateRepository, KeyEncryptor};
use navigator::config::{
    AcmeEnvironment, Config, ProviderSettings, SchedulingSettings, StorageSettings,
};
use navigator::dns::DnsManager;
use navigator::inventory::fake::FakeInventoryClient;
use navigator::inventory::Node;
use navigator::metrics::MetricsRegistry;
use navigator::provider::fake::FakeProviderGateway;
use navigator::server::{build_router, AppState, HealthCheck};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        service_token: "test-service-token".into(),
        root_domain: "example.com".into(),
        cert_allowed_suffixes: vec!["example.com".into()],
        proxy_services: vec![],
        acme_env: AcmeEnvironment::Staging,
        brand_contact_email: "ops@example.com".into(),
        inventory_endpoint: "http://inventory.internal".into(),
        http_port: 8080,
        grpc_port: 9090,
        storage: StorageSettings {
            database_url: "postgres://x".into(),
            pool_size: 10,
            master_key: vec![7u8; 32],
        },
        provider: ProviderSettings {
            api_token: String::new(),
            zone_id: String::new(),
            account_id: String::new(),
            dns_api_token: String::new(),
        },
        scheduling: SchedulingSettings {
            reconcile_interval: StdDuration::from_secs(60),
            renewal_interval: StdDuration::from_secs(86400),
            stale_age: StdDuration::from_secs(300),
            record_ttl: 60,
            lb_ttl: 60,
            monitor_interval: 60,
            monitor_timeout: 5,
            monitor_retries: 2,
        },
    }
}

async fn post_json(router: axum::Router, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    (status, parsed)
}

/// Scenario 1 (§8): scaling a service from one healthy node to two converges
/// the provider onto a monitored pool plus a load balancer, and removes the
/// now-stale A-record.
#[tokio::test]
async fn sync_dns_scale_up_creates_pool_and_lb() {
    let config = Arc::new(test_config());
    let provider = Arc::new(FakeProviderGateway::default());
    provider.records.lock().unwrap().push(navigator::provider::Record {
        id: "r1".into(),
        record_type: "A".into(),
        name: "edge.example.com".into(),
        content: "1.2.3.4".into(),
        ttl: 60,
        proxied: false,
    });

    let dns_manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
    let inventory = Arc::new(FakeInventoryClient {
        nodes: vec![
            Node {
                node_id: "n1".into(),
                cluster_id: "cluster-1".into(),
                external_ip: Some("1.2.3.4".into()),
            },
            Node {
                node_id: "n2".into(),
                cluster_id: "cluster-1".into(),
                external_ip: Some("5.6.7.8".into()),
            },
        ],
        clusters: vec![],
    });
    let certificate_manager = Arc::new(CertificateManager::new(
        Arc::new(FakeCertificateRepository::default()),
        Arc::new(FakeAcmeAccountRepository::default()),
        KeyEncryptor::new(&config.storage.master_key).unwrap(),
        provider.clone(),
        config.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        dns_manager,
        inventory,
        certificate_manager,
        health: Arc::new(HealthCheck::new()),
        metrics: Arc::new(MetricsRegistry::new()),
    };
    let router = build_router(state);

    let (status, body) = post_json(
        router,
        "/api/sync-dns",
        &config.service_token,
        json!({ "service_type": "edge" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    assert!(provider.records.lock().unwrap().is_empty());
    assert_eq!(provider.pools.lock().unwrap().len(), 1);
    assert_eq!(provider.pools.lock().unwrap()[0].origins.len(), 2);
    assert_eq!(provider.load_balancers.lock().unwrap().len(), 1);
}

/// Missing or wrong bearer tokens are rejected before touching the DNS manager.
#[tokio::test]
async fn sync_dns_rejects_requests_without_a_valid_bearer_token() {
    let config = Arc::new(test_config());
    let provider = Arc::new(FakeProviderGateway::default());
    let dns_manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
    let inventory = Arc::new(FakeInventoryClient::default());
    let certificate_manager = Arc::new(CertificateManager::new(
        Arc::new(FakeCertificateRepository::default()),
        Arc::new(FakeAcmeAccountRepository::default()),
        KeyEncryptor::new(&config.storage.master_key).unwrap(),
        provider,
        config.clone(),
    ));
    let state = AppState {
        config: config.clone(),
        dns_manager,
        inventory,
        certificate_manager,
        health: Arc::new(HealthCheck::new()),
        metrics: Arc::new(MetricsRegistry::new()),
    };
    let router = build_router(state);

    let (status, _) = post_json(
        router,
        "/api/sync-dns",
        "not-the-right-token",
        json!({ "service_type": "edge" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Scenario 5 (§8): a cached, non-expiring certificate is served straight out
/// of the repository without ever constructing an ACME client.
#[tokio::test]
async fn issue_certificate_returns_cached_cert_without_touching_acme() {
    let config = Arc::new(test_config());
    let provider = Arc::new(FakeProviderGateway::default());
    let dns_manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
    let inventory = Arc::new(FakeInventoryClient::default());

    let certificates = Arc::new(FakeCertificateRepository::default());
    let encryptor = KeyEncryptor::new(&config.storage.master_key).unwrap();
    let encrypted_key = encryptor.encrypt("cached-private-key").unwrap();
    let now = Utc::now();
    certificates
        .upsert(
            None,
            "api.example.com",
            "cached-certificate-pem",
            &encrypted_key,
            now,
            now + Duration::days(60),
        )
        .await
        .unwrap();

    let certificate_manager = Arc::new(CertificateManager::new(
        certificates,
        Arc::new(FakeAcmeAccountRepository::default()),
        encryptor,
        provider,
        config.clone(),
    ));
    let state = AppState {
        config: config.clone(),
        dns_manager,
        inventory,
        certificate_manager,
        health: Arc::new(HealthCheck::new()),
        metrics: Arc::new(MetricsRegistry::new()),
    };
    let router = build_router(state);

    let (status, body) = post_json(
        router,
        "/api/issue-certificate",
        &config.service_token,
        json!({ "tenant_id": null, "domain": "api.example.com", "email": "ops@example.com" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["cert_pem"], json!("cached-certificate-pem"));
    assert_eq!(body["key_pem"], json!("cached-private-key"));
}

/// The health endpoint never requires a bearer token.
#[tokio::test]
async fn healthz_is_reachable_without_authentication() {
    let config = Arc::new(test_config());
    let provider = Arc::new(FakeProviderGateway::default());
    let dns_manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
    let inventory = Arc::new(FakeInventoryClient::default());
    let certificate_manager = Arc::new(CertificateManager::new(
        Arc::new(FakeCertificateRepository::default()),
        Arc::new(FakeAcmeAccountRepository::default()),
        KeyEncryptor::new(&config.storage.master_key).unwrap(),
        provider,
        config.clone(),
    ));
    let state = AppState {
        config,
        dns_manager,
        inventory,
        certificate_manager,
        health: Arc::new(HealthCheck::new()),
        metrics: Arc::new(MetricsRegistry::new()),
    };
    let router = build_router(state);

    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
