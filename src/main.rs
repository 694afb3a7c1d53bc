/// Process bootstrap: load configuration, wire up the control plane's
/// components, and run the Control API, Reconciliation Worker, and Renewal
/// Worker side by side until a shutdown signal arrives.
use navigator::certificate::{
    CertificateManager, KeyEncryptor, PgAcmeAccountRepository, PgCertificateRepository,
};
use navigator::config::Config;
use navigator::dns::{ClusterReconciler, DnsManager};
use navigator::error::Result;
use navigator::inventory::HttpInventoryClient;
use navigator::metrics::{HealthStatus, MetricsRegistry};
use navigator::provider::cloudflare::CloudflareProvider;
use navigator::reconcile::ReconciliationWorker;
use navigator::renewal::RenewalWorker;
use navigator::server::{self, AppState, HealthCheck};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(root_domain = %config.root_domain, "navigator starting");

    let pool =
        PgCertificateRepository::connect(&config.storage.database_url, config.storage.pool_size)
            .await?;
    PgCertificateRepository::migrate(&pool).await?;

    let certificates = Arc::new(PgCertificateRepository::new(pool.clone()));
    let accounts = Arc::new(PgAcmeAccountRepository::new(pool));
    let encryptor = KeyEncryptor::new(&config.storage.master_key)?;

    let provider = Arc::new(CloudflareProvider::new(config.provider.clone()));
    let inventory = Arc::new(HttpInventoryClient::new(config.inventory_endpoint.clone()));

    let dns_manager = Arc::new(DnsManager::new(provider.clone(), config.clone()));
    let cluster_reconciler = Arc::new(ClusterReconciler::new(
        inventory.clone(),
        provider.clone(),
        dns_manager.clone(),
        config.clone(),
    ));
    let certificate_manager = Arc::new(CertificateManager::new(
        certificates,
        accounts,
        encryptor,
        provider,
        config.clone(),
    ));

    let metrics = Arc::new(MetricsRegistry::new());

    let reconciliation_worker = ReconciliationWorker::new(
        inventory.clone(),
        dns_manager.clone(),
        cluster_reconciler,
        Some(certificate_manager.clone()),
        config.clone(),
        metrics.clone(),
    );
    let renewal_worker = RenewalWorker::new(certificate_manager.clone(), config.clone(), metrics.clone());

    let cancel = CancellationToken::new();

    let health = Arc::new(HealthCheck::new());
    health.register_component("storage", HealthStatus::Healthy).await;
    health.register_component("provider", HealthStatus::Healthy).await;

    let state = AppState {
        config: config.clone(),
        dns_manager,
        inventory,
        certificate_manager,
        health,
        metrics,
    };
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));

    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        tokio::select! {
            result = server::start_server(addr, state) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "control API exited with an error");
                }
            }
            _ = server_cancel.cancelled() => {
                tracing::info!("control API stopping");
            }
        }
    });

    let reconcile_cancel = cancel.clone();
    let reconcile_task =
        tokio::spawn(async move { reconciliation_worker.run(reconcile_cancel).await });

    let renewal_cancel = cancel.clone();
    let renewal_task = tokio::spawn(async move { renewal_worker.run(renewal_cancel).await });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping workers");
    cancel.cancel();

    let _ = tokio::join!(server_task, reconcile_task, renewal_task);
    tracing::info!("navigator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
