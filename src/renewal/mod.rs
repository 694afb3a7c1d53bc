/// Renewal Worker: periodically renews certificates nearing expiry,
/// driving the Certificate Manager with a bounded retry/backoff (§4.3).
use crate::certificate::CertificateManager;
use crate::config::Config;
use crate::metrics::SharedMetrics;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Certificates expiring within this window are candidates for renewal.
const RENEWAL_WINDOW_DAYS: i64 = 30;
const MAX_ATTEMPTS: u32 = 3;
const BACKOFFS: [Duration; 2] = [Duration::from_secs(30), Duration::from_secs(60)];

pub trait RenewalHook: Send + Sync {
    fn before_renewal(&self, _tenant_id: Option<&str>, _domain: &str) {}
    fn after_renewal(&self, _tenant_id: Option<&str>, _domain: &str) {}
    fn on_error(&self, _tenant_id: Option<&str>, _domain: &str, _error: &str) {}
}

pub struct RenewalWorker {
    manager: Arc<CertificateManager>,
    config: Arc<Config>,
    metrics: SharedMetrics,
    hook: Option<Arc<dyn RenewalHook>>,
}

impl RenewalWorker {
    pub fn new(manager: Arc<CertificateManager>, config: Arc<Config>, metrics: SharedMetrics) -> Self {
        Self {
            manager,
            config,
            metrics,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn RenewalHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Runs until `cancel` fires, renewing once immediately and then on every tick.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.tick(&cancel).await;
            if cancel.is_cancelled() {
                tracing::info!("renewal worker stopping");
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("renewal worker stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.scheduling.renewal_interval) => {}
            }
        }
    }

    /// One pass: renew every certificate expiring within the window.
    pub async fn tick(&self, cancel: &CancellationToken) {
        let cutoff = Utc::now() + ChronoDuration::days(RENEWAL_WINDOW_DAYS);
        let expiring = match self.manager.find_expiring_before(cutoff).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "failed to list certificates due for renewal");
                return;
            }
        };

        tracing::info!(count = expiring.len(), "renewal worker tick");
        for record in expiring {
            if cancel.is_cancelled() {
                return;
            }
            self.renew_with_retry(cancel, record.tenant_id.as_deref(), &record.domain)
                .await;
        }
    }

    async fn renew_with_retry(&self, cancel: &CancellationToken, tenant_id: Option<&str>, domain: &str) {
        if let Some(hook) = &self.hook {
            hook.before_renewal(tenant_id, domain);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .manager
                .issue_certificate(tenant_id, domain, &self.config.brand_contact_email)
                .await;

            match result {
                Ok(_) => {
                    tracing::info!(domain, attempt, "certificate renewed");
                    self.metrics.certs_renewed_total.inc();
                    if let Some(hook) = &self.hook {
                        hook.after_renewal(tenant_id, domain);
                    }
                    return;
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = BACKOFFS[(attempt - 1) as usize];
                    tracing::warn!(
                        domain,
                        attempt,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "renewal attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!(domain, "renewal worker cancelled during back-off");
                            return;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(domain, attempt, error = %e, "renewal failed, giving up");
                    self.metrics.renewal_failures_total.inc();
                    if let Some(hook) = &self.hook {
                        hook.on_error(tenant_id, domain, &e.to_string());
                    }
                    return;
                }
            }
        }
    }
}
