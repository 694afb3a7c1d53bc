/// Control API: JSON-over-HTTP entry points for `SyncDNS`,
/// `IssueCertificate`, and `GetCertificate` (§4.5, §6).
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::auth::require_service_token;
use super::health::{HealthCheck, health_handler};
use crate::certificate::CertificateManager;
use crate::config::Config;
use crate::dns::DnsManager;
use crate::error::Result;
use crate::inventory::InventoryClient;
use crate::metrics::SharedMetrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dns_manager: Arc<DnsManager>,
    pub inventory: Arc<dyn InventoryClient>,
    pub certificate_manager: Arc<CertificateManager>,
    pub health: Arc<HealthCheck>,
    pub metrics: SharedMetrics,
}

#[derive(Debug, Deserialize)]
pub struct SyncDnsRequest {
    pub service_type: String,
}

#[derive(Debug, Serialize)]
pub struct SyncDnsResponse {
    pub success: bool,
    pub message: String,
}

async fn sync_dns(
    State(state): State<AppState>,
    Json(req): Json<SyncDnsRequest>,
) -> Json<SyncDnsResponse> {
    let span = tracing::info_span!("sync_dns", service_type = %req.service_type);
    let _enter = span.enter();
    state.metrics.requests_total.inc();

    let nodes = match state
        .inventory
        .healthy_nodes(&req.service_type, state.config.scheduling.stale_age)
        .await
    {
        Ok(nodes) => nodes,
        Err(e) => {
            return Json(SyncDnsResponse {
                success: false,
                message: e.to_string(),
            });
        }
    };
    let ips: Vec<String> = nodes
        .into_iter()
        .filter(crate::inventory::Node::has_ip)
        .filter_map(|n| n.external_ip)
        .collect();

    match state
        .dns_manager
        .sync(&req.service_type, &state.config.root_domain, &ips)
        .await
    {
        Ok(partial) if partial.is_empty() => Json(SyncDnsResponse {
            success: true,
            message: "synced".to_string(),
        }),
        Ok(partial) => {
            tracing::warn!(?partial, "sync completed with partial failures");
            state.metrics.dns_sync_errors_total.inc_by(partial.len() as u64);
            Json(SyncDnsResponse {
                success: true,
                message: format!("synced with {} partial failure(s)", partial.len()),
            })
        }
        Err(e) => {
            state.metrics.dns_sync_errors_total.inc();
            Json(SyncDnsResponse {
                success: false,
                message: e.to_string(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueCertificateRequest {
    pub tenant_id: Option<String>,
    pub domain: String,
    pub email: String,
}

#[derive(Debug, Serialize, Default)]
pub struct IssueCertificateResponse {
    pub success: bool,
    pub tenant_id: Option<String>,
    pub domain: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub expires_at_unix: i64,
    pub error: Option<String>,
}

async fn issue_certificate(
    State(state): State<AppState>,
    Json(req): Json<IssueCertificateRequest>,
) -> Json<IssueCertificateResponse> {
    let span = tracing::info_span!("issue_certificate", tenant_id = ?req.tenant_id, domain = %req.domain);
    let _enter = span.enter();
    state.metrics.requests_total.inc();

    match state
        .certificate_manager
        .issue_certificate(req.tenant_id.as_deref(), &req.domain, &req.email)
        .await
    {
        Ok(issued) => {
            state.metrics.certs_issued_total.inc();
            Json(IssueCertificateResponse {
                success: true,
                tenant_id: req.tenant_id,
                domain: req.domain,
                cert_pem: issued.certificate_pem,
                key_pem: issued.private_key_pem,
                expires_at_unix: issued.expires_at.timestamp(),
                error: None,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "certificate issuance failed");
            Json(IssueCertificateResponse {
                success: false,
                tenant_id: req.tenant_id,
                domain: req.domain,
                error: Some(e.to_string()),
                ..Default::default()
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetCertificateRequest {
    pub tenant_id: Option<String>,
    pub domain: String,
}

#[derive(Debug, Serialize, Default)]
pub struct GetCertificateResponse {
    pub found: bool,
    pub tenant_id: Option<String>,
    pub domain: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub expires_at_unix: i64,
    pub error: Option<String>,
}

async fn get_certificate(
    State(state): State<AppState>,
    Json(req): Json<GetCertificateRequest>,
) -> Json<GetCertificateResponse> {
    state.metrics.requests_total.inc();
    match state
        .certificate_manager
        .get_certificate(req.tenant_id.as_deref(), &req.domain)
        .await
    {
        Ok(Some(issued)) => Json(GetCertificateResponse {
            found: true,
            tenant_id: req.tenant_id,
            domain: req.domain,
            cert_pem: issued.certificate_pem,
            key_pem: issued.private_key_pem,
            expires_at_unix: issued.expires_at.timestamp(),
            error: None,
        }),
        Ok(None) => Json(GetCertificateResponse {
            found: false,
            tenant_id: req.tenant_id,
            domain: req.domain,
            ..Default::default()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "get_certificate failed");
            Json(GetCertificateResponse {
                found: false,
                tenant_id: req.tenant_id,
                domain: req.domain,
                error: Some(e.to_string()),
                ..Default::default()
            })
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.gather_text()
}

/// Build the router with no listener attached, for use in both `start_server`
/// and in-process integration tests via `tower::ServiceExt::oneshot`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/sync-dns", post(sync_dns))
        .route("/issue-certificate", post(issue_certificate))
        .route("/get-certificate", post(get_certificate))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_service_token,
        ));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::NavigatorError::transport(format!("failed to bind control API: {e}")))?;

    tracing::info!(%addr, "control API listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::NavigatorError::transport(format!("control API server error: {e}")))?;

    Ok(())
}

impl axum::extract::FromRef<AppState> for Arc<HealthCheck> {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}
