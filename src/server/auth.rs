/// Bearer-token authentication middleware (§4.5): every RPC except health
/// checks requires `Authorization: Bearer <SERVICE_TOKEN>`.
use crate::server::api::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub async fn require_service_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if t == state.config.service_token => Ok(next.run(req).await),
        _ => {
            tracing::warn!("rejected request with missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
